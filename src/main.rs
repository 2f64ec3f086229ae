// Line-oriented moderation filter.
//
// Reads one JSON request per line from stdin:
//   {"content": "oh darn it", "context": "chat", "user_id": "u1"}
// and prints one JSON verdict per line to stdout.
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Pump requests through the engine

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stream_moderation::core::moderation::{
    ModerationConfig, ModerationResult, ModerationService, ModerationStores, PostingStatus,
};
use stream_moderation::infra::moderation::sqlite_store;
use stream_moderation::infra::moderation::{
    JsonRuleStore, SqliteLogSink, SqliteReportQueue, SqliteUserStatusStore,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const DEFAULT_RULES_PATH: &str = "data/moderation_rules.json";
const DEFAULT_DATABASE_PATH: &str = "data/moderation.db";

type Service =
    ModerationService<JsonRuleStore, SqliteLogSink, SqliteUserStatusStore, SqliteReportQueue>;

#[derive(Debug, Deserialize)]
struct FilterRequest {
    content: String,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct FilterResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    posting: Option<PostingStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<ModerationResult>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let config = ModerationConfig::from_env();
    let rules_path =
        std::env::var("MODERATION_RULES_PATH").unwrap_or_else(|_| DEFAULT_RULES_PATH.to_string());
    let database_url = match std::env::var("MODERATION_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            // Keep runtime databases in the data folder next to the rule file.
            tokio::fs::create_dir_all("data")
                .await
                .context("creating data directory")?;
            DEFAULT_DATABASE_PATH.to_string()
        }
    };
    tracing::info!(?config, %rules_path, %database_url, "Starting moderation filter");

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================

    let pool = sqlite_store::connect(&database_url)
        .await
        .context("connecting to moderation database")?;

    let user_status = SqliteUserStatusStore::new(pool.clone());
    user_status.migrate().await.context("migrating user status table")?;
    let reports = SqliteReportQueue::new(pool.clone());
    reports.migrate().await.context("migrating report table")?;
    let log_sink = SqliteLogSink::new(pool);
    log_sink.migrate().await.context("migrating moderation log table")?;

    let service = Arc::new(ModerationService::new(
        config,
        ModerationStores {
            rules: JsonRuleStore::new(&rules_path),
            log_sink,
            user_status,
            reports,
        },
    ));

    if !service.rules().refresh_now().await {
        tracing::warn!(%rules_path, "Could not load rules at startup, filtering with none");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        if line.trim().is_empty() {
            continue;
        }

        let request: FilterRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed request line");
                continue;
            }
        };

        let response = handle_request(&service, request).await;
        let mut out = serde_json::to_string(&response).context("encoding response")?;
        out.push('\n');
        stdout
            .write_all(out.as_bytes())
            .await
            .context("writing stdout")?;
        stdout.flush().await.context("flushing stdout")?;
    }

    Ok(())
}

async fn handle_request(service: &Service, request: FilterRequest) -> FilterResponse {
    let user_id = request.user_id.as_deref();

    let posting = match user_id {
        Some(user_id) => {
            let posting = service.check_user_moderation_status(user_id).await;
            if !posting.can_post {
                return FilterResponse {
                    posting: Some(posting),
                    result: None,
                };
            }
            Some(posting)
        }
        None => None,
    };

    let result = service
        .filter_content(&request.content, request.context.as_deref(), user_id)
        .await;

    if let Some(user_id) = user_id {
        if result.has_violations() {
            if let Err(e) = service
                .update_user_violation_count(user_id, result.severity_score)
                .await
            {
                tracing::warn!(%user_id, error = %e, "Failed to record violation");
            }
        }
    }

    FilterResponse {
        posting,
        result: Some(result),
    }
}
