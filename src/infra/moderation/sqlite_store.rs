// SQLite-backed stores for persistent moderation state.
//
// Tables:
// - user_moderation_status: One row per user, versioned for compare-and-swap
// - flagged_content_reports: Append-only report queue, ordered by arrival
// - moderation_logs: Append-only audit trail of filtering decisions
//
// All three stores can share one pool. Each has its own `migrate()`.

use crate::core::moderation::{
    FlaggedContentReport, ModerationLogEntry, ModerationLogSink, ReportQueue, ReportStatus,
    StoreError, UserModerationStatus, UserStatusStore, VersionedStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};

/// Open a pool for `database_url`, creating the file if it does not exist.
pub async fn connect(database_url: &str) -> Result<Pool<Sqlite>, StoreError> {
    let conn_str = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite://{}?mode=rwc", database_url)
    };

    SqlitePoolOptions::new()
        .connect(&conn_str)
        .await
        .map_err(storage_error)
}

fn storage_error(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

// Enums go into TEXT columns under their serde names ("pending", "chat_message").
fn enum_to_column<T: Serialize>(value: &T) -> Result<String, StoreError> {
    match serde_json::to_value(value)? {
        Value::String(name) => Ok(name),
        other => Ok(other.to_string()),
    }
}

fn enum_from_column<T: DeserializeOwned>(name: String) -> Result<T, StoreError> {
    Ok(serde_json::from_value(Value::String(name))?)
}

// ============================================================================
// USER STATUS
// ============================================================================

pub struct SqliteUserStatusStore {
    pool: Pool<Sqlite>,
}

impl SqliteUserStatusStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_moderation_status (
                user_id TEXT PRIMARY KEY,
                is_banned BOOLEAN NOT NULL DEFAULT 0,
                banned_until TEXT,
                is_shadow_banned BOOLEAN NOT NULL DEFAULT 0,
                violation_count INTEGER NOT NULL DEFAULT 0,
                warning_count INTEGER NOT NULL DEFAULT 0,
                last_violation_at TEXT,
                version INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    fn row_to_status(row: &SqliteRow) -> Result<VersionedStatus, StoreError> {
        Ok(VersionedStatus {
            status: UserModerationStatus {
                user_id: row.try_get("user_id").map_err(storage_error)?,
                is_banned: row.try_get("is_banned").map_err(storage_error)?,
                banned_until: row
                    .try_get::<Option<DateTime<Utc>>, _>("banned_until")
                    .map_err(storage_error)?,
                is_shadow_banned: row.try_get("is_shadow_banned").map_err(storage_error)?,
                violation_count: row.try_get::<i64, _>("violation_count").map_err(storage_error)?
                    as u32,
                warning_count: row.try_get::<i64, _>("warning_count").map_err(storage_error)?
                    as u32,
                last_violation_at: row
                    .try_get::<Option<DateTime<Utc>>, _>("last_violation_at")
                    .map_err(storage_error)?,
            },
            version: row.try_get::<i64, _>("version").map_err(storage_error)? as u64,
        })
    }
}

#[async_trait]
impl UserStatusStore for SqliteUserStatusStore {
    async fn get_status(&self, user_id: &str) -> Result<Option<VersionedStatus>, StoreError> {
        let row = sqlx::query("SELECT * FROM user_moderation_status WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.as_ref().map(Self::row_to_status).transpose()
    }

    async fn compare_and_swap(
        &self,
        status: UserModerationStatus,
        expected_version: Option<u64>,
    ) -> Result<bool, StoreError> {
        let result = match expected_version {
            // First write for this user: only wins if nobody inserted meanwhile.
            None => sqlx::query(
                r#"
                INSERT INTO user_moderation_status (
                    user_id, is_banned, banned_until, is_shadow_banned,
                    violation_count, warning_count, last_violation_at, version
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, 1)
                ON CONFLICT(user_id) DO NOTHING
                "#,
            )
            .bind(&status.user_id)
            .bind(status.is_banned)
            .bind(status.banned_until)
            .bind(status.is_shadow_banned)
            .bind(status.violation_count as i64)
            .bind(status.warning_count as i64)
            .bind(status.last_violation_at)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?,

            Some(version) => sqlx::query(
                r#"
                UPDATE user_moderation_status SET
                    is_banned = ?,
                    banned_until = ?,
                    is_shadow_banned = ?,
                    violation_count = ?,
                    warning_count = ?,
                    last_violation_at = ?,
                    version = version + 1
                WHERE user_id = ? AND version = ?
                "#,
            )
            .bind(status.is_banned)
            .bind(status.banned_until)
            .bind(status.is_shadow_banned)
            .bind(status.violation_count as i64)
            .bind(status.warning_count as i64)
            .bind(status.last_violation_at)
            .bind(&status.user_id)
            .bind(version as i64)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?,
        };

        Ok(result.rows_affected() == 1)
    }
}

// ============================================================================
// REPORTS
// ============================================================================

pub struct SqliteReportQueue {
    pool: Pool<Sqlite>,
}

impl SqliteReportQueue {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS flagged_content_reports (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                content_type TEXT NOT NULL,
                content_id TEXT NOT NULL,
                reported_user_id TEXT NOT NULL,
                reporter_user_id TEXT NOT NULL,
                content_text TEXT NOT NULL,
                reason TEXT NOT NULL,
                severity TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_flagged_content_reports_status
                ON flagged_content_reports(status, seq);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    fn row_to_report(row: &SqliteRow) -> Result<FlaggedContentReport, StoreError> {
        Ok(FlaggedContentReport {
            id: row.try_get("id").map_err(storage_error)?,
            content_type: enum_from_column(row.try_get("content_type").map_err(storage_error)?)?,
            content_id: row.try_get("content_id").map_err(storage_error)?,
            reported_user_id: row.try_get("reported_user_id").map_err(storage_error)?,
            reporter_user_id: row.try_get("reporter_user_id").map_err(storage_error)?,
            content_text: row.try_get("content_text").map_err(storage_error)?,
            reason: row.try_get("reason").map_err(storage_error)?,
            severity: enum_from_column(row.try_get("severity").map_err(storage_error)?)?,
            status: enum_from_column(row.try_get("status").map_err(storage_error)?)?,
            created_at: row.try_get("created_at").map_err(storage_error)?,
        })
    }
}

#[async_trait]
impl ReportQueue for SqliteReportQueue {
    async fn enqueue(&self, report: FlaggedContentReport) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO flagged_content_reports (
                id, content_type, content_id, reported_user_id, reporter_user_id,
                content_text, reason, severity, status, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&report.id)
        .bind(enum_to_column(&report.content_type)?)
        .bind(&report.content_id)
        .bind(&report.reported_user_id)
        .bind(&report.reporter_user_id)
        .bind(&report.content_text)
        .bind(&report.reason)
        .bind(enum_to_column(&report.severity)?)
        .bind(enum_to_column(&report.status)?)
        .bind(report.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn list_by_status(
        &self,
        status: ReportStatus,
        limit: usize,
    ) -> Result<Vec<FlaggedContentReport>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM flagged_content_reports
            WHERE status = ?
            ORDER BY seq ASC
            LIMIT ?
            "#,
        )
        .bind(enum_to_column(&status)?)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.iter().map(Self::row_to_report).collect()
    }

    async fn update_status(
        &self,
        report_id: &str,
        status: ReportStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE flagged_content_reports SET status = ? WHERE id = ?")
            .bind(enum_to_column(&status)?)
            .bind(report_id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(result.rows_affected() > 0)
    }
}

// ============================================================================
// AUDIT LOG
// ============================================================================

pub struct SqliteLogSink {
    pool: Pool<Sqlite>,
}

impl SqliteLogSink {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS moderation_logs (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                context TEXT NOT NULL,
                original_content TEXT NOT NULL,
                filtered_content TEXT NOT NULL,
                matched_rule_ids TEXT NOT NULL DEFAULT '[]',
                action_taken TEXT NOT NULL,
                severity_score INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_moderation_logs_user
                ON moderation_logs(user_id, created_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    /// Most recent decisions for a user, newest first.
    pub async fn entries_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ModerationLogEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM moderation_logs
            WHERE user_id = ?
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let matched: String = row.try_get("matched_rule_ids").map_err(storage_error)?;
            entries.push(ModerationLogEntry {
                id: row.try_get("id").map_err(storage_error)?,
                user_id: row.try_get("user_id").map_err(storage_error)?,
                context: row.try_get("context").map_err(storage_error)?,
                original_content: row.try_get("original_content").map_err(storage_error)?,
                filtered_content: row.try_get("filtered_content").map_err(storage_error)?,
                matched_rule_ids: serde_json::from_str(&matched)?,
                action_taken: enum_from_column(
                    row.try_get("action_taken").map_err(storage_error)?,
                )?,
                severity_score: row.try_get::<i64, _>("severity_score").map_err(storage_error)?
                    as u32,
                created_at: row.try_get("created_at").map_err(storage_error)?,
            });
        }
        Ok(entries)
    }
}

#[async_trait]
impl ModerationLogSink for SqliteLogSink {
    async fn append(&self, entry: ModerationLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO moderation_logs (
                id, user_id, context, original_content, filtered_content,
                matched_rule_ids, action_taken, severity_score, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.user_id)
        .bind(&entry.context)
        .bind(&entry.original_content)
        .bind(&entry.filtered_content)
        .bind(serde_json::to_string(&entry.matched_rule_ids)?)
        .bind(enum_to_column(&entry.action_taken)?)
        .bind(entry.severity_score as i64)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::{
        ActionTaken, ContentReporter, ContentType, ManualClock, NewContentReport, Severity,
        UserStatusTracker,
    };
    use chrono::TimeZone;
    use std::sync::Arc;
    use tempfile::tempdir;

    // A single connection so every query sees the same in-memory database.
    async fn memory_pool() -> Pool<Sqlite> {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    fn report(id: &str) -> FlaggedContentReport {
        FlaggedContentReport {
            id: id.to_string(),
            content_type: ContentType::ChatMessage,
            content_id: format!("msg-{}", id),
            reported_user_id: "troll".to_string(),
            reporter_user_id: "viewer".to_string(),
            content_text: "you are all losers".to_string(),
            reason: "harassment".to_string(),
            severity: Severity::Medium,
            status: ReportStatus::Pending,
            created_at: at(12),
        }
    }

    #[tokio::test]
    async fn test_status_compare_and_swap() {
        let store = SqliteUserStatusStore::new(memory_pool().await);
        store.migrate().await.unwrap();
        assert!(store.get_status("u1").await.unwrap().is_none());

        let mut status = UserModerationStatus::new("u1");
        status.violation_count = 1;
        status.last_violation_at = Some(at(9));
        assert!(store.compare_and_swap(status.clone(), None).await.unwrap());

        // A second "first write" loses.
        assert!(!store.compare_and_swap(status.clone(), None).await.unwrap());

        let stored = store.get_status("u1").await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.status, status);

        status.is_banned = true;
        status.banned_until = Some(at(18));
        assert!(store.compare_and_swap(status.clone(), Some(1)).await.unwrap());

        // Stale version loses and leaves the row alone.
        let mut stale = status.clone();
        stale.is_banned = false;
        assert!(!store.compare_and_swap(stale, Some(1)).await.unwrap());

        let stored = store.get_status("u1").await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert!(stored.status.is_banned);
        assert_eq!(stored.status.banned_until, Some(at(18)));
    }

    #[tokio::test]
    async fn test_status_survives_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("moderation.db");
        let db_path = db_path.to_str().unwrap();
        let clock = Arc::new(ManualClock::new(at(10)));

        {
            let store = SqliteUserStatusStore::new(connect(db_path).await.unwrap());
            store.migrate().await.unwrap();
            let tracker = UserStatusTracker::new(store, clock.clone(), 5);
            tracker.record_violation("u1", 20).await.unwrap();
            tracker.record_violation("u1", 1).await.unwrap();
            tracker.set_shadow_banned("u1", true).await.unwrap();
            tracker.ban_user("u1", Some(at(12))).await.unwrap();
        }

        let store = SqliteUserStatusStore::new(connect(db_path).await.unwrap());
        store.migrate().await.unwrap();
        let tracker = UserStatusTracker::new(store, clock.clone(), 5);

        let status = tracker.get_status("u1").await.unwrap().unwrap();
        assert_eq!(status.violation_count, 2);
        assert_eq!(status.warning_count, 1);
        assert!(status.is_shadow_banned);

        let posting = tracker.can_post("u1").await;
        assert!(!posting.can_post);

        clock.set(at(13));
        assert!(tracker.can_post("u1").await.can_post);
    }

    #[tokio::test]
    async fn test_concurrent_violations_are_all_counted() {
        let store = SqliteUserStatusStore::new(memory_pool().await);
        store.migrate().await.unwrap();
        let tracker = Arc::new(UserStatusTracker::new(
            store,
            Arc::new(ManualClock::new(at(10))),
            50,
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let tracker = Arc::clone(&tracker);
            handles.push(tokio::spawn(async move {
                tracker.record_violation("u1", 1).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let status = tracker.get_status("u1").await.unwrap().unwrap();
        assert_eq!(status.violation_count, 8);
    }

    #[tokio::test]
    async fn test_report_queue_order_and_resolution() {
        let queue = SqliteReportQueue::new(memory_pool().await);
        queue.migrate().await.unwrap();

        for id in ["r1", "r2", "r3"] {
            queue.enqueue(report(id)).await.unwrap();
        }

        let pending = queue.list_by_status(ReportStatus::Pending, 2).await.unwrap();
        let ids: Vec<&str> = pending.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2"]);
        assert_eq!(pending[0], report("r1"));

        assert!(queue.update_status("r1", ReportStatus::Actioned).await.unwrap());
        assert!(!queue.update_status("nope", ReportStatus::Dismissed).await.unwrap());

        let pending = queue.list_by_status(ReportStatus::Pending, 10).await.unwrap();
        assert_eq!(pending.len(), 2);
        let actioned = queue.list_by_status(ReportStatus::Actioned, 10).await.unwrap();
        assert_eq!(actioned.len(), 1);
        assert_eq!(actioned[0].status, ReportStatus::Actioned);
    }

    #[tokio::test]
    async fn test_reporter_files_into_sqlite() {
        let queue = SqliteReportQueue::new(memory_pool().await);
        queue.migrate().await.unwrap();
        let reporter = ContentReporter::new(queue, Arc::new(ManualClock::new(at(8))));

        assert!(
            reporter
                .report_content(NewContentReport {
                    content_type: ContentType::Username,
                    content_id: "profile-9".to_string(),
                    content_text: "xXslurXx".to_string(),
                    reported_user_id: "u9".to_string(),
                    reporter_user_id: "mod".to_string(),
                    reason: "offensive name".to_string(),
                })
                .await
        );

        let pending = reporter.pending_reports(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].content_type, ContentType::Username);
        assert_eq!(pending[0].created_at, at(8));
    }

    #[tokio::test]
    async fn test_log_sink_appends() {
        let sink = SqliteLogSink::new(memory_pool().await);
        sink.migrate().await.unwrap();

        for (id, hour) in [("log-1", 9), ("log-2", 10)] {
            sink.append(ModerationLogEntry {
                id: id.to_string(),
                user_id: "u1".to_string(),
                context: "chat".to_string(),
                original_content: "oh darn".to_string(),
                filtered_content: "oh ***".to_string(),
                matched_rule_ids: vec!["darn".to_string(), "caps".to_string()],
                action_taken: ActionTaken::Modified,
                severity_score: 2,
                created_at: at(hour),
            })
            .await
            .unwrap();
        }

        let entries = sink.entries_for_user("u1", 10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "log-2");
        assert_eq!(entries[0].matched_rule_ids, vec!["darn", "caps"]);
        assert_eq!(entries[0].action_taken, ActionTaken::Modified);
        assert!(sink.entries_for_user("someone-else", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unmigrated_database_is_an_error() {
        let store = SqliteUserStatusStore::new(memory_pool().await);
        assert!(matches!(
            store.get_status("u1").await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[test]
    fn test_enum_columns_use_wire_names() {
        assert_eq!(enum_to_column(&ReportStatus::Pending).unwrap(), "pending");
        assert_eq!(enum_to_column(&ContentType::ChatMessage).unwrap(), "chat_message");
        let status: ReportStatus = enum_from_column("dismissed".to_string()).unwrap();
        assert_eq!(status, ReportStatus::Dismissed);
        assert!(enum_from_column::<ReportStatus>("bogus".to_string()).is_err());
    }
}
