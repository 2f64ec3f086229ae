// Moderation service - the entry point the chat/comment ingestion layer calls.
//
// Typical flow per message:
// 1. check_user_moderation_status(user) - gate on bans
// 2. filter_content(text, context, user) - run the rules, get a verdict
// 3. caller enforces the verdict (drop, deliver redacted, deliver + review)
// 4. update_user_violation_count(user, score) when the caller wants it counted
//
// Nothing here decides to ban anyone; that policy lives outside the engine.

use super::action_resolver::evaluate_content;
use super::clock::{Clock, SystemClock};
use super::content_reporter::ContentReporter;
use super::moderation_config::ModerationConfig;
use super::moderation_logger::ModerationLogger;
use super::moderation_models::{
    ModerationLogEntry, ModerationResult, NewContentReport, PostingStatus,
};
use super::moderation_store::{
    ModerationError, ModerationLogSink, ReportQueue, RuleStore, UserStatusStore,
};
use super::rule_cache::RuleCache;
use super::user_status::UserStatusTracker;
use std::sync::Arc;

/// The external stores the engine talks to.
pub struct ModerationStores<R, L, U, Q> {
    pub rules: R,
    pub log_sink: L,
    pub user_status: U,
    pub reports: Q,
}

/// Content moderation engine. Construct once per process and share behind an `Arc`.
pub struct ModerationService<R, L, U, Q>
where
    R: RuleStore,
    L: ModerationLogSink,
    U: UserStatusStore,
    Q: ReportQueue,
{
    rules: RuleCache<R>,
    logger: ModerationLogger<L>,
    users: UserStatusTracker<U>,
    reporter: ContentReporter<Q>,
    clock: Arc<dyn Clock>,
    default_context: String,
}

impl<R, L, U, Q> ModerationService<R, L, U, Q>
where
    R: RuleStore,
    L: ModerationLogSink,
    U: UserStatusStore,
    Q: ReportQueue,
{
    pub fn new(config: ModerationConfig, stores: ModerationStores<R, L, U, Q>) -> Self {
        Self::with_clock(config, stores, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: ModerationConfig,
        stores: ModerationStores<R, L, U, Q>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            rules: RuleCache::new(
                stores.rules,
                Arc::clone(&clock),
                config.rule_cache_ttl,
                config.rule_refresh_timeout,
            ),
            logger: ModerationLogger::new(stores.log_sink, config.log_write_timeout),
            users: UserStatusTracker::new(
                stores.user_status,
                Arc::clone(&clock),
                config.status_write_attempts,
            ),
            reporter: ContentReporter::new(stores.reports, Arc::clone(&clock)),
            clock,
            default_context: config.default_context,
        }
    }

    /// Filter one piece of user content.
    ///
    /// `context` defaults to the configured context (normally "chat"). When
    /// rules match and a `user_id` is given, the decision is written to the
    /// audit log; a failed write does not affect the returned verdict.
    pub async fn filter_content(
        &self,
        content: &str,
        context: Option<&str>,
        user_id: Option<&str>,
    ) -> ModerationResult {
        if content.trim().is_empty() {
            return ModerationResult::allowed(content);
        }

        let context = context.unwrap_or(&self.default_context);
        let rules = self.rules.get_active_rules(context).await;
        let result = evaluate_content(content, &rules);

        if result.has_violations() {
            tracing::debug!(
                user_id = user_id.unwrap_or("-"),
                %context,
                action = %result.action_taken,
                score = result.severity_score,
                matched = result.matched_rules.len(),
                "Content matched moderation rules"
            );

            if let Some(user_id) = user_id {
                let entry = ModerationLogEntry::for_decision(
                    content,
                    &result,
                    context,
                    user_id,
                    self.clock.now(),
                );
                self.logger.log_decision(entry).await;
            }
        }

        result
    }

    /// Whether the user may post at all, independent of any message.
    pub async fn check_user_moderation_status(&self, user_id: &str) -> PostingStatus {
        self.users.can_post(user_id).await
    }

    /// File a user report for manual review. `false` means the caller may retry.
    pub async fn report_content(&self, report: NewContentReport) -> bool {
        self.reporter.report_content(report).await
    }

    /// Count a violation against the user. Write failures are returned.
    pub async fn update_user_violation_count(
        &self,
        user_id: &str,
        severity_score: u32,
    ) -> Result<(), ModerationError> {
        self.users.record_violation(user_id, severity_score).await?;
        Ok(())
    }

    pub fn rules(&self) -> &RuleCache<R> {
        &self.rules
    }

    pub fn users(&self) -> &UserStatusTracker<U> {
        &self.users
    }

    pub fn reporter(&self) -> &ContentReporter<Q> {
        &self.reporter
    }
}
