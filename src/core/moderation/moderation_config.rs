// Configuration for the moderation engine.
//
// Values come from the environment (a `.env` file is loaded by the binary);
// anything missing or unparseable falls back to the default.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationConfig {
    /// How long a fetched rule set is served before refreshing.
    pub rule_cache_ttl: Duration,
    /// Upper bound on a single rule refresh. The stale set is used past it.
    pub rule_refresh_timeout: Duration,
    /// Upper bound on writing one audit entry.
    pub log_write_timeout: Duration,
    /// Optimistic retries for a user status write before giving up.
    pub status_write_attempts: u32,
    /// Context used when the caller does not name one.
    pub default_context: String,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            rule_cache_ttl: Duration::from_secs(300),
            rule_refresh_timeout: Duration::from_millis(2000),
            log_write_timeout: Duration::from_millis(500),
            status_write_attempts: 5,
            default_context: "chat".to_string(),
        }
    }
}

impl ModerationConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            rule_cache_ttl: number("MODERATION_RULE_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.rule_cache_ttl),
            rule_refresh_timeout: number("MODERATION_RULE_REFRESH_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.rule_refresh_timeout),
            log_write_timeout: number("MODERATION_LOG_WRITE_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.log_write_timeout),
            status_write_attempts: number("MODERATION_STATUS_WRITE_ATTEMPTS")
                .and_then(|v| u32::try_from(v).ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.status_write_attempts),
            default_context: lookup("MODERATION_DEFAULT_CONTEXT")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.default_context),
        }
    }
}
