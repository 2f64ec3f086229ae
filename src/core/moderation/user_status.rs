// User status tracking - ban, shadow-ban and violation bookkeeping per user.
//
// This service handles:
// - The posting gate (is the user banned right now?)
// - Violation/warning counters after a filtering pass
// - Admin actions (ban, lift ban, shadow-ban)
//
// Deciding WHEN a user should be banned is an external policy. Nothing here
// promotes a user automatically based on their counters.

use super::clock::Clock;
use super::moderation_models::{PostingStatus, UserModerationStatus};
use super::moderation_store::{ModerationError, UserStatusStore};
use super::severity::is_warning_level;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub struct UserStatusTracker<U: UserStatusStore> {
    store: U,
    clock: Arc<dyn Clock>,
    max_write_attempts: u32,
}

impl<U: UserStatusStore> UserStatusTracker<U> {
    pub fn new(store: U, clock: Arc<dyn Clock>, max_write_attempts: u32) -> Self {
        Self {
            store,
            clock,
            max_write_attempts: max_write_attempts.max(1),
        }
    }

    /// Whether `user_id` may post. Missing rows and store failures both mean "yes".
    pub async fn can_post(&self, user_id: &str) -> PostingStatus {
        let stored = match self.store.get_status(user_id).await {
            Ok(Some(versioned)) => versioned.status,
            Ok(None) => return PostingStatus::open(),
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "Status lookup failed, allowing post");
                return PostingStatus::open();
            }
        };

        let is_banned = stored.is_banned_at(self.clock.now());
        PostingStatus {
            can_post: !is_banned,
            is_banned,
            is_shadow_banned: stored.is_shadow_banned,
        }
    }

    /// Count one violation with the given pass score.
    pub async fn record_violation(
        &self,
        user_id: &str,
        severity_score: u32,
    ) -> Result<UserModerationStatus, ModerationError> {
        let now = self.clock.now();
        self.update(user_id, |status| {
            status.violation_count = status.violation_count.saturating_add(1);
            if is_warning_level(severity_score) {
                status.warning_count = status.warning_count.saturating_add(1);
            }
            status.last_violation_at = Some(now);
        })
        .await
    }

    /// Ban a user, permanently when `until` is `None`.
    pub async fn ban_user(
        &self,
        user_id: &str,
        until: Option<DateTime<Utc>>,
    ) -> Result<UserModerationStatus, ModerationError> {
        tracing::info!(%user_id, ?until, "Banning user");
        self.update(user_id, |status| {
            status.is_banned = true;
            status.banned_until = until;
        })
        .await
    }

    pub async fn lift_ban(&self, user_id: &str) -> Result<UserModerationStatus, ModerationError> {
        tracing::info!(%user_id, "Lifting ban");
        self.update(user_id, |status| {
            status.is_banned = false;
            status.banned_until = None;
        })
        .await
    }

    pub async fn set_shadow_banned(
        &self,
        user_id: &str,
        shadow_banned: bool,
    ) -> Result<UserModerationStatus, ModerationError> {
        tracing::info!(%user_id, shadow_banned, "Updating shadow ban");
        self.update(user_id, |status| status.is_shadow_banned = shadow_banned)
            .await
    }

    /// The stored row, if any. Unlike `can_post`, store errors are returned.
    pub async fn get_status(
        &self,
        user_id: &str,
    ) -> Result<Option<UserModerationStatus>, ModerationError> {
        Ok(self
            .store
            .get_status(user_id)
            .await?
            .map(|versioned| versioned.status))
    }

    /// Optimistic read-modify-write. Retries when another writer wins the race.
    async fn update(
        &self,
        user_id: &str,
        apply: impl Fn(&mut UserModerationStatus),
    ) -> Result<UserModerationStatus, ModerationError> {
        for attempt in 1..=self.max_write_attempts {
            let current = self.store.get_status(user_id).await?;
            let (mut status, expected_version) = match current {
                Some(versioned) => (versioned.status, Some(versioned.version)),
                None => (UserModerationStatus::new(user_id), None),
            };

            apply(&mut status);

            if self
                .store
                .compare_and_swap(status.clone(), expected_version)
                .await?
            {
                return Ok(status);
            }

            tracing::debug!(%user_id, attempt, "Status write conflicted, retrying");
        }

        tracing::warn!(%user_id, attempts = self.max_write_attempts, "Giving up on status update");
        Err(ModerationError::StatusConflict {
            user_id: user_id.to_string(),
            attempts: self.max_write_attempts,
        })
    }
}
