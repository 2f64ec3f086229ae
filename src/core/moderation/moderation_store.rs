// Storage ports for the moderation engine.
//
// The core defines WHAT it needs from the outside world (rules, audit log,
// user status, report queue) and the infra layer decides HOW.

use super::moderation_models::{
    FlaggedContentReport, ModerationLogEntry, ModerationRule, ReportStatus, UserModerationStatus,
    VersionedStatus,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

/// Failure reported by a store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage call timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors surfaced to callers of operations that must report failure.
#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Status update for user {user_id} kept conflicting after {attempts} attempts")]
    StatusConflict { user_id: String, attempts: u32 },
}

// ============================================================================
// STORAGE TRAITS (PORTS)
// ============================================================================

/// Source of moderation rules.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// All rules with `is_active = true`, in the order they should be evaluated.
    async fn list_active_rules(&self) -> Result<Vec<ModerationRule>, StoreError>;
}

/// Append-only sink for filtering decisions.
#[async_trait]
pub trait ModerationLogSink: Send + Sync {
    async fn append(&self, entry: ModerationLogEntry) -> Result<(), StoreError>;
}

/// Per-user moderation status, keyed by user id.
///
/// Writes are optimistic: `compare_and_swap` only succeeds if the stored
/// version still equals `expected_version` (`None` meaning "no row yet").
#[async_trait]
pub trait UserStatusStore: Send + Sync {
    async fn get_status(&self, user_id: &str) -> Result<Option<VersionedStatus>, StoreError>;

    /// Returns `Ok(false)` when another writer got there first.
    async fn compare_and_swap(
        &self,
        status: UserModerationStatus,
        expected_version: Option<u64>,
    ) -> Result<bool, StoreError>;
}

/// Queue of flagged-content reports awaiting human review.
#[async_trait]
pub trait ReportQueue: Send + Sync {
    async fn enqueue(&self, report: FlaggedContentReport) -> Result<(), StoreError>;

    /// Reports in the given state, oldest first.
    async fn list_by_status(
        &self,
        status: ReportStatus,
        limit: usize,
    ) -> Result<Vec<FlaggedContentReport>, StoreError>;

    /// Returns `Ok(false)` if no report has this id.
    async fn update_status(&self, report_id: &str, status: ReportStatus)
        -> Result<bool, StoreError>;
}

// Shared handles (`Arc<S>`) are stores too, so one store can back several services.

#[async_trait]
impl<S: RuleStore + ?Sized> RuleStore for Arc<S> {
    async fn list_active_rules(&self) -> Result<Vec<ModerationRule>, StoreError> {
        (**self).list_active_rules().await
    }
}

#[async_trait]
impl<S: ModerationLogSink + ?Sized> ModerationLogSink for Arc<S> {
    async fn append(&self, entry: ModerationLogEntry) -> Result<(), StoreError> {
        (**self).append(entry).await
    }
}

#[async_trait]
impl<S: UserStatusStore + ?Sized> UserStatusStore for Arc<S> {
    async fn get_status(&self, user_id: &str) -> Result<Option<VersionedStatus>, StoreError> {
        (**self).get_status(user_id).await
    }

    async fn compare_and_swap(
        &self,
        status: UserModerationStatus,
        expected_version: Option<u64>,
    ) -> Result<bool, StoreError> {
        (**self).compare_and_swap(status, expected_version).await
    }
}

#[async_trait]
impl<S: ReportQueue + ?Sized> ReportQueue for Arc<S> {
    async fn enqueue(&self, report: FlaggedContentReport) -> Result<(), StoreError> {
        (**self).enqueue(report).await
    }

    async fn list_by_status(
        &self,
        status: ReportStatus,
        limit: usize,
    ) -> Result<Vec<FlaggedContentReport>, StoreError> {
        (**self).list_by_status(status, limit).await
    }

    async fn update_status(
        &self,
        report_id: &str,
        status: ReportStatus,
    ) -> Result<bool, StoreError> {
        (**self).update_status(report_id, status).await
    }
}
