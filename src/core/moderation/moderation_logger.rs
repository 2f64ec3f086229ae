// Moderation logger - best-effort audit trail of filtering decisions.
//
// A write that fails or takes longer than the timeout is logged locally and
// dropped. It never changes the verdict already computed for the caller.

use super::moderation_models::ModerationLogEntry;
use super::moderation_store::{ModerationLogSink, StoreError};
use std::time::Duration;

pub struct ModerationLogger<L: ModerationLogSink> {
    sink: L,
    write_timeout: Duration,
}

impl<L: ModerationLogSink> ModerationLogger<L> {
    pub fn new(sink: L, write_timeout: Duration) -> Self {
        Self {
            sink,
            write_timeout,
        }
    }

    /// Append `entry` to the sink. Returns whether the write landed.
    pub async fn log_decision(&self, entry: ModerationLogEntry) -> bool {
        let user_id = entry.user_id.clone();
        let action = entry.action_taken;

        let outcome = tokio::time::timeout(self.write_timeout, self.sink.append(entry))
            .await
            .unwrap_or(Err(StoreError::Timeout(self.write_timeout)));

        match outcome {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(%user_id, %action, error = %e, "Failed to write moderation log entry");
                false
            }
        }
    }
}
