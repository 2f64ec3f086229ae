// Severity scoring for a single filtering pass.

use super::moderation_models::Severity;

/// Scores at or above this go to manual review (the `high` weight).
pub const MANUAL_REVIEW_THRESHOLD: u32 = Severity::High.weight();

/// Running sum of severity weights. No decay, no normalization.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeverityAccumulator {
    total: u32,
}

impl SeverityAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, severity: Severity) {
        self.total = self.total.saturating_add(severity.weight());
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn reaches_review_threshold(&self) -> bool {
        self.total >= MANUAL_REVIEW_THRESHOLD
    }
}

/// Whether a score counts as a sub-critical (warning-level) violation.
pub fn is_warning_level(score: u32) -> bool {
    score < MANUAL_REVIEW_THRESHOLD
}
