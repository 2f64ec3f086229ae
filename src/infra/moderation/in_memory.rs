// In-memory implementations of the moderation store ports.
//
// Used by tests and by embedders that bring no database. DashMap gives
// us per-key locking, which is what makes the status compare-and-swap atomic.

use crate::core::moderation::{
    FlaggedContentReport, ModerationLogEntry, ModerationLogSink, ModerationRule, ReportQueue,
    ReportStatus, RuleStore, StoreError, UserModerationStatus, UserStatusStore, VersionedStatus,
};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

// ============================================================================
// RULES
// ============================================================================

/// Rule store backed by a vector so evaluation order is insertion order.
#[derive(Default)]
pub struct InMemoryRuleStore {
    rules: RwLock<Vec<ModerationRule>>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: Vec<ModerationRule>) -> Self {
        Self {
            rules: RwLock::new(rules),
        }
    }

    /// Insert a rule, or replace the one with the same id in place.
    pub async fn upsert(&self, rule: ModerationRule) {
        let mut rules = self.rules.write().await;
        match rules.iter_mut().find(|existing| existing.id == rule.id) {
            Some(existing) => *existing = rule,
            None => rules.push(rule),
        }
    }

    pub async fn remove(&self, rule_id: &str) -> bool {
        let mut rules = self.rules.write().await;
        let before = rules.len();
        rules.retain(|rule| rule.id != rule_id);
        rules.len() != before
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn list_active_rules(&self) -> Result<Vec<ModerationRule>, StoreError> {
        let rules = self.rules.read().await;
        Ok(rules.iter().filter(|rule| rule.is_active).cloned().collect())
    }
}

// ============================================================================
// AUDIT LOG
// ============================================================================

#[derive(Default)]
pub struct InMemoryLogSink {
    next_seq: AtomicU64,
    entries: DashMap<u64, ModerationLogEntry>,
}

impl InMemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, in write order.
    pub fn entries(&self) -> Vec<ModerationLogEntry> {
        let mut entries: Vec<(u64, ModerationLogEntry)> = self
            .entries
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, entry)| entry).collect()
    }
}

#[async_trait]
impl ModerationLogSink for InMemoryLogSink {
    async fn append(&self, entry: ModerationLogEntry) -> Result<(), StoreError> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.entries.insert(seq, entry);
        Ok(())
    }
}

// ============================================================================
// USER STATUS
// ============================================================================

#[derive(Default)]
pub struct InMemoryUserStatusStore {
    rows: DashMap<String, VersionedStatus>,
}

impl InMemoryUserStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStatusStore for InMemoryUserStatusStore {
    async fn get_status(&self, user_id: &str) -> Result<Option<VersionedStatus>, StoreError> {
        Ok(self.rows.get(user_id).map(|row| row.value().clone()))
    }

    async fn compare_and_swap(
        &self,
        status: UserModerationStatus,
        expected_version: Option<u64>,
    ) -> Result<bool, StoreError> {
        // The entry guard holds the shard lock, so check-and-write is atomic.
        match self.rows.entry(status.user_id.clone()) {
            Entry::Occupied(mut occupied) => {
                let version = occupied.get().version;
                if expected_version != Some(version) {
                    return Ok(false);
                }
                occupied.insert(VersionedStatus {
                    status,
                    version: version + 1,
                });
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                if expected_version.is_some() {
                    return Ok(false);
                }
                vacant.insert(VersionedStatus { status, version: 1 });
                Ok(true)
            }
        }
    }
}

// ============================================================================
// REPORTS
// ============================================================================

#[derive(Default)]
pub struct InMemoryReportQueue {
    next_seq: AtomicU64,
    // report id -> (arrival order, report)
    reports: DashMap<String, (u64, FlaggedContentReport)>,
}

impl InMemoryReportQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// All reports in `status`, oldest first.
    pub fn list(&self, status: ReportStatus) -> Vec<FlaggedContentReport> {
        let mut matching: Vec<(u64, FlaggedContentReport)> = self
            .reports
            .iter()
            .filter(|entry| entry.value().1.status == status)
            .map(|entry| entry.value().clone())
            .collect();
        matching.sort_by_key(|(seq, _)| *seq);
        matching.into_iter().map(|(_, report)| report).collect()
    }
}

#[async_trait]
impl ReportQueue for InMemoryReportQueue {
    async fn enqueue(&self, report: FlaggedContentReport) -> Result<(), StoreError> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.reports.insert(report.id.clone(), (seq, report));
        Ok(())
    }

    async fn list_by_status(
        &self,
        status: ReportStatus,
        limit: usize,
    ) -> Result<Vec<FlaggedContentReport>, StoreError> {
        let mut reports = self.list(status);
        reports.truncate(limit);
        Ok(reports)
    }

    async fn update_status(
        &self,
        report_id: &str,
        status: ReportStatus,
    ) -> Result<bool, StoreError> {
        match self.reports.get_mut(report_id) {
            Some(mut entry) => {
                entry.value_mut().1.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
