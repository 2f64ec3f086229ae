// Rule cache - in-memory snapshot of the active rule set with a TTL.
//
// Refresh rules:
// - A snapshot older than the TTL triggers a refresh on the next read.
// - Only one refresh runs at a time. Concurrent readers get the current
//   snapshot instead of waiting on the store.
// - A failed or timed-out refresh keeps the previous snapshot. If no fetch
//   has ever succeeded the snapshot is empty (fail-open).

use super::clock::Clock;
use super::moderation_store::{RuleStore, StoreError};
use super::rule_matcher::CompiledRule;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// An immutable, compiled set of active rules.
#[derive(Debug, Default)]
pub struct RuleSnapshot {
    rules: Vec<Arc<CompiledRule>>,
    fetched_at: Option<DateTime<Utc>>,
}

impl RuleSnapshot {
    fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match self.fetched_at {
            // A negative age means the clock stepped backwards; refetch.
            Some(fetched_at) => (now - fetched_at).to_std().map_or(false, |age| age < ttl),
            None => false,
        }
    }

    /// Rules applicable to `context`, in store order.
    pub fn for_context(&self, context: &str) -> Vec<Arc<CompiledRule>> {
        self.rules
            .iter()
            .filter(|rule| rule.rule().applies_to(context))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }
}

/// TTL cache over a [`RuleStore`] with single-flight refresh.
pub struct RuleCache<R: RuleStore> {
    store: R,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    refresh_timeout: Duration,
    snapshot: RwLock<Arc<RuleSnapshot>>,
    refresh_lock: Mutex<()>,
}

impl<R: RuleStore> RuleCache<R> {
    pub fn new(store: R, clock: Arc<dyn Clock>, ttl: Duration, refresh_timeout: Duration) -> Self {
        Self {
            store,
            clock,
            ttl,
            refresh_timeout,
            snapshot: RwLock::new(Arc::new(RuleSnapshot::default())),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Active rules applicable to `context`, refreshing first if the snapshot expired.
    pub async fn get_active_rules(&self, context: &str) -> Vec<Arc<CompiledRule>> {
        self.current_snapshot().await.for_context(context)
    }

    /// The snapshot to filter against, refreshed if stale and nobody else is refreshing.
    pub async fn current_snapshot(&self) -> Arc<RuleSnapshot> {
        let snapshot = self.snapshot.read().await.clone();
        if snapshot.is_fresh(self.clock.now(), self.ttl) {
            return snapshot;
        }

        // Someone else is already refreshing: serve what we have.
        let Ok(_guard) = self.refresh_lock.try_lock() else {
            return snapshot;
        };

        // The refresh we were waiting on may have just finished.
        let latest = self.snapshot.read().await.clone();
        if latest.is_fresh(self.clock.now(), self.ttl) {
            return latest;
        }

        match self.fetch().await {
            Ok(fresh) => fresh,
            Err(e) => {
                tracing::warn!(error = %e, cached_rules = latest.len(), "Rule refresh failed, serving cached rules");
                latest
            }
        }
    }

    /// Force a refresh now. Returns `false` if the store could not be reached
    /// or another refresh was already running.
    pub async fn refresh_now(&self) -> bool {
        let Ok(_guard) = self.refresh_lock.try_lock() else {
            return false;
        };

        match self.fetch().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Forced rule refresh failed");
                false
            }
        }
    }

    /// Mark the snapshot stale so the next read refreshes. The old rules are
    /// still served if that refresh fails.
    pub async fn invalidate(&self) {
        let mut snapshot = self.snapshot.write().await;
        *snapshot = Arc::new(RuleSnapshot {
            rules: snapshot.rules.clone(),
            fetched_at: None,
        });
    }

    /// Fetch, compile and install a new snapshot. Caller must hold `refresh_lock`.
    async fn fetch(&self) -> Result<Arc<RuleSnapshot>, StoreError> {
        let rules = tokio::time::timeout(self.refresh_timeout, self.store.list_active_rules())
            .await
            .map_err(|_| StoreError::Timeout(self.refresh_timeout))??;

        let compiled: Vec<Arc<CompiledRule>> = rules
            .into_iter()
            .filter(|rule| rule.is_active)
            .map(|rule| Arc::new(CompiledRule::new(rule)))
            .collect();

        for rule in &compiled {
            if let Some(e) = rule.compile_error() {
                tracing::warn!(rule_id = %e.rule_id, error = %e.source, "Active rule has an invalid pattern");
            }
        }

        let fresh = Arc::new(RuleSnapshot {
            rules: compiled,
            fetched_at: Some(self.clock.now()),
        });
        *self.snapshot.write().await = Arc::clone(&fresh);

        tracing::debug!(rule_count = fresh.len(), "Refreshed moderation rules");
        Ok(fresh)
    }
}
