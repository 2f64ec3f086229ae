// Content reports - user-initiated flags for content the rules missed.

use super::clock::Clock;
use super::moderation_models::{FlaggedContentReport, NewContentReport, ReportStatus, Severity};
use super::moderation_store::{ModerationError, ReportQueue};
use std::sync::Arc;
use uuid::Uuid;

pub struct ContentReporter<Q: ReportQueue> {
    queue: Q,
    clock: Arc<dyn Clock>,
}

impl<Q: ReportQueue> ContentReporter<Q> {
    pub fn new(queue: Q, clock: Arc<dyn Clock>) -> Self {
        Self { queue, clock }
    }

    /// File a report for manual review. Returns `false` if it could not be stored.
    pub async fn report_content(&self, report: NewContentReport) -> bool {
        let report = FlaggedContentReport {
            id: Uuid::new_v4().to_string(),
            content_type: report.content_type,
            content_id: report.content_id,
            reported_user_id: report.reported_user_id,
            reporter_user_id: report.reporter_user_id,
            content_text: report.content_text,
            reason: report.reason,
            severity: Severity::Medium,
            status: ReportStatus::Pending,
            created_at: self.clock.now(),
        };
        let report_id = report.id.clone();

        match self.queue.enqueue(report).await {
            Ok(()) => {
                tracing::debug!(%report_id, "Queued content report");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to queue content report");
                false
            }
        }
    }

    /// Oldest pending reports first.
    pub async fn pending_reports(
        &self,
        limit: usize,
    ) -> Result<Vec<FlaggedContentReport>, ModerationError> {
        Ok(self
            .queue
            .list_by_status(ReportStatus::Pending, limit)
            .await?)
    }

    /// Close a report. Moving a report back to `pending` is refused.
    pub async fn resolve_report(
        &self,
        report_id: &str,
        status: ReportStatus,
    ) -> Result<bool, ModerationError> {
        if status == ReportStatus::Pending {
            return Ok(false);
        }
        Ok(self.queue.update_status(report_id, status).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::clock::SystemClock;
    use crate::core::moderation::moderation_models::ContentType;
    use crate::core::moderation::moderation_store::StoreError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct MockQueue {
        reports: Mutex<Vec<FlaggedContentReport>>,
    }

    #[async_trait]
    impl ReportQueue for MockQueue {
        async fn enqueue(&self, report: FlaggedContentReport) -> Result<(), StoreError> {
            self.reports.lock().unwrap().push(report);
            Ok(())
        }

        async fn list_by_status(
            &self,
            status: ReportStatus,
            limit: usize,
        ) -> Result<Vec<FlaggedContentReport>, StoreError> {
            Ok(self
                .reports
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.status == status)
                .take(limit)
                .cloned()
                .collect())
        }

        async fn update_status(
            &self,
            report_id: &str,
            status: ReportStatus,
        ) -> Result<bool, StoreError> {
            let mut reports = self.reports.lock().unwrap();
            match reports.iter_mut().find(|r| r.id == report_id) {
                Some(report) => {
                    report.status = status;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
    }

    struct FullQueue;

    #[async_trait]
    impl ReportQueue for FullQueue {
        async fn enqueue(&self, _report: FlaggedContentReport) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("queue offline".to_string()))
        }

        async fn list_by_status(
            &self,
            _status: ReportStatus,
            _limit: usize,
        ) -> Result<Vec<FlaggedContentReport>, StoreError> {
            Err(StoreError::Unavailable("queue offline".to_string()))
        }

        async fn update_status(
            &self,
            _report_id: &str,
            _status: ReportStatus,
        ) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("queue offline".to_string()))
        }
    }

    fn new_report(content_id: &str) -> NewContentReport {
        NewContentReport {
            content_type: ContentType::ChatMessage,
            content_id: content_id.to_string(),
            content_text: "sneaky insult".to_string(),
            reported_user_id: "offender".to_string(),
            reporter_user_id: "viewer".to_string(),
            reason: "harassment".to_string(),
        }
    }

    #[tokio::test]
    async fn test_report_starts_pending_with_medium_severity() {
        let reporter = ContentReporter::new(
            MockQueue {
                reports: Mutex::new(Vec::new()),
            },
            Arc::new(SystemClock),
        );

        assert!(reporter.report_content(new_report("msg-1")).await);

        let pending = reporter.pending_reports(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].status, ReportStatus::Pending);
        assert_eq!(pending[0].severity, Severity::Medium);
        assert_eq!(pending[0].content_id, "msg-1");
        assert_eq!(pending[0].reported_user_id, "offender");
    }

    #[tokio::test]
    async fn test_storage_failure_returns_false() {
        let reporter = ContentReporter::new(FullQueue, Arc::new(SystemClock));
        assert!(!reporter.report_content(new_report("msg-1")).await);
        assert!(reporter.pending_reports(10).await.is_err());
    }

    #[tokio::test]
    async fn test_resolving_removes_from_pending() {
        let reporter = ContentReporter::new(
            MockQueue {
                reports: Mutex::new(Vec::new()),
            },
            Arc::new(SystemClock),
        );
        reporter.report_content(new_report("msg-1")).await;
        reporter.report_content(new_report("msg-2")).await;

        let first = reporter.pending_reports(10).await.unwrap()[0].id.clone();
        assert!(reporter
            .resolve_report(&first, ReportStatus::Actioned)
            .await
            .unwrap());
        assert!(!reporter
            .resolve_report(&first, ReportStatus::Pending)
            .await
            .unwrap());
        assert!(!reporter
            .resolve_report("missing", ReportStatus::Dismissed)
            .await
            .unwrap());

        let pending = reporter.pending_reports(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].content_id, "msg-2");
    }
}
