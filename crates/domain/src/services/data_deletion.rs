//! Data deletion approval workflow.
//!
//! Every status change is a compare-and-set at the storage layer: the write
//! applies only if the stored status is still one of the allowed predecessors.
//! The losing side of a race gets `Conflict`.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use shared::pagination::{PageRequest, Pagination};
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::error::{DomainError, DomainResult};
use crate::models::data_deletion::{
    CreateDeletionRequestRequest, DataDeletionRequest, DeletionStatus, DeletionSummary,
    DeletionTransition, ListDeletionRequestsQuery, NewDeletionRequest, SubjectRef,
    DELETION_GRACE_PERIOD_DAYS,
};
use crate::models::AuditAction;
use crate::services::audit::{AuditEntryBuilder, AuditSink};
use crate::services::clock::Clock;

/// Attempts at generating a unique request number before giving up.
const REQUEST_NUMBER_ATTEMPTS: usize = 3;

/// Storage collaborator for deletion requests.
#[async_trait::async_trait]
pub trait DeletionRequestStore: Send + Sync {
    /// Inserts a request. Returns `Conflict` when the request number is taken.
    async fn insert(&self, request: NewDeletionRequest) -> DomainResult<DataDeletionRequest>;

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<DataDeletionRequest>>;

    async fn list(
        &self,
        query: &ListDeletionRequestsQuery,
        page: PageRequest,
    ) -> DomainResult<(Vec<DataDeletionRequest>, i64)>;

    /// Moves the request to `to` only if its stored status is one of `from`.
    ///
    /// Returns `None` when the request is missing or its status did not match.
    async fn transition(
        &self,
        id: Uuid,
        from: &[DeletionStatus],
        to: DeletionStatus,
        changes: DeletionTransition,
    ) -> DomainResult<Option<DataDeletionRequest>>;

    /// Approved requests whose scheduled date is at or before `now`, oldest first.
    async fn find_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> DomainResult<Vec<DataDeletionRequest>>;
}

/// Performs the actual erasure of a subject's data.
#[async_trait::async_trait]
pub trait DataEraser: Send + Sync {
    async fn erase(&self, request: &DataDeletionRequest) -> DomainResult<DeletionSummary>;
}

/// Eraser that deletes nothing and reports zero items per data type.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunEraser;

#[async_trait::async_trait]
impl DataEraser for DryRunEraser {
    async fn erase(&self, request: &DataDeletionRequest) -> DomainResult<DeletionSummary> {
        info!(
            request_number = %request.request_number,
            subject_id = %request.subject.subject_id,
            data_types = ?request.data_types,
            "Dry run: would erase subject data"
        );
        Ok(DeletionSummary {
            counts: request
                .data_types
                .iter()
                .map(|t| (t.clone(), 0))
                .collect(),
            hard_delete: request.hard_delete,
            dry_run: true,
        })
    }
}

/// Outcome of one polling pass over due requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub executed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// A page of deletion requests.
#[derive(Debug, Clone)]
pub struct DeletionRequestPage {
    pub data: Vec<DataDeletionRequest>,
    pub pagination: Pagination,
}

/// Data deletion workflow service.
#[derive(Clone)]
pub struct DataDeletionService {
    store: Arc<dyn DeletionRequestStore>,
    eraser: Arc<dyn DataEraser>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    grace_period: Duration,
}

impl DataDeletionService {
    pub fn new(
        store: Arc<dyn DeletionRequestStore>,
        eraser: Arc<dyn DataEraser>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        grace_period_days: i64,
    ) -> Self {
        Self {
            store,
            eraser,
            audit,
            clock,
            grace_period: Duration::days(grace_period_days.max(DELETION_GRACE_PERIOD_DAYS)),
        }
    }

    pub async fn create(
        &self,
        request: CreateDeletionRequestRequest,
        admin_id: Option<&str>,
    ) -> DomainResult<DataDeletionRequest> {
        request.validate()?;
        if request.data_types.iter().any(|t| t.trim().is_empty()) {
            return Err(DomainError::Validation("Data types must not be blank".into()));
        }

        let subject = SubjectRef {
            subject_type: request.subject_type,
            subject_id: request.subject_id,
        };

        let mut attempt = 0;
        let created = loop {
            attempt += 1;
            let now = self.clock.now();
            let result = self
                .store
                .insert(NewDeletionRequest {
                    request_number: shared::ids::generate_request_number(now),
                    subject: subject.clone(),
                    reason: request.reason.clone(),
                    data_types: request.data_types.clone(),
                    hard_delete: request.hard_delete,
                    requested_by: admin_id.map(str::to_string),
                    created_at: now,
                })
                .await;
            match result {
                Err(DomainError::Conflict(_)) if attempt < REQUEST_NUMBER_ATTEMPTS => {
                    warn!(attempt, "Request number collision, regenerating");
                }
                other => break other?,
            }
        };

        info!(
            request_id = %created.id,
            request_number = %created.request_number,
            subject_id = %created.subject.subject_id,
            "Data deletion request created"
        );
        self.record(AuditAction::DeletionRequestCreate, &created, admin_id)
            .await;
        Ok(created)
    }

    pub async fn get(&self, id: Uuid) -> DomainResult<DataDeletionRequest> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("Deletion request {} not found", id)))
    }

    pub async fn list(
        &self,
        query: &ListDeletionRequestsQuery,
    ) -> DomainResult<DeletionRequestPage> {
        let page = PageRequest::new(query.page, query.per_page);
        let (data, total) = self.store.list(query, page).await?;
        Ok(DeletionRequestPage {
            data,
            pagination: Pagination::new(page, total),
        })
    }

    /// `pending -> under-review`.
    pub async fn start_review(
        &self,
        id: Uuid,
        admin_id: Option<&str>,
    ) -> DomainResult<DataDeletionRequest> {
        let now = self.clock.now();
        let updated = self
            .apply(
                id,
                &[DeletionStatus::Pending],
                DeletionStatus::UnderReview,
                DeletionTransition {
                    reviewed_by: admin_id.map(str::to_string),
                    reviewed_at: Some(now),
                    updated_at: Some(now),
                    ..Default::default()
                },
            )
            .await?;

        info!(request_id = %id, "Data deletion request under review");
        self.record(AuditAction::DeletionRequestReview, &updated, admin_id)
            .await;
        Ok(updated)
    }

    /// `pending | under-review -> approved`, scheduling execution after the grace period.
    pub async fn approve(
        &self,
        id: Uuid,
        admin_id: Option<&str>,
    ) -> DomainResult<DataDeletionRequest> {
        let now = self.clock.now();
        let updated = self
            .apply(
                id,
                &DeletionStatus::REVIEWABLE,
                DeletionStatus::Approved,
                DeletionTransition {
                    approved_by: admin_id.map(str::to_string),
                    approved_at: Some(now),
                    scheduled_deletion_date: Some(now + self.grace_period),
                    updated_at: Some(now),
                    ..Default::default()
                },
            )
            .await?;

        info!(
            request_id = %id,
            scheduled_deletion_date = ?updated.scheduled_deletion_date,
            "Data deletion request approved"
        );
        self.record(AuditAction::DeletionRequestApprove, &updated, admin_id)
            .await;
        Ok(updated)
    }

    /// `pending | under-review -> rejected`.
    pub async fn reject(
        &self,
        id: Uuid,
        reason: &str,
        admin_id: Option<&str>,
    ) -> DomainResult<DataDeletionRequest> {
        if reason.trim().is_empty() {
            return Err(DomainError::Validation("Rejection reason is required".into()));
        }

        let now = self.clock.now();
        let updated = self
            .apply(
                id,
                &DeletionStatus::REVIEWABLE,
                DeletionStatus::Rejected,
                DeletionTransition {
                    reviewed_by: admin_id.map(str::to_string),
                    reviewed_at: Some(now),
                    rejection_reason: Some(reason.to_string()),
                    updated_at: Some(now),
                    ..Default::default()
                },
            )
            .await?;

        info!(request_id = %id, "Data deletion request rejected");
        self.record(AuditAction::DeletionRequestReject, &updated, admin_id)
            .await;
        Ok(updated)
    }

    /// `approved -> processing -> completed`, once the grace period has elapsed.
    ///
    /// A request already processing or completed is a `Conflict`. If erasure
    /// fails the request goes back to `approved` and the error is returned as
    /// `ExternalFailure`.
    pub async fn execute_deletion(
        &self,
        id: Uuid,
        admin_id: Option<&str>,
    ) -> DomainResult<DataDeletionRequest> {
        let current = self.get(id).await?;
        if current.status != DeletionStatus::Approved {
            return Err(DomainError::Conflict(format!(
                "Cannot execute deletion request in status '{}'",
                current.status
            )));
        }

        let now = self.clock.now();
        match current.scheduled_deletion_date {
            Some(scheduled) if scheduled <= now => {}
            Some(scheduled) => {
                return Err(DomainError::Conflict(format!(
                    "Grace period has not elapsed; deletion scheduled for {}",
                    scheduled.to_rfc3339()
                )));
            }
            None => {
                return Err(DomainError::Conflict(
                    "Approved request has no scheduled deletion date".into(),
                ));
            }
        }

        let processing = self
            .apply(
                id,
                &[DeletionStatus::Approved],
                DeletionStatus::Processing,
                DeletionTransition {
                    updated_at: Some(now),
                    ..Default::default()
                },
            )
            .await?;

        let summary = match self.eraser.erase(&processing).await {
            Ok(summary) => summary,
            Err(e) => {
                error!(request_id = %id, error = %e, "Data erasure failed, returning request to approved");
                let reverted = self
                    .store
                    .transition(
                        id,
                        &[DeletionStatus::Processing],
                        DeletionStatus::Approved,
                        DeletionTransition {
                            updated_at: Some(self.clock.now()),
                            ..Default::default()
                        },
                    )
                    .await;
                if let Err(revert_err) = reverted {
                    error!(request_id = %id, error = %revert_err, "Failed to revert request status");
                }
                return Err(match e {
                    DomainError::ExternalFailure(_) => e,
                    other => DomainError::ExternalFailure(other.to_string()),
                });
            }
        };

        let finished = self.clock.now();
        let total = summary.total();
        let completed = self
            .apply(
                id,
                &[DeletionStatus::Processing],
                DeletionStatus::Completed,
                DeletionTransition {
                    deleted_by: admin_id.map(str::to_string),
                    deleted_at: Some(finished),
                    deletion_summary: Some(summary),
                    updated_at: Some(finished),
                    ..Default::default()
                },
            )
            .await?;

        metrics::counter!("data_deletions_executed_total").increment(1);
        info!(
            request_id = %id,
            request_number = %completed.request_number,
            items_deleted = total,
            "Data deletion executed"
        );

        let builder = match admin_id {
            Some(_) => AuditEntryBuilder::admin_action(admin_id, AuditAction::DeletionRequestExecute),
            None => AuditEntryBuilder::system_action(AuditAction::DeletionRequestExecute),
        };
        let entry = builder
            .on_resource("data_deletion_request", completed.id.to_string())
            .with_metadata("status", completed.status.as_str())
            .with_metadata("items_deleted", total)
            .build(finished);
        self.audit.record(entry).await;

        Ok(completed)
    }

    /// Executes every approved request whose grace period has elapsed.
    pub async fn execute_due(&self, limit: i64) -> DomainResult<ExecutionReport> {
        let due = self.store.find_due(self.clock.now(), limit).await?;
        let mut report = ExecutionReport::default();

        for request in due {
            match self.execute_deletion(request.id, None).await {
                Ok(_) => report.executed += 1,
                Err(DomainError::Conflict(msg)) => {
                    info!(request_id = %request.id, reason = %msg, "Skipping deletion request");
                    report.skipped += 1;
                }
                Err(e) => {
                    error!(request_id = %request.id, error = %e, "Scheduled deletion failed");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    async fn apply(
        &self,
        id: Uuid,
        from: &[DeletionStatus],
        to: DeletionStatus,
        changes: DeletionTransition,
    ) -> DomainResult<DataDeletionRequest> {
        if let Some(updated) = self.store.transition(id, from, to, changes).await? {
            return Ok(updated);
        }

        match self.store.find_by_id(id).await? {
            None => Err(DomainError::NotFound(format!(
                "Deletion request {} not found",
                id
            ))),
            Some(current) => Err(DomainError::Conflict(format!(
                "Cannot move deletion request from '{}' to '{}'",
                current.status, to
            ))),
        }
    }

    async fn record(
        &self,
        action: AuditAction,
        request: &DataDeletionRequest,
        admin_id: Option<&str>,
    ) {
        let mut builder = AuditEntryBuilder::admin_action(admin_id, action)
            .on_resource("data_deletion_request", request.id.to_string())
            .with_metadata("status", request.status.as_str());
        if let Some(scheduled) = request.scheduled_deletion_date {
            builder = builder.with_metadata("scheduled_deletion_date", scheduled.to_rfc3339());
        }
        if let Some(reason) = &request.rejection_reason {
            builder = builder.with_metadata("reason", reason.clone());
        }
        self.audit.record(builder.build(self.clock.now())).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::data_deletion::SubjectType;
    use crate::services::memory::{
        FakeDataEraser, InMemoryDeletionRequestStore, ManualClock, RecordingAuditSink,
    };
    use chrono::TimeZone;

    struct Fixture {
        service: DataDeletionService,
        eraser: Arc<FakeDataEraser>,
        audit: Arc<RecordingAuditSink>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryDeletionRequestStore::new());
        let eraser = Arc::new(FakeDataEraser::new());
        let audit = Arc::new(RecordingAuditSink::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap(),
        ));
        let service = DataDeletionService::new(
            store,
            eraser.clone(),
            audit.clone(),
            clock.clone(),
            DELETION_GRACE_PERIOD_DAYS,
        );
        Fixture {
            service,
            eraser,
            audit,
            clock,
        }
    }

    fn create_request() -> CreateDeletionRequestRequest {
        CreateDeletionRequestRequest {
            subject_type: SubjectType::Customer,
            subject_id: "cus_123".into(),
            reason: "Customer asked to close the account".into(),
            data_types: vec!["profile".into(), "orders".into()],
            hard_delete: false,
        }
    }

    async fn approved(f: &Fixture) -> DataDeletionRequest {
        let created = f.service.create(create_request(), Some("admin-1")).await.unwrap();
        f.service.approve(created.id, Some("admin-2")).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_generates_request_number() {
        let f = fixture();
        let created = f.service.create(create_request(), Some("admin-1")).await.unwrap();
        assert_eq!(created.status, DeletionStatus::Pending);
        assert!(created.request_number.starts_with("DDR-20261016-"));
        assert_eq!(created.requested_by.as_deref(), Some("admin-1"));
    }

    #[tokio::test]
    async fn test_create_validates() {
        let f = fixture();
        let mut request = create_request();
        request.data_types = vec![];
        assert!(matches!(
            f.service.create(request, None).await,
            Err(DomainError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_approve_schedules_after_grace_period() {
        let f = fixture();
        let request = approved(&f).await;
        let approved_at = request.approved_at.unwrap();
        assert_eq!(request.status, DeletionStatus::Approved);
        assert_eq!(request.approved_by.as_deref(), Some("admin-2"));
        assert!(request.scheduled_deletion_date.unwrap() >= approved_at + Duration::days(30));
    }

    #[tokio::test]
    async fn test_review_then_approve() {
        let f = fixture();
        let created = f.service.create(create_request(), None).await.unwrap();
        let reviewing = f.service.start_review(created.id, Some("admin-1")).await.unwrap();
        assert_eq!(reviewing.status, DeletionStatus::UnderReview);
        assert_eq!(reviewing.reviewed_by.as_deref(), Some("admin-1"));

        assert!(matches!(
            f.service.start_review(created.id, Some("admin-1")).await,
            Err(DomainError::Conflict(_))
        ));

        let approved = f.service.approve(created.id, Some("admin-2")).await.unwrap();
        assert_eq!(approved.status, DeletionStatus::Approved);
    }

    #[tokio::test]
    async fn test_reject_is_terminal() {
        let f = fixture();
        let created = f.service.create(create_request(), None).await.unwrap();
        let rejected = f
            .service
            .reject(created.id, "Active legal hold", Some("admin-1"))
            .await
            .unwrap();
        assert_eq!(rejected.status, DeletionStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("Active legal hold"));

        assert!(matches!(
            f.service.approve(created.id, Some("admin-1")).await,
            Err(DomainError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_reject_approved_conflicts() {
        let f = fixture();
        let request = approved(&f).await;
        assert!(matches!(
            f.service.reject(request.id, "Changed mind", None).await,
            Err(DomainError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_reject_requires_reason() {
        let f = fixture();
        let created = f.service.create(create_request(), None).await.unwrap();
        assert!(matches!(
            f.service.reject(created.id, "  ", None).await,
            Err(DomainError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_request_not_found() {
        let f = fixture();
        assert!(matches!(
            f.service.approve(Uuid::new_v4(), None).await,
            Err(DomainError::NotFound(_))
        ));
        assert!(matches!(
            f.service.execute_deletion(Uuid::new_v4(), None).await,
            Err(DomainError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_execute_before_grace_period_conflicts() {
        let f = fixture();
        let request = approved(&f).await;
        f.clock.advance(Duration::days(29));
        assert!(matches!(
            f.service.execute_deletion(request.id, Some("admin-1")).await,
            Err(DomainError::Conflict(_))
        ));
        assert_eq!(f.eraser.calls(), 0);
    }

    #[tokio::test]
    async fn test_execute_pending_conflicts() {
        let f = fixture();
        let created = f.service.create(create_request(), None).await.unwrap();
        assert!(matches!(
            f.service.execute_deletion(created.id, None).await,
            Err(DomainError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_execute_once() {
        let f = fixture();
        let request = approved(&f).await;
        f.clock.advance(Duration::days(30));

        let completed = f
            .service
            .execute_deletion(request.id, Some("admin-3"))
            .await
            .unwrap();
        assert_eq!(completed.status, DeletionStatus::Completed);
        assert_eq!(completed.deleted_by.as_deref(), Some("admin-3"));
        let summary = completed.deletion_summary.unwrap();
        assert_eq!(summary.counts.len(), 2);

        assert!(matches!(
            f.service.execute_deletion(request.id, Some("admin-3")).await,
            Err(DomainError::Conflict(_))
        ));
        assert_eq!(f.eraser.calls(), 1);

        assert!(matches!(
            f.service.approve(request.id, None).await,
            Err(DomainError::Conflict(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_approve_and_reject_have_one_winner() {
        let f = fixture();
        for _ in 0..50 {
            let created = f.service.create(create_request(), None).await.unwrap();
            let id = created.id;
            let approver = f.service.clone();
            let rejecter = f.service.clone();

            let (approve, reject) = tokio::join!(
                tokio::spawn(async move { approver.approve(id, Some("admin-1")).await }),
                tokio::spawn(async move { rejecter.reject(id, "Legal hold", Some("admin-2")).await }),
            );
            let (approve, reject) = (approve.unwrap(), reject.unwrap());

            assert!(approve.is_ok() != reject.is_ok());
            let (loser, expected) = match (approve, reject) {
                (Ok(_), Err(e)) => (e, DeletionStatus::Approved),
                (Err(e), Ok(_)) => (e, DeletionStatus::Rejected),
                _ => unreachable!(),
            };
            assert!(matches!(loser, DomainError::Conflict(_)));
            assert_eq!(f.service.get(id).await.unwrap().status, expected);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_execute_erases_once() {
        let f = fixture();
        let request = approved(&f).await;
        f.clock.advance(Duration::days(30));

        let first = f.service.clone();
        let second = f.service.clone();
        let id = request.id;
        let (a, b) = tokio::join!(
            tokio::spawn(async move { first.execute_deletion(id, Some("admin-3")).await }),
            tokio::spawn(async move { second.execute_deletion(id, Some("admin-4")).await }),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert!(a.is_ok() != b.is_ok());
        assert!(matches!(a.err().or(b.err()), Some(DomainError::Conflict(_))));
        assert_eq!(f.eraser.calls(), 1);
        assert_eq!(
            f.service.get(id).await.unwrap().status,
            DeletionStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_eraser_failure_reverts_to_approved() {
        let f = fixture();
        let request = approved(&f).await;
        f.clock.advance(Duration::days(31));
        f.eraser.set_failing(true);

        assert!(matches!(
            f.service.execute_deletion(request.id, None).await,
            Err(DomainError::ExternalFailure(_))
        ));
        assert_eq!(
            f.service.get(request.id).await.unwrap().status,
            DeletionStatus::Approved
        );

        f.eraser.set_failing(false);
        let completed = f.service.execute_deletion(request.id, None).await.unwrap();
        assert_eq!(completed.status, DeletionStatus::Completed);
    }

    #[tokio::test]
    async fn test_execute_due() {
        let f = fixture();
        let first = approved(&f).await;
        f.clock.advance(Duration::days(10));
        let second = approved(&f).await;
        f.service.create(create_request(), None).await.unwrap();

        f.clock.advance(Duration::days(25));
        let report = f.service.execute_due(10).await.unwrap();
        assert_eq!(report.executed, 1);
        assert_eq!(
            f.service.get(first.id).await.unwrap().status,
            DeletionStatus::Completed
        );
        assert_eq!(
            f.service.get(second.id).await.unwrap().status,
            DeletionStatus::Approved
        );

        f.clock.advance(Duration::days(10));
        let report = f.service.execute_due(10).await.unwrap();
        assert_eq!(report.executed, 1);
        assert_eq!(f.service.execute_due(10).await.unwrap(), ExecutionReport::default());
    }

    #[tokio::test]
    async fn test_mutations_are_audited() {
        let f = fixture();
        let request = approved(&f).await;
        f.clock.advance(Duration::days(30));
        f.service.execute_deletion(request.id, None).await.unwrap();

        let actions: Vec<_> = f.audit.entries().iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![
                AuditAction::DeletionRequestCreate,
                AuditAction::DeletionRequestApprove,
                AuditAction::DeletionRequestExecute,
            ]
        );
    }

    #[tokio::test]
    async fn test_dry_run_eraser_reports_zero_counts() {
        let f = fixture();
        let request = approved(&f).await;
        let summary = DryRunEraser.erase(&request).await.unwrap();
        assert!(summary.dry_run);
        assert_eq!(summary.total(), 0);
        assert_eq!(summary.counts.keys().cloned().collect::<Vec<_>>(), vec!["orders", "profile"]);
    }
}
