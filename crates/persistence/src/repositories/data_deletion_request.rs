//! Data deletion request repository.
//!
//! Status changes go through a single compare-and-set update so concurrent
//! reviewers and the execution job cannot both win a transition.

use chrono::{DateTime, Utc};
use domain::models::data_deletion::{
    DeletionTransition, ListDeletionRequestsQuery, NewDeletionRequest,
};
use domain::models::{DataDeletionRequest, DeletionStatus};
use domain::services::DeletionRequestStore;
use domain::DomainResult;
use shared::pagination::PageRequest;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::{DataDeletionRequestEntity, DeletionStatusDb, SubjectTypeDb};
use crate::metrics::QueryTimer;

/// Repository for the data_deletion_requests table.
#[derive(Clone)]
pub struct DeletionRequestRepository {
    pool: PgPool,
}

impl DeletionRequestRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DeletionRequestStore for DeletionRequestRepository {
    async fn insert(&self, request: NewDeletionRequest) -> DomainResult<DataDeletionRequest> {
        let timer = QueryTimer::new("insert_deletion_request");
        let result = sqlx::query_as::<_, DataDeletionRequestEntity>(
            r#"
            INSERT INTO data_deletion_requests (
                request_number, subject_type, subject_id, reason, data_types,
                hard_delete, requested_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING *
            "#,
        )
        .bind(&request.request_number)
        .bind(SubjectTypeDb::from(request.subject.subject_type))
        .bind(&request.subject.subject_id)
        .bind(&request.reason)
        .bind(&request.data_types)
        .bind(request.hard_delete)
        .bind(&request.requested_by)
        .bind(request.created_at)
        .fetch_one(&self.pool)
        .await;
        timer.record_result(&result);

        Ok(result?.into())
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<DataDeletionRequest>> {
        let timer = QueryTimer::new("find_deletion_request_by_id");
        let result = sqlx::query_as::<_, DataDeletionRequestEntity>(
            "SELECT * FROM data_deletion_requests WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record_result(&result);

        Ok(result?.map(Into::into))
    }

    async fn list(
        &self,
        query: &ListDeletionRequestsQuery,
        page: PageRequest,
    ) -> DomainResult<(Vec<DataDeletionRequest>, i64)> {
        let mut conditions: Vec<String> = vec!["TRUE".to_string()];
        let mut param_count = 0;

        if query.status.is_some() {
            param_count += 1;
            conditions.push(format!("status = ${}", param_count));
        }
        if query.subject_id.is_some() {
            param_count += 1;
            conditions.push(format!("subject_id = ${}", param_count));
        }
        let where_clause = conditions.join(" AND ");

        let count_sql = format!(
            "SELECT COUNT(*) FROM data_deletion_requests WHERE {}",
            where_clause
        );
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(status) = query.status {
            count_query = count_query.bind(DeletionStatusDb::from(status));
        }
        if let Some(ref subject_id) = query.subject_id {
            count_query = count_query.bind(subject_id);
        }
        let total = count_query.fetch_one(&self.pool).await?;

        let list_sql = format!(
            "SELECT * FROM data_deletion_requests WHERE {} ORDER BY created_at DESC LIMIT ${} OFFSET ${}",
            where_clause,
            param_count + 1,
            param_count + 2
        );
        let mut list_query = sqlx::query_as::<_, DataDeletionRequestEntity>(&list_sql);
        if let Some(status) = query.status {
            list_query = list_query.bind(DeletionStatusDb::from(status));
        }
        if let Some(ref subject_id) = query.subject_id {
            list_query = list_query.bind(subject_id);
        }

        let timer = QueryTimer::new("list_deletion_requests");
        let result = list_query
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await;
        timer.record_result(&result);

        Ok((result?.into_iter().map(Into::into).collect(), total))
    }

    async fn transition(
        &self,
        id: Uuid,
        from: &[DeletionStatus],
        to: DeletionStatus,
        changes: DeletionTransition,
    ) -> DomainResult<Option<DataDeletionRequest>> {
        let from: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();

        let timer = QueryTimer::new("transition_deletion_request");
        let result = sqlx::query_as::<_, DataDeletionRequestEntity>(
            r#"
            UPDATE data_deletion_requests
            SET status = $3,
                reviewed_by = COALESCE($4, reviewed_by),
                reviewed_at = COALESCE($5, reviewed_at),
                rejection_reason = COALESCE($6, rejection_reason),
                approved_by = COALESCE($7, approved_by),
                approved_at = COALESCE($8, approved_at),
                scheduled_deletion_date = COALESCE($9, scheduled_deletion_date),
                deleted_by = COALESCE($10, deleted_by),
                deleted_at = COALESCE($11, deleted_at),
                deletion_summary = COALESCE($12, deletion_summary),
                updated_at = COALESCE($13, NOW())
            WHERE id = $1 AND status::TEXT = ANY($2)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&from)
        .bind(DeletionStatusDb::from(to))
        .bind(&changes.reviewed_by)
        .bind(changes.reviewed_at)
        .bind(&changes.rejection_reason)
        .bind(&changes.approved_by)
        .bind(changes.approved_at)
        .bind(changes.scheduled_deletion_date)
        .bind(&changes.deleted_by)
        .bind(changes.deleted_at)
        .bind(changes.deletion_summary.map(Json))
        .bind(changes.updated_at)
        .fetch_optional(&self.pool)
        .await;
        timer.record_result(&result);

        Ok(result?.map(Into::into))
    }

    async fn find_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> DomainResult<Vec<DataDeletionRequest>> {
        let timer = QueryTimer::new("find_due_deletion_requests");
        let result = sqlx::query_as::<_, DataDeletionRequestEntity>(
            r#"
            SELECT * FROM data_deletion_requests
            WHERE status = 'approved' AND scheduled_deletion_date <= $1
            ORDER BY scheduled_deletion_date ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await;
        timer.record_result(&result);

        Ok(result?.into_iter().map(Into::into).collect())
    }
}
