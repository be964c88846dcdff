//! Backup record repository.

use chrono::{DateTime, Utc};
use domain::models::backup::{BackupCompletion, ListBackupsQuery, NewBackupRecord};
use domain::models::BackupRecord;
use domain::services::BackupStore;
use domain::DomainResult;
use shared::pagination::PageRequest;
use sqlx::PgPool;

use crate::entities::{BackupEntity, BackupStatusDb, BackupTypeDb};
use crate::metrics::QueryTimer;

/// Repository for the backups table.
#[derive(Clone)]
pub struct BackupRepository {
    pool: PgPool,
}

impl BackupRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl BackupStore for BackupRepository {
    async fn insert(&self, record: NewBackupRecord) -> DomainResult<BackupRecord> {
        let timer = QueryTimer::new("insert_backup");
        let result = sqlx::query_as::<_, BackupEntity>(
            r#"
            INSERT INTO backups (
                backup_id, backup_type, collections, description, created_by,
                expires_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING *
            "#,
        )
        .bind(&record.backup_id)
        .bind(BackupTypeDb::from(record.backup_type))
        .bind(&record.collections)
        .bind(&record.description)
        .bind(&record.created_by)
        .bind(record.expires_at)
        .bind(record.created_at)
        .fetch_one(&self.pool)
        .await;
        timer.record_result(&result);

        Ok(result?.into())
    }

    async fn find_by_backup_id(&self, backup_id: &str) -> DomainResult<Option<BackupRecord>> {
        let timer = QueryTimer::new("find_backup_by_id");
        let result = sqlx::query_as::<_, BackupEntity>("SELECT * FROM backups WHERE backup_id = $1")
            .bind(backup_id)
            .fetch_optional(&self.pool)
            .await;
        timer.record_result(&result);

        Ok(result?.map(Into::into))
    }

    async fn list(
        &self,
        query: &ListBackupsQuery,
        page: PageRequest,
    ) -> DomainResult<(Vec<BackupRecord>, i64)> {
        let status = query.status.map(BackupStatusDb::from);

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM backups WHERE ($1::backup_status IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        let timer = QueryTimer::new("list_backups");
        let result = sqlx::query_as::<_, BackupEntity>(
            r#"
            SELECT * FROM backups
            WHERE ($1::backup_status IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(status)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await;
        timer.record_result(&result);

        Ok((result?.into_iter().map(Into::into).collect(), total))
    }

    async fn mark_started(
        &self,
        backup_id: &str,
        started_at: DateTime<Utc>,
    ) -> DomainResult<Option<BackupRecord>> {
        let timer = QueryTimer::new("mark_backup_started");
        let result = sqlx::query_as::<_, BackupEntity>(
            r#"
            UPDATE backups
            SET status = 'in-progress', started_at = $2, updated_at = $2
            WHERE backup_id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(backup_id)
        .bind(started_at)
        .fetch_optional(&self.pool)
        .await;
        timer.record_result(&result);

        Ok(result?.map(Into::into))
    }

    async fn mark_completed(
        &self,
        backup_id: &str,
        completion: BackupCompletion,
    ) -> DomainResult<Option<BackupRecord>> {
        let timer = QueryTimer::new("mark_backup_completed");
        let result = sqlx::query_as::<_, BackupEntity>(
            r#"
            UPDATE backups
            SET status = 'completed',
                size = $2,
                path = $3,
                checksum = $4,
                completed_at = $5,
                duration_ms = $6,
                updated_at = $5
            WHERE backup_id = $1 AND status = 'in-progress'
            RETURNING *
            "#,
        )
        .bind(backup_id)
        .bind(completion.size)
        .bind(&completion.path)
        .bind(&completion.checksum)
        .bind(completion.completed_at)
        .bind(completion.duration_ms)
        .fetch_optional(&self.pool)
        .await;
        timer.record_result(&result);

        Ok(result?.map(Into::into))
    }

    async fn mark_failed(
        &self,
        backup_id: &str,
        error_message: &str,
        completed_at: DateTime<Utc>,
        duration_ms: Option<i64>,
    ) -> DomainResult<Option<BackupRecord>> {
        let timer = QueryTimer::new("mark_backup_failed");
        let result = sqlx::query_as::<_, BackupEntity>(
            r#"
            UPDATE backups
            SET status = 'failed',
                error_message = $2,
                completed_at = $3,
                duration_ms = $4,
                updated_at = $3
            WHERE backup_id = $1 AND status IN ('pending', 'in-progress')
            RETURNING *
            "#,
        )
        .bind(backup_id)
        .bind(error_message)
        .bind(completed_at)
        .bind(duration_ms)
        .fetch_optional(&self.pool)
        .await;
        timer.record_result(&result);

        Ok(result?.map(Into::into))
    }

    async fn mark_restored(
        &self,
        backup_id: &str,
        restored_by: Option<&str>,
        restored_at: DateTime<Utc>,
    ) -> DomainResult<Option<BackupRecord>> {
        let timer = QueryTimer::new("mark_backup_restored");
        let result = sqlx::query_as::<_, BackupEntity>(
            r#"
            UPDATE backups
            SET is_restored = TRUE, restored_by = $2, restored_at = $3, updated_at = $3
            WHERE backup_id = $1 AND status = 'completed'
            RETURNING *
            "#,
        )
        .bind(backup_id)
        .bind(restored_by)
        .bind(restored_at)
        .fetch_optional(&self.pool)
        .await;
        timer.record_result(&result);

        Ok(result?.map(Into::into))
    }

    async fn delete(&self, backup_id: &str) -> DomainResult<bool> {
        let timer = QueryTimer::new("delete_backup");
        let result = sqlx::query("DELETE FROM backups WHERE backup_id = $1")
            .bind(backup_id)
            .execute(&self.pool)
            .await;
        timer.record_result(&result);

        Ok(result?.rows_affected() > 0)
    }

    async fn find_expired(&self, now: DateTime<Utc>, limit: i64) -> DomainResult<Vec<BackupRecord>> {
        let timer = QueryTimer::new("find_expired_backups");
        let result = sqlx::query_as::<_, BackupEntity>(
            r#"
            SELECT * FROM backups
            WHERE status IN ('completed', 'failed') AND expires_at < $1
            ORDER BY expires_at ASC
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
    async fn find_stale(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> DomainResult<Vec<BackupRecord>> {
        let timer = QueryTimer::new("find_stale_backups");
        let result = sqlx::query_as::<_, BackupEntity>(
            r#"
            SELECT * FROM backups
            WHERE status IN ('pending', 'in-progress') AND updated_at < $1
            ORDER BY updated_at ASC
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await;
        timer.record_result(&result);

        Ok(result?.into_iter().map(Into::into).collect())
    }
}
