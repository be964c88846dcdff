//! Login attempt ledger repository.

use chrono::{DateTime, Utc};
use domain::models::login_attempt::{
    FailedAttemptSummary, LoginAttemptFilter, LoginAttemptStats, NewLoginAttempt,
};
use domain::models::LoginAttempt;
use domain::services::{FailureWindow, LoginAttemptStore};
use domain::DomainResult;
use shared::pagination::PageRequest;
use sqlx::PgPool;

use crate::entities::{
    FailedAttemptAggregateEntity, LoginAttemptEntity, LoginAttemptStatsEntity, LoginStatusDb,
};
use crate::metrics::QueryTimer;

/// Repository for the login_attempts table.
#[derive(Clone)]
pub struct LoginAttemptRepository {
    pool: PgPool,
}

impl LoginAttemptRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Builds the WHERE clause for a ledger filter, numbering params from `$1`.
fn filter_clause(filter: &LoginAttemptFilter) -> (String, usize) {
    let mut conditions: Vec<String> = vec!["TRUE".to_string()];
    let mut param_count = 0;

    if filter.identifier.is_some() {
        param_count += 1;
        conditions.push(format!("identifier = ${}", param_count));
    }
    if filter.ip_address.is_some() {
        param_count += 1;
        conditions.push(format!("ip_address = ${}", param_count));
    }
    if filter.status.is_some() {
        param_count += 1;
        conditions.push(format!("status = ${}", param_count));
    }
    if filter.suspicious.is_some() {
        param_count += 1;
        conditions.push(format!("is_suspicious = ${}", param_count));
    }
    if filter.from.is_some() {
        param_count += 1;
        conditions.push(format!("created_at >= ${}", param_count));
    }
    if filter.to.is_some() {
        param_count += 1;
        conditions.push(format!("created_at <= ${}", param_count));
    }

    (conditions.join(" AND "), param_count)
}

macro_rules! bind_filter {
    ($query:expr, $filter:expr) => {{
        let mut query = $query;
        if let Some(ref identifier) = $filter.identifier {
            query = query.bind(identifier.clone());
        }
        if let Some(ref ip_address) = $filter.ip_address {
            query = query.bind(ip_address.clone());
        }
        if let Some(status) = $filter.status {
            query = query.bind(LoginStatusDb::from(status));
        }
        if let Some(suspicious) = $filter.suspicious {
            query = query.bind(suspicious);
        }
        if let Some(from) = $filter.from {
            query = query.bind(from);
        }
        if let Some(to) = $filter.to {
            query = query.bind(to);
        }
        query
    }};
}

#[async_trait::async_trait]
impl LoginAttemptStore for LoginAttemptRepository {
    async fn insert(&self, attempt: NewLoginAttempt) -> DomainResult<LoginAttempt> {
        let timer = QueryTimer::new("insert_login_attempt");
        let result = sqlx::query_as::<_, LoginAttemptEntity>(
            r#"
            INSERT INTO login_attempts (
                identifier, user_id, ip_address, user_agent, status, failure_reason,
                device, browser, is_suspicious, created_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(&attempt.identifier)
        .bind(&attempt.user_id)
        .bind(&attempt.ip_address)
        .bind(&attempt.user_agent)
        .bind(LoginStatusDb::from(attempt.status))
        .bind(&attempt.failure_reason)
        .bind(&attempt.device)
        .bind(&attempt.browser)
        .bind(attempt.is_suspicious)
        .bind(attempt.created_at)
        .bind(attempt.expires_at)
        .fetch_one(&self.pool)
        .await;
        timer.record_result(&result);

        Ok(result?.into())
    }

    async fn count_failures_for_identifier(
        &self,
        identifier: &str,
        since: DateTime<Utc>,
    ) -> DomainResult<u64> {
        let timer = QueryTimer::new("count_login_failures");
        let result = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM login_attempts
            WHERE identifier = $1 AND status = 'failure' AND created_at >= $2
            "#,
        )
        .bind(identifier)
        .bind(since)
        .fetch_one(&self.pool)
        .await;
        timer.record_result(&result);

        Ok(result?.max(0) as u64)
    }

    async fn distinct_ips_for_identifier(
        &self,
        identifier: &str,
        since: DateTime<Utc>,
    ) -> DomainResult<Vec<String>> {
        let timer = QueryTimer::new("distinct_login_ips");
        let result = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT ip_address FROM login_attempts
            WHERE identifier = $1 AND created_at >= $2
            "#,
        )
        .bind(identifier)
        .bind(since)
        .fetch_all(&self.pool)
        .await;
        timer.record_result(&result);

        Ok(result?)
    }

    async fn failure_window(
        &self,
        identifier: &str,
        ip: Option<&str>,
        since: DateTime<Utc>,
    ) -> DomainResult<FailureWindow> {
        let timer = QueryTimer::new("login_failure_window");
        let result = sqlx::query_as::<_, (i64, Option<DateTime<Utc>>)>(
            r#"
            SELECT COUNT(*), MIN(created_at) FROM login_attempts
            WHERE status = 'failure'
              AND created_at >= $3
              AND (identifier = $1 OR ($2::TEXT IS NOT NULL AND ip_address = $2))
            "#,
        )
        .bind(identifier)
        .bind(ip)
        .bind(since)
        .fetch_one(&self.pool)
        .await;
        timer.record_result(&result);

        let (count, oldest) = result?;
        Ok(FailureWindow {
            count: count.max(0) as u64,
            oldest,
        })
    }

    async fn failed_attempts_by_identifier(
        &self,
        since: DateTime<Utc>,
        threshold: u32,
    ) -> DomainResult<Vec<FailedAttemptSummary>> {
        let timer = QueryTimer::new("failed_attempts_by_identifier");
        let result = sqlx::query_as::<_, FailedAttemptAggregateEntity>(
            r#"
            SELECT
                identifier,
                COUNT(*) AS count,
                ARRAY_AGG(DISTINCT ip_address) AS ip_addresses,
                MAX(created_at) AS last_attempt_at
            FROM login_attempts
            WHERE status = 'failure' AND created_at >= $1
            GROUP BY identifier
            HAVING COUNT(*) >= $2
            ORDER BY count DESC, identifier ASC
            "#,
        )
        .bind(since)
        .bind(i64::from(threshold))
        .fetch_all(&self.pool)
        .await;
        timer.record_result(&result);

        Ok(result?
            .into_iter()
            .map(|row| FailedAttemptSummary {
                identifier: row.identifier,
                count: u32::try_from(row.count).unwrap_or(u32::MAX),
                ip_addresses: row.ip_addresses,
                last_attempt_at: row.last_attempt_at,
            })
            .collect())
    }

    async fn list(
        &self,
        filter: &LoginAttemptFilter,
        page: PageRequest,
    ) -> DomainResult<(Vec<LoginAttempt>, i64)> {
        let (where_clause, param_count) = filter_clause(filter);

        let count_sql = format!("SELECT COUNT(*) FROM login_attempts WHERE {}", where_clause);
        let count_query = bind_filter!(sqlx::query_scalar::<_, i64>(&count_sql), filter);
        let total = count_query.fetch_one(&self.pool).await?;

        let list_sql = format!(
            "SELECT * FROM login_attempts WHERE {} ORDER BY created_at DESC LIMIT ${} OFFSET ${}",
            where_clause,
            param_count + 1,
            param_count + 2
        );
        let list_query = bind_filter!(sqlx::query_as::<_, LoginAttemptEntity>(&list_sql), filter)
            .bind(page.limit())
            .bind(page.offset());

        let timer = QueryTimer::new("list_login_attempts");
        let result = list_query.fetch_all(&self.pool).await;
        timer.record_result(&result);

        Ok((result?.into_iter().map(Into::into).collect(), total))
    }

    async fn stats(&self, since: DateTime<Utc>) -> DomainResult<LoginAttemptStats> {
        let timer = QueryTimer::new("login_attempt_stats");
        let result = sqlx::query_as::<_, LoginAttemptStatsEntity>(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'success') AS successful,
                COUNT(*) FILTER (WHERE status = 'failure') AS failed,
                COUNT(*) FILTER (WHERE is_suspicious) AS suspicious,
                COUNT(DISTINCT identifier) AS unique_identifiers,
                COUNT(DISTINCT ip_address) AS unique_ips
            FROM login_attempts
            WHERE created_at >= $1
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await;
        timer.record_result(&result);

        let row = result?;
        Ok(LoginAttemptStats {
            total: row.total,
            successful: row.successful,
            failed: row.failed,
            suspicious: row.suspicious,
            unique_identifiers: row.unique_identifiers,
            unique_ips: row.unique_ips,
        })
    }

    async fn delete_expired(&self, now: DateTime<Utc>, limit: i64) -> DomainResult<u64> {
        let timer = QueryTimer::new("delete_expired_login_attempts");
        let result = sqlx::query(
            r#"
            DELETE FROM login_attempts
            WHERE id IN (
                SELECT id FROM login_attempts
                WHERE expires_at < $1
                LIMIT $2
            )
            "#,
        )
        .bind(now)
        .bind(limit)
        .execute(&self.pool)
        .await;
        timer.record_result(&result);

        Ok(result?.rows_affected())
    }
}
