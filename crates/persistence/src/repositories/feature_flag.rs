//! Feature flag repository.

use chrono::{DateTime, Utc};
use domain::models::feature_flag::{ListFeatureFlagsQuery, NewFeatureFlag};
use domain::models::FeatureFlag;
use domain::services::FeatureFlagStore;
use domain::DomainResult;
use sqlx::PgPool;

use crate::entities::{FeatureFlagEntity, FlagEnvironmentDb};
use crate::metrics::QueryTimer;

/// Repository for the feature_flags table.
#[derive(Clone)]
pub struct FeatureFlagRepository {
    pool: PgPool,
}

impl FeatureFlagRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl FeatureFlagStore for FeatureFlagRepository {
    async fn find_by_key(&self, key: &str) -> DomainResult<Option<FeatureFlag>> {
        let timer = QueryTimer::new("find_feature_flag_by_key");
        let result = sqlx::query_as::<_, FeatureFlagEntity>(
            r#"
            SELECT * FROM feature_flags WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await;
        timer.record_result(&result);

        Ok(result?.map(Into::into))
    }

    async fn list(&self, query: &ListFeatureFlagsQuery) -> DomainResult<Vec<FeatureFlag>> {
        let mut conditions: Vec<String> = Vec::new();
        let mut param_count = 0;

        if query.environment.is_some() {
            param_count += 1;
            conditions.push(format!("environment = ${}", param_count));
        }
        if query.enabled.is_some() {
            param_count += 1;
            conditions.push(format!("enabled = ${}", param_count));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let sql = format!(
            "SELECT * FROM feature_flags {} ORDER BY key ASC",
            where_clause
        );

        let mut list_query = sqlx::query_as::<_, FeatureFlagEntity>(&sql);
        if let Some(environment) = query.environment {
            list_query = list_query.bind(FlagEnvironmentDb::from(environment));
        }
        if let Some(enabled) = query.enabled {
            list_query = list_query.bind(enabled);
        }

        let timer = QueryTimer::new("list_feature_flags");
        let result = list_query.fetch_all(&self.pool).await;
        timer.record_result(&result);

        Ok(result?.into_iter().map(Into::into).collect())
    }

    async fn insert(&self, flag: NewFeatureFlag) -> DomainResult<FeatureFlag> {
        let timer = QueryTimer::new("insert_feature_flag");
        let result = sqlx::query_as::<_, FeatureFlagEntity>(
            r#"
            INSERT INTO feature_flags (
                key, description, enabled, environment, enabled_for_users,
                enabled_for_roles, rollout_percentage, start_date, end_date,
                created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            RETURNING *
            "#,
        )
        .bind(&flag.key)
        .bind(&flag.description)
        .bind(flag.enabled)
        .bind(flag.environment.map(FlagEnvironmentDb::from))
        .bind(&flag.enabled_for_users)
        .bind(&flag.enabled_for_roles)
        .bind(flag.rollout_percentage.map(i16::from))
        .bind(flag.start_date)
        .bind(flag.end_date)
        .bind(&flag.created_by)
        .bind(flag.created_at)
        .fetch_one(&self.pool)
        .await;
        timer.record_result(&result);

        Ok(result?.into())
    }

    async fn update(
        &self,
        flag: &FeatureFlag,
        expected_updated_at: DateTime<Utc>,
    ) -> DomainResult<Option<FeatureFlag>> {
        let timer = QueryTimer::new("update_feature_flag");
        let result = sqlx::query_as::<_, FeatureFlagEntity>(
            r#"
            UPDATE feature_flags
            SET description = $2,
                enabled = $3,
                environment = $4,
                enabled_for_users = $5,
                enabled_for_roles = $6,
                rollout_percentage = $7,
                start_date = $8,
                end_date = $9,
                updated_by = $10,
                updated_at = $11
            WHERE key = $1 AND updated_at = $12
            RETURNING *
            "#,
        )
        .bind(&flag.key)
        .bind(&flag.description)
        .bind(flag.enabled)
        .bind(flag.environment.map(FlagEnvironmentDb::from))
        .bind(&flag.enabled_for_users)
        .bind(&flag.enabled_for_roles)
        .bind(flag.rollout_percentage.map(i16::from))
        .bind(flag.start_date)
        .bind(flag.end_date)
        .bind(&flag.updated_by)
        .bind(flag.updated_at)
        .bind(expected_updated_at)
        .fetch_optional(&self.pool)
        .await;
        timer.record_result(&result);

        Ok(result?.map(Into::into))
    }

    async fn delete(&self, key: &str) -> DomainResult<bool> {
        let timer = QueryTimer::new("delete_feature_flag");
        let result = sqlx::query("DELETE FROM feature_flags WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await;
        timer.record_result(&result);

        Ok(result?.rows_affected() > 0)
    }
}
