//! Login attempt ledger entity.

use chrono::{DateTime, Utc};
use domain::models::{LoginAttempt, LoginStatus};
use sqlx::FromRow;
use uuid::Uuid;

/// Database enum for login outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "login_status", rename_all = "lowercase")]
pub enum LoginStatusDb {
    Success,
    Failure,
}

impl From<LoginStatusDb> for LoginStatus {
    fn from(db: LoginStatusDb) -> Self {
        match db {
            LoginStatusDb::Success => LoginStatus::Success,
            LoginStatusDb::Failure => LoginStatus::Failure,
        }
    }
}

impl From<LoginStatus> for LoginStatusDb {
    fn from(status: LoginStatus) -> Self {
        match status {
            LoginStatus::Success => LoginStatusDb::Success,
            LoginStatus::Failure => LoginStatusDb::Failure,
        }
    }
}

/// Database row mapping for the login_attempts table.
#[derive(Debug, Clone, FromRow)]
pub struct LoginAttemptEntity {
    pub id: Uuid,
    pub identifier: String,
    pub user_id: Option<String>,
    pub ip_address: String,
    pub user_agent: String,
    pub status: LoginStatusDb,
    pub failure_reason: Option<String>,
    pub device: String,
    pub browser: String,
    pub is_suspicious: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<LoginAttemptEntity> for LoginAttempt {
    fn from(entity: LoginAttemptEntity) -> Self {
        Self {
            id: entity.id,
            identifier: entity.identifier,
            user_id: entity.user_id,
            ip_address: entity.ip_address,
            user_agent: entity.user_agent,
            status: entity.status.into(),
            failure_reason: entity.failure_reason,
            device: entity.device,
            browser: entity.browser,
            is_suspicious: entity.is_suspicious,
            created_at: entity.created_at,
            expires_at: entity.expires_at,
        }
    }
}

/// Row of the failed-attempts aggregation.
#[derive(Debug, Clone, FromRow)]
pub struct FailedAttemptAggregateEntity {
    pub identifier: String,
    pub count: i64,
    pub ip_addresses: Vec<String>,
    pub last_attempt_at: DateTime<Utc>,
}

/// Row of the stats aggregation.
#[derive(Debug, Clone, FromRow)]
pub struct LoginAttemptStatsEntity {
    pub total: i64,
    pub successful: i64,
    pub failed: i64,
    pub suspicious: i64,
    pub unique_identifiers: i64,
    pub unique_ips: i64,
}
