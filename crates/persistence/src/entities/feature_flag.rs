//! Feature flag entity.

use chrono::{DateTime, Utc};
use domain::models::{FeatureFlag, FlagEnvironment};
use sqlx::FromRow;
use uuid::Uuid;

/// Database enum for flag environments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "flag_environment", rename_all = "lowercase")]
pub enum FlagEnvironmentDb {
    Dev,
    Staging,
    Prod,
    All,
}

impl From<FlagEnvironmentDb> for FlagEnvironment {
    fn from(db: FlagEnvironmentDb) -> Self {
        match db {
            FlagEnvironmentDb::Dev => FlagEnvironment::Dev,
            FlagEnvironmentDb::Staging => FlagEnvironment::Staging,
            FlagEnvironmentDb::Prod => FlagEnvironment::Prod,
            FlagEnvironmentDb::All => FlagEnvironment::All,
        }
    }
}

impl From<FlagEnvironment> for FlagEnvironmentDb {
    fn from(env: FlagEnvironment) -> Self {
        match env {
            FlagEnvironment::Dev => FlagEnvironmentDb::Dev,
            FlagEnvironment::Staging => FlagEnvironmentDb::Staging,
            FlagEnvironment::Prod => FlagEnvironmentDb::Prod,
            FlagEnvironment::All => FlagEnvironmentDb::All,
        }
    }
}

/// Database row mapping for the feature_flags table.
#[derive(Debug, Clone, FromRow)]
pub struct FeatureFlagEntity {
    pub id: Uuid,
    pub key: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub environment: Option<FlagEnvironmentDb>,
    pub enabled_for_users: Vec<String>,
    pub enabled_for_roles: Vec<String>,
    /// Constrained to 0..=100 by the table.
    pub rollout_percentage: Option<i16>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<FeatureFlagEntity> for FeatureFlag {
    fn from(entity: FeatureFlagEntity) -> Self {
        Self {
            id: entity.id,
            key: entity.key,
            description: entity.description,
            enabled: entity.enabled,
            environment: entity.environment.map(Into::into),
            enabled_for_users: entity.enabled_for_users,
            enabled_for_roles: entity.enabled_for_roles,
            rollout_percentage: entity
                .rollout_percentage
                .map(|p| p.clamp(0, 100) as u8),
            start_date: entity.start_date,
            end_date: entity.end_date,
            created_by: entity.created_by,
            updated_by: entity.updated_by,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}
