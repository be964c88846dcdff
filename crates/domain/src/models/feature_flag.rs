//! Feature flag domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Deployment environment a flag is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagEnvironment {
    Dev,
    Staging,
    Prod,
    /// Matches every runtime environment.
    All,
}

impl FlagEnvironment {
    /// Whether a flag scoped to `self` applies in the `runtime` environment.
    pub fn applies_to(&self, runtime: FlagEnvironment) -> bool {
        *self == FlagEnvironment::All || *self == runtime
    }
}

impl FromStr for FlagEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(FlagEnvironment::Dev),
            "staging" => Ok(FlagEnvironment::Staging),
            "prod" | "production" => Ok(FlagEnvironment::Prod),
            "all" => Ok(FlagEnvironment::All),
            _ => Err(format!("Unknown environment: {}", s)),
        }
    }
}

impl std::fmt::Display for FlagEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlagEnvironment::Dev => write!(f, "dev"),
            FlagEnvironment::Staging => write!(f, "staging"),
            FlagEnvironment::Prod => write!(f, "prod"),
            FlagEnvironment::All => write!(f, "all"),
        }
    }
}

/// A named feature flag with its targeting rules.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FeatureFlag {
    pub id: Uuid,
    /// Globally unique key.
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<FlagEnvironment>,
    /// Explicit user allowlist; authoritative when non-empty.
    pub enabled_for_users: Vec<String>,
    /// Explicit role allowlist; consulted when the user list is empty.
    pub enabled_for_roles: Vec<String>,
    /// Percentage of identified users (0..=100).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollout_percentage: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeatureFlag {
    /// Whether `now` lies inside the optional `[start_date, end_date]` window.
    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        if let Some(start) = self.start_date {
            if now < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if now > end {
                return false;
            }
        }
        true
    }
}

/// Storage input for inserting a new flag.
#[derive(Debug, Clone)]
pub struct NewFeatureFlag {
    pub key: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub environment: Option<FlagEnvironment>,
    pub enabled_for_users: Vec<String>,
    pub enabled_for_roles: Vec<String>,
    pub rollout_percentage: Option<u8>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request to create a feature flag.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct CreateFeatureFlagRequest {
    #[validate(length(min = 1, max = 100, message = "Key must be 1-100 characters"))]
    pub key: String,
    #[validate(length(max = 500, message = "Description too long"))]
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub environment: Option<FlagEnvironment>,
    #[serde(default)]
    pub enabled_for_users: Vec<String>,
    #[serde(default)]
    pub enabled_for_roles: Vec<String>,
    #[validate(range(min = 0, max = 100, message = "Rollout percentage must be between 0 and 100"))]
    #[serde(default)]
    pub rollout_percentage: Option<i32>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

/// Partial update of a feature flag. Absent fields are left unchanged.
///
/// The nullable settings take `Some(None)` for an explicit JSON `null`, which
/// clears the stored value.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct UpdateFeatureFlagRequest {
    #[validate(length(max = 500, message = "Description too long"))]
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub environment: Option<Option<FlagEnvironment>>,
    #[serde(default)]
    pub enabled_for_users: Option<Vec<String>>,
    #[serde(default)]
    pub enabled_for_roles: Option<Vec<String>>,
    /// Range checked by the service.
    #[serde(default, deserialize_with = "nullable")]
    pub rollout_percentage: Option<Option<i32>>,
    #[serde(default, deserialize_with = "nullable")]
    pub start_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    pub end_date: Option<Option<DateTime<Utc>>>,
}

/// Present fields become `Some`, so `null` maps to `Some(None)` and an absent
/// field keeps the `None` from `#[serde(default)]`.
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Query parameters for listing feature flags.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ListFeatureFlagsQuery {
    #[serde(default)]
    pub environment: Option<FlagEnvironment>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// Query parameters for evaluating a flag.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EvaluateFlagQuery {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Evaluation result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FlagEvaluationResponse {
    pub key: String,
    pub enabled: bool,
}
