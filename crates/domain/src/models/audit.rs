//! Audit entry domain models.
//!
//! Entries are handed to an external audit sink and never read back here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Actor types that can perform audited actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    /// Human administrator.
    Admin,
    /// Automated system process (background jobs).
    System,
}

impl std::fmt::Display for ActorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActorType::Admin => write!(f, "admin"),
            ActorType::System => write!(f, "system"),
        }
    }
}

/// Audited actions following the format: resource.operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    FeatureFlagCreate,
    FeatureFlagUpdate,
    FeatureFlagToggle,
    FeatureFlagDelete,
    DeletionRequestCreate,
    DeletionRequestReview,
    DeletionRequestApprove,
    DeletionRequestReject,
    DeletionRequestExecute,
    BackupCreate,
    BackupRestore,
    BackupDownload,
    BackupDelete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::FeatureFlagCreate => "feature_flag.create",
            AuditAction::FeatureFlagUpdate => "feature_flag.update",
            AuditAction::FeatureFlagToggle => "feature_flag.toggle",
            AuditAction::FeatureFlagDelete => "feature_flag.delete",
            AuditAction::DeletionRequestCreate => "deletion_request.create",
            AuditAction::DeletionRequestReview => "deletion_request.review",
            AuditAction::DeletionRequestApprove => "deletion_request.approve",
            AuditAction::DeletionRequestReject => "deletion_request.reject",
            AuditAction::DeletionRequestExecute => "deletion_request.execute",
            AuditAction::BackupCreate => "backup.create",
            AuditAction::BackupRestore => "backup.restore",
            AuditAction::BackupDownload => "backup.download",
            AuditAction::BackupDelete => "backup.delete",
        }
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "feature_flag.create" => Ok(AuditAction::FeatureFlagCreate),
            "feature_flag.update" => Ok(AuditAction::FeatureFlagUpdate),
            "feature_flag.toggle" => Ok(AuditAction::FeatureFlagToggle),
            "feature_flag.delete" => Ok(AuditAction::FeatureFlagDelete),
            "deletion_request.create" => Ok(AuditAction::DeletionRequestCreate),
            "deletion_request.review" => Ok(AuditAction::DeletionRequestReview),
            "deletion_request.approve" => Ok(AuditAction::DeletionRequestApprove),
            "deletion_request.reject" => Ok(AuditAction::DeletionRequestReject),
            "deletion_request.execute" => Ok(AuditAction::DeletionRequestExecute),
            "backup.create" => Ok(AuditAction::BackupCreate),
            "backup.restore" => Ok(AuditAction::BackupRestore),
            "backup.download" => Ok(AuditAction::BackupDownload),
            "backup.delete" => Ok(AuditAction::BackupDelete),
            _ => Err(format!("Unknown audit action: {}", s)),
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A primitive metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Int(v)
    }
}

impl From<u64> for MetadataValue {
    fn from(v: u64) -> Self {
        MetadataValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Float(v)
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::Text(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::Text(v.to_string())
    }
}

/// Open string-keyed map of primitives.
///
/// Keys used per action:
/// - `feature_flag.*`: `enabled`, `rollout_percentage`, `environment`
/// - `deletion_request.*`: `status`, `scheduled_deletion_date`, `items_deleted`, `reason`
/// - `backup.*`: `status`, `collections`, `expires_at`
pub type AuditMetadata = BTreeMap<String, MetadataValue>;

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub actor_type: ActorType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    pub action: AuditAction,
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: AuditMetadata,
}
