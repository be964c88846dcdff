//! Data deletion request domain models.
//!
//! A deletion request moves forward only:
//! `pending | under-review -> approved -> processing -> completed`, or
//! `pending | under-review -> rejected`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Minimum grace period between approval and execution.
pub const DELETION_GRACE_PERIOD_DAYS: i64 = 30;

/// Status of a data deletion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeletionStatus {
    Pending,
    UnderReview,
    Approved,
    Rejected,
    Processing,
    Completed,
}

impl DeletionStatus {
    /// Statuses from which `approve` and `reject` are legal.
    pub const REVIEWABLE: [DeletionStatus; 2] = [DeletionStatus::Pending, DeletionStatus::UnderReview];

    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeletionStatus::Rejected | DeletionStatus::Completed)
    }

    /// Whether `self -> next` is an allowed edge.
    pub fn can_transition_to(&self, next: DeletionStatus) -> bool {
        use DeletionStatus::*;
        matches!(
            (self, next),
            (Pending, UnderReview)
                | (Pending, Approved)
                | (UnderReview, Approved)
                | (Pending, Rejected)
                | (UnderReview, Rejected)
                | (Approved, Processing)
                | (Processing, Completed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionStatus::Pending => "pending",
            DeletionStatus::UnderReview => "under-review",
            DeletionStatus::Approved => "approved",
            DeletionStatus::Rejected => "rejected",
            DeletionStatus::Processing => "processing",
            DeletionStatus::Completed => "completed",
        }
    }
}

impl FromStr for DeletionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeletionStatus::Pending),
            "under-review" | "under_review" => Ok(DeletionStatus::UnderReview),
            "approved" => Ok(DeletionStatus::Approved),
            "rejected" => Ok(DeletionStatus::Rejected),
            "processing" => Ok(DeletionStatus::Processing),
            "completed" => Ok(DeletionStatus::Completed),
            _ => Err(format!("Unknown deletion status: {}", s)),
        }
    }
}

impl std::fmt::Display for DeletionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of subject whose data is erased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    Customer,
    Vendor,
    Rider,
}

impl FromStr for SubjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(SubjectType::Customer),
            "vendor" => Ok(SubjectType::Vendor),
            "rider" => Ok(SubjectType::Rider),
            _ => Err(format!("Unknown subject type: {}", s)),
        }
    }
}

impl std::fmt::Display for SubjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubjectType::Customer => write!(f, "customer"),
            SubjectType::Vendor => write!(f, "vendor"),
            SubjectType::Rider => write!(f, "rider"),
        }
    }
}

/// Reference to the data subject; a foreign key, never an embedded object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SubjectRef {
    pub subject_type: SubjectType,
    pub subject_id: String,
}

/// Counts recorded when a deletion executes, keyed by data type.
///
/// Documented keys: one entry per requested data type (e.g. `profile`,
/// `orders`, `addresses`, `payment_methods`, `reviews`, `login_history`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DeletionSummary {
    pub counts: BTreeMap<String, u64>,
    pub hard_delete: bool,
    /// True when the eraser only planned the deletion.
    pub dry_run: bool,
}

impl DeletionSummary {
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

/// A privacy erasure request and its workflow state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct DataDeletionRequest {
    pub id: Uuid,
    /// Unique human-readable number, e.g. `DDR-20261016-4K7QZ2`.
    pub request_number: String,
    pub subject: SubjectRef,
    pub status: DeletionStatus,
    pub reason: String,
    pub data_types: Vec<String>,
    pub hard_delete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    /// Earliest execution time; at least the grace period after approval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_deletion_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_summary: Option<DeletionSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Storage input for a new request.
#[derive(Debug, Clone)]
pub struct NewDeletionRequest {
    pub request_number: String,
    pub subject: SubjectRef,
    pub reason: String,
    pub data_types: Vec<String>,
    pub hard_delete: bool,
    pub requested_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields written by a guarded status transition.
///
/// `None` leaves the stored value unchanged.
#[derive(Debug, Clone, Default)]
pub struct DeletionTransition {
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub scheduled_deletion_date: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deletion_summary: Option<DeletionSummary>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Request to submit a deletion request.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct CreateDeletionRequestRequest {
    pub subject_type: SubjectType,
    #[validate(length(min = 1, max = 100, message = "Subject id must be 1-100 characters"))]
    pub subject_id: String,
    #[validate(length(min = 1, max = 2000, message = "Reason must be 1-2000 characters"))]
    pub reason: String,
    #[validate(length(min = 1, max = 20, message = "Select between 1 and 20 data types"))]
    pub data_types: Vec<String>,
    #[serde(default)]
    pub hard_delete: bool,
}

/// Request to reject a deletion request.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct RejectDeletionRequestRequest {
    #[validate(length(min = 1, max = 1000, message = "Rejection reason must be 1-1000 characters"))]
    pub reason: String,
}

/// Query parameters for listing deletion requests.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ListDeletionRequestsQuery {
    #[serde(default)]
    pub status: Option<DeletionStatus>,
    #[serde(default)]
    pub subject_id: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
}
