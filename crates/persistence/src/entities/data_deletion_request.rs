//! Data deletion request entity.

use chrono::{DateTime, Utc};
use domain::models::{DataDeletionRequest, DeletionStatus, DeletionSummary, SubjectRef, SubjectType};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Database enum for deletion request status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "deletion_status", rename_all = "kebab-case")]
pub enum DeletionStatusDb {
    Pending,
    UnderReview,
    Approved,
    Rejected,
    Processing,
    Completed,
}

impl From<DeletionStatusDb> for DeletionStatus {
    fn from(db: DeletionStatusDb) -> Self {
        match db {
            DeletionStatusDb::Pending => DeletionStatus::Pending,
            DeletionStatusDb::UnderReview => DeletionStatus::UnderReview,
            DeletionStatusDb::Approved => DeletionStatus::Approved,
            DeletionStatusDb::Rejected => DeletionStatus::Rejected,
            DeletionStatusDb::Processing => DeletionStatus::Processing,
            DeletionStatusDb::Completed => DeletionStatus::Completed,
        }
    }
}

impl From<DeletionStatus> for DeletionStatusDb {
    fn from(status: DeletionStatus) -> Self {
        match status {
            DeletionStatus::Pending => DeletionStatusDb::Pending,
            DeletionStatus::UnderReview => DeletionStatusDb::UnderReview,
            DeletionStatus::Approved => DeletionStatusDb::Approved,
            DeletionStatus::Rejected => DeletionStatusDb::Rejected,
            DeletionStatus::Processing => DeletionStatusDb::Processing,
            DeletionStatus::Completed => DeletionStatusDb::Completed,
        }
    }
}

/// Database enum for subject types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "subject_type", rename_all = "snake_case")]
pub enum SubjectTypeDb {
    Customer,
    Vendor,
    Rider,
}

impl From<SubjectTypeDb> for SubjectType {
    fn from(db: SubjectTypeDb) -> Self {
        match db {
            SubjectTypeDb::Customer => SubjectType::Customer,
            SubjectTypeDb::Vendor => SubjectType::Vendor,
            SubjectTypeDb::Rider => SubjectType::Rider,
        }
    }
}

impl From<SubjectType> for SubjectTypeDb {
    fn from(subject_type: SubjectType) -> Self {
        match subject_type {
            SubjectType::Customer => SubjectTypeDb::Customer,
            SubjectType::Vendor => SubjectTypeDb::Vendor,
            SubjectType::Rider => SubjectTypeDb::Rider,
        }
    }
}

/// Database row mapping for the data_deletion_requests table.
#[derive(Debug, Clone, FromRow)]
pub struct DataDeletionRequestEntity {
    pub id: Uuid,
    pub request_number: String,
    pub subject_type: SubjectTypeDb,
    pub subject_id: String,
    pub status: DeletionStatusDb,
    pub reason: String,
    pub data_types: Vec<String>,
    pub hard_delete: bool,
    pub requested_by: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub scheduled_deletion_date: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deletion_summary: Option<Json<DeletionSummary>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DataDeletionRequestEntity> for DataDeletionRequest {
    fn from(entity: DataDeletionRequestEntity) -> Self {
        Self {
            id: entity.id,
            request_number: entity.request_number,
            subject: SubjectRef {
                subject_type: entity.subject_type.into(),
                subject_id: entity.subject_id,
            },
            status: entity.status.into(),
            reason: entity.reason,
            data_types: entity.data_types,
            hard_delete: entity.hard_delete,
            requested_by: entity.requested_by,
            reviewed_by: entity.reviewed_by,
            reviewed_at: entity.reviewed_at,
            rejection_reason: entity.rejection_reason,
            approved_by: entity.approved_by,
            approved_at: entity.approved_at,
            scheduled_deletion_date: entity.scheduled_deletion_date,
            deleted_by: entity.deleted_by,
            deleted_at: entity.deleted_at,
            deletion_summary: entity.deletion_summary.map(|Json(summary)| summary),
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            DeletionStatus::Pending,
            DeletionStatus::UnderReview,
            DeletionStatus::Approved,
            DeletionStatus::Rejected,
            DeletionStatus::Processing,
            DeletionStatus::Completed,
        ] {
            let db: DeletionStatusDb = status.into();
            assert_eq!(DeletionStatus::from(db), status);
        }
    }

    #[test]
    fn test_entity_to_domain() {
        let now = Utc::now();
        let mut summary = DeletionSummary::default();
        summary.counts.insert("orders".to_string(), 4);

        let entity = DataDeletionRequestEntity {
            id: Uuid::new_v4(),
            request_number: "DDR-20261016-ABC123".to_string(),
            subject_type: SubjectTypeDb::Vendor,
            subject_id: "ven_42".to_string(),
            status: DeletionStatusDb::Completed,
            reason: "Closed store".to_string(),
            data_types: vec!["orders".to_string()],
            hard_delete: true,
            requested_by: None,
            reviewed_by: None,
            reviewed_at: None,
            rejection_reason: None,
            approved_by: Some("admin-1".to_string()),
            approved_at: Some(now),
            scheduled_deletion_date: Some(now + chrono::Duration::days(30)),
            deleted_by: None,
            deleted_at: Some(now + chrono::Duration::days(30)),
            deletion_summary: Some(Json(summary)),
            created_at: now,
            updated_at: now,
        };

        let request: DataDeletionRequest = entity.into();
        assert_eq!(request.subject.subject_type, SubjectType::Vendor);
        assert_eq!(request.status, DeletionStatus::Completed);
        assert_eq!(request.deletion_summary.unwrap().total(), 4);
    }
}
