//! Backup record entity.

use chrono::{DateTime, Utc};
use domain::models::{BackupRecord, BackupStatus, BackupType};
use sqlx::FromRow;
use uuid::Uuid;

/// Database enum for backup type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "backup_type", rename_all = "lowercase")]
pub enum BackupTypeDb {
    Full,
    Incremental,
    Differential,
    Collections,
}

impl From<BackupTypeDb> for BackupType {
    fn from(db: BackupTypeDb) -> Self {
        match db {
            BackupTypeDb::Full => BackupType::Full,
            BackupTypeDb::Incremental => BackupType::Incremental,
            BackupTypeDb::Differential => BackupType::Differential,
            BackupTypeDb::Collections => BackupType::Collections,
        }
    }
}

impl From<BackupType> for BackupTypeDb {
    fn from(backup_type: BackupType) -> Self {
        match backup_type {
            BackupType::Full => BackupTypeDb::Full,
            BackupType::Incremental => BackupTypeDb::Incremental,
            BackupType::Differential => BackupTypeDb::Differential,
            BackupType::Collections => BackupTypeDb::Collections,
        }
    }
}

/// Database enum for backup status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "backup_status", rename_all = "kebab-case")]
pub enum BackupStatusDb {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl From<BackupStatusDb> for BackupStatus {
    fn from(db: BackupStatusDb) -> Self {
        match db {
            BackupStatusDb::Pending => BackupStatus::Pending,
            BackupStatusDb::InProgress => BackupStatus::InProgress,
            BackupStatusDb::Completed => BackupStatus::Completed,
            BackupStatusDb::Failed => BackupStatus::Failed,
        }
    }
}

impl From<BackupStatus> for BackupStatusDb {
    fn from(status: BackupStatus) -> Self {
        match status {
            BackupStatus::Pending => BackupStatusDb::Pending,
            BackupStatus::InProgress => BackupStatusDb::InProgress,
            BackupStatus::Completed => BackupStatusDb::Completed,
            BackupStatus::Failed => BackupStatusDb::Failed,
        }
    }
}

/// Database row mapping for the backups table.
#[derive(Debug, Clone, FromRow)]
pub struct BackupEntity {
    pub id: Uuid,
    /// User-facing identifier (backup-YYYYMMDD-HHMMSS-xxxx).
    pub backup_id: String,
    pub backup_type: BackupTypeDb,
    pub collections: Vec<String>,
    pub status: BackupStatusDb,
    pub description: Option<String>,
    pub size: Option<i64>,
    pub path: Option<String>,
    pub s3_key: Option<String>,
    pub checksum: Option<String>,
    pub encrypted: bool,
    pub error_message: Option<String>,
    pub created_by: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub is_restored: bool,
    pub restored_by: Option<String>,
    pub restored_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<BackupEntity> for BackupRecord {
    fn from(entity: BackupEntity) -> Self {
        Self {
            id: entity.id,
            backup_id: entity.backup_id,
            backup_type: entity.backup_type.into(),
            collections: entity.collections,
            status: entity.status.into(),
            description: entity.description,
            size: entity.size,
            path: entity.path,
            s3_key: entity.s3_key,
            checksum: entity.checksum,
            encrypted: entity.encrypted,
            error_message: entity.error_message,
            created_by: entity.created_by,
            started_at: entity.started_at,
            completed_at: entity.completed_at,
            duration_ms: entity.duration_ms,
            is_restored: entity.is_restored,
            restored_by: entity.restored_by,
            restored_at: entity.restored_at,
            expires_at: entity.expires_at,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}
