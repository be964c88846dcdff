//! Domain models for the administrative control plane.

pub mod audit;
pub mod backup;
pub mod data_deletion;
pub mod feature_flag;
pub mod login_attempt;

pub use audit::{ActorType, AuditAction, AuditEntry, AuditMetadata, MetadataValue};
pub use backup::{BackupRecord, BackupStatus, BackupType};
pub use data_deletion::{DataDeletionRequest, DeletionStatus, DeletionSummary, SubjectRef, SubjectType};
pub use feature_flag::{FeatureFlag, FlagEnvironment};
pub use login_attempt::{LoginAttempt, LoginStatus, RateLimitDecision};
