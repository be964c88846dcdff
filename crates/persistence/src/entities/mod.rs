//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod backup;
pub mod data_deletion_request;
pub mod feature_flag;
pub mod login_attempt;

pub use backup::{BackupEntity, BackupStatusDb, BackupTypeDb};
pub use data_deletion_request::{DataDeletionRequestEntity, DeletionStatusDb, SubjectTypeDb};
pub use feature_flag::{FeatureFlagEntity, FlagEnvironmentDb};
pub use login_attempt::{
    FailedAttemptAggregateEntity, LoginAttemptEntity, LoginAttemptStatsEntity, LoginStatusDb,
};
