//! Repository implementations backed by PostgreSQL.

pub mod backup;
pub mod data_deletion_request;
pub mod feature_flag;
pub mod login_attempt;

pub use backup::BackupRepository;
pub use data_deletion_request::DeletionRequestRepository;
pub use feature_flag::FeatureFlagRepository;
pub use login_attempt::LoginAttemptRepository;
