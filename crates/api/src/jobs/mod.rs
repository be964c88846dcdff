//! Background job scheduler and job implementations.

mod backup_cleanup;
mod deletion_execution;
mod login_attempt_retention;
mod pool_metrics;
mod rate_limiter_sweep;
mod scheduler;

pub use backup_cleanup::BackupCleanupJob;
pub use deletion_execution::DeletionExecutionJob;
pub use login_attempt_retention::LoginAttemptRetentionJob;
pub use pool_metrics::PoolMetricsJob;
pub use rate_limiter_sweep::RateLimiterSweepJob;
pub use scheduler::{run_once, Job, JobFrequency, JobScheduler};
