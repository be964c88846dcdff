//! Domain services for the control plane.
//!
//! Each service owns its entity exclusively and talks to storage through a
//! store trait; none of them calls another.

pub mod audit;
pub mod backup;
pub mod clock;
pub mod data_deletion;
pub mod feature_flags;
pub mod login_security;
pub mod memory;
pub mod process_runner;

pub use audit::{AuditEntryBuilder, AuditSink, TracingAuditSink};
pub use backup::{BackupOrchestrator, BackupPage, BackupSettings, BackupStore};
pub use clock::{Clock, SystemClock};
pub use data_deletion::{
    DataDeletionService, DataEraser, DeletionRequestPage, DeletionRequestStore, DryRunEraser,
    ExecutionReport,
};
pub use feature_flags::{FeatureFlagService, FeatureFlagStore};
pub use login_security::{
    FailureWindow, LoginAttemptPage, LoginAttemptStore, LoginSecurityService,
    LoginSecuritySettings,
};
pub use process_runner::{ProcessOutput, ProcessRunner, TokioProcessRunner};
