//! Domain layer for the delivery platform control plane.
//!
//! This crate contains:
//! - Domain models (FeatureFlag, LoginAttempt, DataDeletionRequest, BackupRecord)
//! - Store traits implemented by the persistence crate
//! - Business logic services
//! - Domain error types

pub mod error;
pub mod models;
pub mod services;

pub use error::{DomainError, DomainResult};
