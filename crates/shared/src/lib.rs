//! Shared utilities and common types for the control plane backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Deterministic rollout bucketing (FNV-1a)
//! - Cryptographic utilities (checksums, signed download tokens)
//! - Identifier generation for deletion requests and backups
//! - User-agent classification for the login ledger
//! - Page-based pagination helpers
//! - Common validation logic

pub mod crypto;
pub mod ids;
pub mod pagination;
pub mod rollout;
pub mod user_agent;
pub mod validation;
