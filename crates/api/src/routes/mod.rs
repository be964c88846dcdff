//! HTTP route handlers.

use serde::Serialize;
use shared::pagination::Pagination;

pub mod backups;
pub mod data_deletion_requests;
pub mod feature_flags;
pub mod health;
pub mod login_attempts;

/// Paged list envelope.
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}
