//! Admin identity resolved by the upstream identity layer.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::ApiError;

pub const ADMIN_ID_HEADER: &str = "x-admin-id";

/// Identifier of the administrator making the call, taken from `X-Admin-Id`.
///
/// Authentication happens upstream; a request without the header is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminIdentity(pub String);

impl AdminIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let admin_id = parts
            .headers
            .get(ADMIN_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty() && v.len() <= 255)
            .ok_or_else(|| ApiError::Unauthorized("Missing X-Admin-Id header".to_string()))?;

        Ok(AdminIdentity(admin_id.to_string()))
    }
}
