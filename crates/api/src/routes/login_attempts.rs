//! Login ledger route handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use axum_extra::{headers::UserAgent, TypedHeader};
use domain::models::login_attempt::{
    CheckRateLimitRequest, FailedAttemptsQuery, LogLoginAttemptRequest, LoginAttemptFilter,
    LoginStatsQuery,
};
use domain::services::LoginAttemptPage;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::{AdminIdentity, ClientIp};
use crate::routes::ListResponse;

/// Admin routes:
/// - GET /api/admin/v1/login-attempts
/// - GET /api/admin/v1/login-attempts/stats
/// - GET /api/admin/v1/login-attempts/failed-passwords
/// - GET /api/admin/v1/login-attempts/suspicious
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_attempts))
        .route("/stats", get(attempt_stats))
        .route("/failed-passwords", get(failed_passwords))
        .route("/suspicious", get(suspicious_attempts))
}

/// Service routes:
/// - POST /api/v1/login-attempts
/// - POST /api/v1/login-attempts/rate-limit
pub fn service_router() -> Router<AppState> {
    Router::new()
        .route("/", post(log_attempt))
        .route("/rate-limit", post(check_rate_limit))
}

impl From<LoginAttemptPage> for ListResponse<domain::models::LoginAttempt> {
    fn from(page: LoginAttemptPage) -> Self {
        Self {
            data: page.data,
            pagination: page.pagination,
        }
    }
}

/// Body fields win; otherwise the forwarded address and `User-Agent` header are used.
async fn log_attempt(
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    user_agent: Option<TypedHeader<UserAgent>>,
    Json(mut request): Json<LogLoginAttemptRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.ip_address.as_deref().map_or(true, str::is_empty) {
        request.ip_address = client_ip;
    }
    if request.user_agent.is_none() {
        request.user_agent = user_agent.map(|TypedHeader(ua)| ua.as_str().to_string());
    }

    let attempt = state.login_security.log_attempt(request).await?;
    Ok((StatusCode::CREATED, Json(attempt)))
}

async fn check_rate_limit(
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    Json(mut request): Json<CheckRateLimitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.ip_address.is_none() {
        request.ip_address = client_ip;
    }
    let decision = state.login_security.check_rate_limit(&request).await?;
    Ok(Json(decision))
}

async fn list_attempts(
    State(state): State<AppState>,
    _admin: AdminIdentity,
    Query(filter): Query<LoginAttemptFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state.login_security.list(&filter).await?;
    Ok(Json(ListResponse::from(page)))
}

async fn suspicious_attempts(
    State(state): State<AppState>,
    _admin: AdminIdentity,
    Query(filter): Query<LoginAttemptFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state.login_security.suspicious(&filter).await?;
    Ok(Json(ListResponse::from(page)))
}

async fn attempt_stats(
    State(state): State<AppState>,
    _admin: AdminIdentity,
    Query(query): Query<LoginStatsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.login_security.stats(query.window_hours).await?))
}

async fn failed_passwords(
    State(state): State<AppState>,
    _admin: AdminIdentity,
    Query(query): Query<FailedAttemptsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let summaries = state
        .login_security
        .get_failed_password_attempts(&query)
        .await?;
    Ok(Json(serde_json::json!({ "data": summaries })))
}
