//! Feature flag route handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use domain::models::feature_flag::{
    CreateFeatureFlagRequest, EvaluateFlagQuery, FlagEvaluationResponse, ListFeatureFlagsQuery,
    UpdateFeatureFlagRequest,
};

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::AdminIdentity;

/// Admin routes:
/// - GET/POST /api/admin/v1/feature-flags
/// - GET/PUT/DELETE /api/admin/v1/feature-flags/:key
/// - POST /api/admin/v1/feature-flags/:key/toggle
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_flags).post(create_flag))
        .route("/:key", get(get_flag).put(update_flag).delete(delete_flag))
        .route("/:key/toggle", post(toggle_flag))
}

/// Service routes:
/// - GET /api/v1/feature-flags/:key/evaluate?user_id&role
pub fn service_router() -> Router<AppState> {
    Router::new().route("/:key/evaluate", get(evaluate_flag))
}

async fn list_flags(
    State(state): State<AppState>,
    _admin: AdminIdentity,
    Query(query): Query<ListFeatureFlagsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let flags = state.feature_flags.list(&query).await?;
    Ok(Json(serde_json::json!({ "data": flags })))
}

async fn create_flag(
    State(state): State<AppState>,
    admin: AdminIdentity,
    Json(request): Json<CreateFeatureFlagRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let flag = state
        .feature_flags
        .create(request, Some(admin.as_str()))
        .await?;
    Ok((StatusCode::CREATED, Json(flag)))
}

async fn get_flag(
    State(state): State<AppState>,
    _admin: AdminIdentity,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.feature_flags.get(&key).await?))
}

async fn update_flag(
    State(state): State<AppState>,
    admin: AdminIdentity,
    Path(key): Path<String>,
    Json(request): Json<UpdateFeatureFlagRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let flag = state
        .feature_flags
        .update(&key, request, Some(admin.as_str()))
        .await?;
    Ok(Json(flag))
}

async fn toggle_flag(
    State(state): State<AppState>,
    admin: AdminIdentity,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let flag = state
        .feature_flags
        .toggle(&key, Some(admin.as_str()))
        .await?;
    Ok(Json(flag))
}

async fn delete_flag(
    State(state): State<AppState>,
    admin: AdminIdentity,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .feature_flags
        .delete(&key, Some(admin.as_str()))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Always 200: unknown flags and store failures evaluate to disabled.
async fn evaluate_flag(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<EvaluateFlagQuery>,
) -> Json<FlagEvaluationResponse> {
    let enabled = state
        .feature_flags
        .is_enabled(&key, query.user_id.as_deref(), query.role.as_deref())
        .await;
    Json(FlagEvaluationResponse { key, enabled })
}
