//! Data deletion request route handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use domain::models::data_deletion::{
    CreateDeletionRequestRequest, ListDeletionRequestsQuery, RejectDeletionRequestRequest,
};
use domain::models::DataDeletionRequest;
use domain::services::DeletionRequestPage;
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::AdminIdentity;
use crate::routes::ListResponse;

/// Routes:
/// - GET/POST /api/admin/v1/data-deletion-requests
/// - GET /api/admin/v1/data-deletion-requests/:id
/// - POST /api/admin/v1/data-deletion-requests/:id/{review,approve,reject,execute}
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_requests).post(create_request))
        .route("/:id", get(get_request))
        .route("/:id/review", post(review_request))
        .route("/:id/approve", post(approve_request))
        .route("/:id/reject", post(reject_request))
        .route("/:id/execute", post(execute_request))
}

impl From<DeletionRequestPage> for ListResponse<DataDeletionRequest> {
    fn from(page: DeletionRequestPage) -> Self {
        Self {
            data: page.data,
            pagination: page.pagination,
        }
    }
}

async fn list_requests(
    State(state): State<AppState>,
    _admin: AdminIdentity,
    Query(query): Query<ListDeletionRequestsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state.data_deletion.list(&query).await?;
    Ok(Json(ListResponse::from(page)))
}

async fn create_request(
    State(state): State<AppState>,
    admin: AdminIdentity,
    Json(request): Json<CreateDeletionRequestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state
        .data_deletion
        .create(request, Some(admin.as_str()))
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_request(
    State(state): State<AppState>,
    _admin: AdminIdentity,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.data_deletion.get(id).await?))
}

async fn review_request(
    State(state): State<AppState>,
    admin: AdminIdentity,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state
        .data_deletion
        .start_review(id, Some(admin.as_str()))
        .await?;
    Ok(Json(updated))
}

async fn approve_request(
    State(state): State<AppState>,
    admin: AdminIdentity,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state
        .data_deletion
        .approve(id, Some(admin.as_str()))
        .await?;
    Ok(Json(updated))
}

async fn reject_request(
    State(state): State<AppState>,
    admin: AdminIdentity,
    Path(id): Path<Uuid>,
    Json(body): Json<RejectDeletionRequestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    body.validate()?;
    let updated = state
        .data_deletion
        .reject(id, &body.reason, Some(admin.as_str()))
        .await?;
    Ok(Json(updated))
}

async fn execute_request(
    State(state): State<AppState>,
    admin: AdminIdentity,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state
        .data_deletion
        .execute_deletion(id, Some(admin.as_str()))
        .await?;
    Ok(Json(updated))
}
