//! Backup route handlers.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use domain::models::backup::{CreateBackupRequest, ListBackupsQuery, RestoreBackupRequest};
use domain::models::BackupRecord;
use domain::services::BackupPage;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::info;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::AdminIdentity;
use crate::routes::ListResponse;

/// Admin routes:
/// - GET/POST /api/admin/v1/backups
/// - GET/DELETE /api/admin/v1/backups/:backup_id
/// - POST /api/admin/v1/backups/:backup_id/restore
/// - POST /api/admin/v1/backups/:backup_id/download
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_backups).post(create_backup))
        .route("/:backup_id", get(get_backup).delete(delete_backup))
        .route("/:backup_id/restore", post(restore_backup))
        .route("/:backup_id/download", post(download_backup))
}

/// Signed download route:
/// - GET /api/v1/backups/download/:backup_id?expires&signature
pub fn download_router() -> Router<AppState> {
    Router::new().route("/download/:backup_id", get(stream_backup))
}

impl From<BackupPage> for ListResponse<BackupRecord> {
    fn from(page: BackupPage) -> Self {
        Self {
            data: page.data,
            pagination: page.pagination,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SignedDownloadQuery {
    pub expires: i64,
    pub signature: String,
}

async fn list_backups(
    State(state): State<AppState>,
    _admin: AdminIdentity,
    Query(query): Query<ListBackupsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state.backups.list(&query).await?;
    Ok(Json(ListResponse::from(page)))
}

/// Returns 202: the dump runs in the background.
async fn create_backup(
    State(state): State<AppState>,
    admin: AdminIdentity,
    Json(request): Json<CreateBackupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .backups
        .create_backup(request, Some(admin.as_str()))
        .await?;
    Ok((StatusCode::ACCEPTED, Json(record)))
}

async fn get_backup(
    State(state): State<AppState>,
    _admin: AdminIdentity,
    Path(backup_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.backups.get(&backup_id).await?))
}

async fn restore_backup(
    State(state): State<AppState>,
    admin: AdminIdentity,
    Path(backup_id): Path<String>,
    Json(body): Json<RestoreBackupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    body.validate()?;
    let record = state
        .backups
        .restore_backup(&backup_id, &body.confirm_backup_id, Some(admin.as_str()))
        .await?;
    Ok(Json(record))
}

async fn download_backup(
    State(state): State<AppState>,
    admin: AdminIdentity,
    Path(backup_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let handle = state
        .backups
        .download_backup(&backup_id, Some(admin.as_str()))
        .await?;
    Ok(Json(handle))
}

async fn delete_backup(
    State(state): State<AppState>,
    admin: AdminIdentity,
    Path(backup_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .backups
        .delete_backup(&backup_id, Some(admin.as_str()))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn stream_backup(
    State(state): State<AppState>,
    Path(backup_id): Path<String>,
    Query(query): Query<SignedDownloadQuery>,
) -> Result<Response, ApiError> {
    let (record, path) = state
        .backups
        .open_download(&backup_id, query.expires, &query.signature)
        .await?;

    let file = tokio::fs::File::open(&path).await.map_err(|e| {
        ApiError::NotFound(format!("Backup artifact unavailable: {}", e))
    })?;

    info!(backup_id = %backup_id, "Streaming backup artifact");

    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    if let Ok(disposition) =
        HeaderValue::from_str(&format!("attachment; filename=\"{}.dump\"", record.backup_id))
    {
        headers.insert(header::CONTENT_DISPOSITION, disposition);
    }
    if let Some(size) = record.size.and_then(|s| u64::try_from(s).ok()) {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    }

    Ok(response)
}
