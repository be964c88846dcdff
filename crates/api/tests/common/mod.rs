//! Common test utilities for integration tests.
//!
//! Builds the full router over in-memory stores so the HTTP surface can be
//! exercised without PostgreSQL or a dump utility.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use control_plane_api::app::{create_app, AppState, Services};
use control_plane_api::config::Config;
use control_plane_api::extractors::ADMIN_ID_HEADER;
use control_plane_api::routes::health::AlwaysReady;
use domain::services::memory::{
    FakeDataEraser, FakeProcessRunner, InMemoryBackupStore, InMemoryDeletionRequestStore,
    InMemoryFeatureFlagStore, InMemoryLoginAttemptStore, ManualClock, RecordingAuditSink,
};
use domain::services::{
    BackupOrchestrator, DataDeletionService, FeatureFlagService, LoginSecurityService,
};

pub const ADMIN_ID: &str = "admin-7";

/// Application wired to in-memory collaborators, plus handles to steer them.
pub struct TestContext {
    pub app: Router,
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub audit: Arc<RecordingAuditSink>,
    pub eraser: Arc<FakeDataEraser>,
    pub flag_store: Arc<InMemoryFeatureFlagStore>,
    pub login_store: Arc<InMemoryLoginAttemptStore>,
    pub runner: Arc<FakeProcessRunner>,
    pub backup_dir: TempDir,
}

pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut all = vec![("database.url", "postgres://cp:cp@localhost:5432/control_plane_test")];
    all.extend_from_slice(overrides);
    let config = Config::load_for_test(&all).expect("test config");
    config.validate().expect("valid test config");
    config
}

pub fn test_context() -> TestContext {
    test_context_with(&[], FakeProcessRunner::succeeding(b"PGDMP-test-dump".to_vec()))
}

pub fn test_context_with(overrides: &[(&str, &str)], runner: FakeProcessRunner) -> TestContext {
    let config = test_config(overrides);
    let backup_dir = tempfile::tempdir().expect("temp dir");

    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap(),
    ));
    let audit = Arc::new(RecordingAuditSink::new());
    let eraser = Arc::new(FakeDataEraser::new());
    let flag_store = Arc::new(InMemoryFeatureFlagStore::new());
    let login_store = Arc::new(InMemoryLoginAttemptStore::new());
    let runner = Arc::new(runner);

    let mut backup_settings = config.backup_settings();
    backup_settings.output_dir = backup_dir.path().to_path_buf();

    let services = Services {
        feature_flags: Arc::new(FeatureFlagService::new(
            flag_store.clone(),
            audit.clone(),
            clock.clone(),
            config.flag_environment(),
        )),
        login_security: Arc::new(LoginSecurityService::new(
            login_store.clone(),
            clock.clone(),
            (&config.login_security).into(),
        )),
        data_deletion: Arc::new(DataDeletionService::new(
            Arc::new(InMemoryDeletionRequestStore::new()),
            eraser.clone(),
            audit.clone(),
            clock.clone(),
            config.data_deletion.grace_period_days,
        )),
        backups: Arc::new(BackupOrchestrator::new(
            Arc::new(InMemoryBackupStore::new()),
            runner.clone(),
            audit.clone(),
            clock.clone(),
            backup_settings,
        )),
    };

    let state = AppState::new(config, services, Arc::new(AlwaysReady));
    let app = create_app(state.clone());

    TestContext {
        app,
        state,
        clock,
        audit,
        eraser,
        flag_store,
        login_store,
        runner,
        backup_dir,
    }
}

/// Sends a request and returns the status plus the parsed JSON body (`Null` when empty).
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|_| {
            panic!(
                "Failed to parse response body. Status: {}, Body: {:?}",
                status,
                String::from_utf8_lossy(&body)
            )
        })
    };
    (status, json)
}

pub fn admin_request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(ADMIN_ID_HEADER, ADMIN_ID);
    with_body(builder, body)
}

pub fn service_request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", "203.0.113.10");
    with_body(builder, body)
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn with_body(builder: axum::http::request::Builder, body: Option<Value>) -> Request<Body> {
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Polls a backup until it leaves `pending`/`in-progress`.
pub async fn wait_for_backup(app: &Router, backup_id: &str) -> Value {
    for _ in 0..200 {
        let (status, body) = send(
            app,
            admin_request(Method::GET, &format!("/api/admin/v1/backups/{}", backup_id), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        match body["status"].as_str() {
            Some("completed") | Some("failed") => return body,
            _ => tokio::time::sleep(Duration::from_millis(10)).await,
        }
    }
    panic!("backup {} never reached a terminal status", backup_id);
}
