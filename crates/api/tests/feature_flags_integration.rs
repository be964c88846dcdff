//! Integration tests for feature flag administration and evaluation.

mod common;

use axum::http::{Method, StatusCode};
use common::{admin_request, send, service_request, test_context, ADMIN_ID};
use domain::models::AuditAction;
use serde_json::json;

async fn create_flag(ctx: &common::TestContext, body: serde_json::Value) -> serde_json::Value {
    let (status, flag) = send(
        &ctx.app,
        admin_request(Method::POST, "/api/admin/v1/feature-flags", Some(body)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", flag);
    flag
}

async fn evaluate(ctx: &common::TestContext, uri: &str) -> bool {
    let (status, body) = send(&ctx.app, service_request(Method::GET, uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    body["enabled"].as_bool().unwrap()
}

#[tokio::test]
async fn test_create_and_get_flag() {
    let ctx = test_context();
    let flag = create_flag(
        &ctx,
        json!({ "key": "new-checkout", "description": "Single page checkout", "enabled": true }),
    )
    .await;

    assert_eq!(flag["key"], "new-checkout");
    assert_eq!(flag["enabled"], true);
    assert_eq!(flag["created_by"], ADMIN_ID);

    let (status, fetched) = send(
        &ctx.app,
        admin_request(Method::GET, "/api/admin/v1/feature-flags/new-checkout", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], flag["id"]);
}

#[tokio::test]
async fn test_duplicate_key_conflicts() {
    let ctx = test_context();
    create_flag(&ctx, json!({ "key": "tipping" })).await;

    let (status, body) = send(
        &ctx.app,
        admin_request(
            Method::POST,
            "/api/admin/v1/feature-flags",
            Some(json!({ "key": "tipping" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn test_invalid_flag_rejected() {
    let ctx = test_context();

    for body in [
        json!({ "key": "Bad Key" }),
        json!({ "key": "promo", "rollout_percentage": 150 }),
        json!({
            "key": "promo",
            "start_date": "2026-11-01T00:00:00Z",
            "end_date": "2026-10-01T00:00:00Z"
        }),
    ] {
        let (status, error) = send(
            &ctx.app,
            admin_request(Method::POST, "/api/admin/v1/feature-flags", Some(body)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["error"], "validation_error");
    }
}

#[tokio::test]
async fn test_update_toggle_and_delete() {
    let ctx = test_context();
    create_flag(&ctx, json!({ "key": "surge-pricing", "enabled": false })).await;

    let (status, updated) = send(
        &ctx.app,
        admin_request(
            Method::PUT,
            "/api/admin/v1/feature-flags/surge-pricing",
            Some(json!({ "description": "Dynamic delivery fee", "enabled_for_roles": ["ops"] })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["description"], "Dynamic delivery fee");
    assert_eq!(updated["updated_by"], ADMIN_ID);

    let (_, limited) = send(
        &ctx.app,
        admin_request(
            Method::PUT,
            "/api/admin/v1/feature-flags/surge-pricing",
            Some(json!({ "rollout_percentage": 40, "environment": "staging" })),
        ),
    )
    .await;
    assert_eq!(limited["rollout_percentage"], 40);
    assert_eq!(limited["environment"], "staging");

    let (status, cleared) = send(
        &ctx.app,
        admin_request(
            Method::PUT,
            "/api/admin/v1/feature-flags/surge-pricing",
            Some(json!({ "rollout_percentage": null, "environment": null })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(cleared["rollout_percentage"].is_null());
    assert!(cleared["environment"].is_null());
    assert_eq!(cleared["description"], "Dynamic delivery fee");

    let (status, toggled) = send(
        &ctx.app,
        admin_request(
            Method::POST,
            "/api/admin/v1/feature-flags/surge-pricing/toggle",
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(toggled["enabled"], true);

    let (status, _) = send(
        &ctx.app,
        admin_request(Method::DELETE, "/api/admin/v1/feature-flags/surge-pricing", None),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &ctx.app,
        admin_request(Method::GET, "/api/admin/v1/feature-flags/surge-pricing", None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let actions: Vec<_> = ctx.audit.entries().iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::FeatureFlagCreate,
            AuditAction::FeatureFlagUpdate,
            AuditAction::FeatureFlagToggle,
            AuditAction::FeatureFlagDelete,
        ]
    );
}

#[tokio::test]
async fn test_list_filters_by_enabled() {
    let ctx = test_context();
    create_flag(&ctx, json!({ "key": "a-flag", "enabled": true })).await;
    create_flag(&ctx, json!({ "key": "b-flag", "enabled": false })).await;

    let (status, body) = send(
        &ctx.app,
        admin_request(Method::GET, "/api/admin/v1/feature-flags?enabled=true", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let keys: Vec<_> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["key"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(keys, vec!["a-flag"]);
}

#[tokio::test]
async fn test_admin_routes_require_identity() {
    let ctx = test_context();
    let request = axum::http::Request::builder()
        .method(Method::GET)
        .uri("/api/admin/v1/feature-flags")
        .body(axum::body::Body::empty())
        .unwrap();

    let (status, body) = send(&ctx.app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn test_evaluate_follows_rules() {
    let ctx = test_context();
    create_flag(
        &ctx,
        json!({ "key": "beta-menu", "enabled": true, "enabled_for_users": ["u-1"] }),
    )
    .await;
    create_flag(
        &ctx,
        json!({ "key": "ops-tools", "enabled": true, "enabled_for_roles": ["ops"] }),
    )
    .await;
    create_flag(
        &ctx,
        json!({ "key": "staging-only", "enabled": true, "environment": "staging" }),
    )
    .await;

    assert!(evaluate(&ctx, "/api/v1/feature-flags/beta-menu/evaluate?user_id=u-1").await);
    assert!(!evaluate(&ctx, "/api/v1/feature-flags/beta-menu/evaluate?user_id=u-2").await);
    assert!(evaluate(&ctx, "/api/v1/feature-flags/ops-tools/evaluate?role=ops").await);
    assert!(!evaluate(&ctx, "/api/v1/feature-flags/ops-tools/evaluate?role=rider").await);
    assert!(!evaluate(&ctx, "/api/v1/feature-flags/staging-only/evaluate").await);
}

#[tokio::test]
async fn test_evaluate_fails_closed() {
    let ctx = test_context();
    create_flag(&ctx, json!({ "key": "always-on", "enabled": true })).await;
    assert!(evaluate(&ctx, "/api/v1/feature-flags/always-on/evaluate").await);

    assert!(!evaluate(&ctx, "/api/v1/feature-flags/missing/evaluate").await);

    ctx.flag_store.set_failing(true);
    assert!(!evaluate(&ctx, "/api/v1/feature-flags/always-on/evaluate").await);
}

#[tokio::test]
async fn test_evaluate_respects_date_window() {
    let ctx = test_context();
    create_flag(
        &ctx,
        json!({
            "key": "holiday-banner",
            "enabled": true,
            "start_date": "2026-12-01T00:00:00Z",
            "end_date": "2026-12-31T23:59:59Z"
        }),
    )
    .await;
    let uri = "/api/v1/feature-flags/holiday-banner/evaluate";

    assert!(!evaluate(&ctx, uri).await);
    ctx.clock.advance(chrono::Duration::days(50));
    assert!(evaluate(&ctx, uri).await);
    ctx.clock.advance(chrono::Duration::days(50));
    assert!(!evaluate(&ctx, uri).await);
}
