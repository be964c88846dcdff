//! Integration tests for health, metrics and cross-cutting middleware.

mod common;

use axum::http::{Method, StatusCode};
use common::{get_request, send, service_request, test_context, test_context_with};
use domain::services::memory::FakeProcessRunner;
use tower::ServiceExt;

#[tokio::test]
async fn test_health_reports_environment() {
    let ctx = test_context();
    let (status, body) = send(&ctx.app, get_request("/api/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["environment"], "prod");
    assert_eq!(body["database"]["connected"], true);
}

#[tokio::test]
async fn test_liveness_and_readiness() {
    let ctx = test_context();

    let (status, body) = send(&ctx.app, get_request("/api/health/live")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "alive");

    let (status, body) = send(&ctx.app, get_request("/api/health/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_responses_carry_security_headers_and_request_id() {
    let ctx = test_context();
    let response = ctx
        .app
        .clone()
        .oneshot(get_request("/api/health/live"))
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert!(headers.contains_key("x-request-id"));
    assert!(!headers.contains_key("strict-transport-security"));
}

#[tokio::test]
async fn test_hsts_when_enabled() {
    let ctx = test_context_with(
        &[("security.hsts_enabled", "true")],
        FakeProcessRunner::without_output(),
    );
    let response = ctx
        .app
        .clone()
        .oneshot(get_request("/api/health/live"))
        .await
        .unwrap();
    assert!(response
        .headers()
        .contains_key("strict-transport-security"));
}

#[tokio::test]
async fn test_service_routes_are_rate_limited_per_ip() {
    let ctx = test_context_with(
        &[("security.rate_limit_per_minute", "2")],
        FakeProcessRunner::without_output(),
    );
    let uri = "/api/v1/feature-flags/anything/evaluate";

    for _ in 0..2 {
        let (status, _) = send(&ctx.app, service_request(Method::GET, uri, None)).await;
        assert_eq!(status, StatusCode::OK);
    }

    let response = ctx
        .app
        .clone()
        .oneshot(service_request(Method::GET, uri, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));

    // Health probes are not limited.
    let (status, _) = send(&ctx.app, get_request("/api/health/live")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let ctx = test_context();
    let response = ctx
        .app
        .clone()
        .oneshot(get_request("/api/v1/unknown"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
