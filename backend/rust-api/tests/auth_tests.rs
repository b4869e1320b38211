use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use base64::{engine::general_purpose, Engine as _};
use serde_json::json;
use tower::ServiceExt;

mod common;

#[tokio::test]
async fn admin_routes_require_a_token() {
    let app = common::create_test_app();

    let (status, _) = app.public("GET", "/admin/years", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .request("GET", "/admin/years", Some("garbage"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_routes_require_the_admin_role() {
    let app = common::create_test_app();

    let (status, _) = app
        .request(
            "POST",
            "/admin/years",
            Some(&app.student_token),
            Some(json!({"id": "Y1", "name": "Year 1"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(app.store.counts().await, (0, 0, 0, 0));
}

#[tokio::test]
async fn token_signed_with_another_secret_is_refused() {
    let app = common::create_test_app();
    let foreign = common::token(
        &medquiz_api::config::Config {
            jwt_secret: "someone-else".to_string(),
            ..Default::default()
        },
        "intruder",
        "admin",
    );

    let (status, _) = app.request("GET", "/admin/years", Some(&foreign), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn public_reads_need_no_token() {
    let app = common::create_test_app();

    let (status, tree) = app.public("GET", "/api/v1/hierarchy", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tree, json!([]));
}

#[tokio::test]
async fn health_reports_the_store_backend() {
    let app = common::create_test_app();

    let (status, body) = app.public("GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["dependencies"]["store"]["backend"], "memory");
}

#[tokio::test]
async fn metrics_require_basic_auth() {
    let app = common::create_test_app();

    let (status, _) = app.public("GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let credentials = std::env::var("METRICS_AUTH").unwrap_or_else(|_| "admin:changeme".to_string());
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .header(
                    "authorization",
                    format!("Basic {}", general_purpose::STANDARD.encode(credentials)),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn responses_carry_a_trace_id() {
    let app = common::create_test_app();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/hierarchy")
                .header("x-trace-id", "trace-abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()["x-trace-id"], "trace-abc");
    assert!(response
        .headers()
        .contains_key(axum::http::header::CONTENT_SECURITY_POLICY));
}
