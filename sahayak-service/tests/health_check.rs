mod common;

use axum::http::StatusCode;
use common::{get, TestApp};
use sahayak_service::services::init_metrics;
use sahayak_service::startup::Application;
use serde_json::json;

#[tokio::test]
async fn root_describes_the_service() {
    let app = TestApp::new();

    let (status, body) = app.send(get("/")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains("Sahayak"));
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["problem_statement"].is_string());
}

#[tokio::test]
async fn health_reports_initialized_gateway() {
    let app = TestApp::new();

    let (status, body) = app.send(get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["api_initialized"], true);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn health_is_ok_without_a_credential() {
    let app = TestApp::without_credential();

    let (status, body) = app.send(get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["api_initialized"], false);
}

#[tokio::test]
async fn request_id_is_echoed() {
    let app = TestApp::new();

    let request = axum::http::Request::builder()
        .uri("/health")
        .header("x-request-id", "req-123")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::util::ServiceExt::oneshot(app.router.clone(), request)
        .await
        .unwrap();

    assert_eq!(response.headers()["x-request-id"], "req-123");
}

#[tokio::test]
async fn metrics_are_exposed() {
    init_metrics();
    let app = TestApp::new();
    app.post_json("/generate-content", json!({ "prompt": "Count to ten" }))
        .await;

    let response = tower::util::ServiceExt::oneshot(app.router.clone(), get("/metrics"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("sahayak_requests_total"));
}

#[tokio::test]
async fn health_check_works_over_http() {
    let mut config = common::test_config();
    config.common.host = "127.0.0.1".to_string();
    config.common.port = 0;

    let app = Application::build(config)
        .await
        .expect("Failed to build application");
    let port = app.port();
    tokio::spawn(app.run_until_stopped());

    let response = reqwest::Client::new()
        .get(format!("http://127.0.0.1:{}/health", port))
        .send()
        .await
        .expect("Failed to execute request.");

    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "healthy");
}
