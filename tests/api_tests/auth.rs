//! 授权码认证测试
use super::helpers::{read_json, spawn_app, AUTH_CODE};
use axum::http::{Method, StatusCode};
use serde_json::json;

#[tokio::test]
async fn test_missing_auth_code_is_rejected() {
    let app = spawn_app().await;
    let response = app.request(Method::GET, "/api/query", None, None).await;
    let (status, body) = read_json::<()>(response).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body.status, "error");
    assert_eq!(body.error.unwrap().r#type, "AuthRejected");
    app.stop().await;
}

#[tokio::test]
async fn test_wrong_auth_code_is_rejected_without_side_effects() {
    let app = spawn_app().await;
    let response = app
        .request(
            Method::POST,
            "/api/add",
            Some(json!({
                "listenAddr": "127.0.0.1:1",
                "forwardAddr": "127.0.0.1:2",
                "mappingType": "tcp"
            })),
            Some("wrong-secret"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(app.registry.is_empty());

    // 大小写不同也视为不匹配
    let response = app
        .request(
            Method::GET,
            "/api/query",
            None,
            Some(&AUTH_CODE.to_uppercase()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    app.stop().await;
}

#[tokio::test]
async fn test_health_and_metrics_do_not_require_auth() {
    let app = spawn_app().await;
    let response = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app.request(Method::GET, "/metrics", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    app.stop().await;
}
