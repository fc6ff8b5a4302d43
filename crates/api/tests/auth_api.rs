//! HTTP-level tests for Basic authentication.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{basic_auth, body_json, body_text, get, get_auth};
use tower::ServiceExt;

async fn get_with(app: &axum::Router, uri: &str, authorization: &str) -> axum::response::Response {
    let request = Request::builder()
        .uri(uri)
        .header("authorization", authorization)
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

// ---------------------------------------------------------------------------
// Test: requests without credentials are challenged
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_credentials_return_401_with_challenge() {
    let t = common::build_test_app().await;
    let response = get(&t.app, "/api/rjc").await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get("www-authenticate").unwrap(),
        "Basic realm=\"Bacillus\""
    );
    let json = body_json(response).await;
    assert_eq!(json["code"], "UNAUTHORIZED");
}

// ---------------------------------------------------------------------------
// Test: wrong credentials are rejected
// ---------------------------------------------------------------------------

#[tokio::test]
async fn wrong_password_returns_401() {
    let t = common::build_test_app().await;

    let response = get_with(&t.app, "/api/rjc", &basic_auth(common::TEST_USER, "wrong")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = get_with(&t.app, "/api/rjc", "Bearer something").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Test: triggers are authenticated before the tag is looked at
// ---------------------------------------------------------------------------

#[tokio::test]
async fn trigger_without_credentials_starts_nothing() {
    let t = common::build_test_app().await;
    let response = get(&t.app, "/ok").await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(t.state.engine.registry_size(), 0);
}

// ---------------------------------------------------------------------------
// Test: valid credentials pass
// ---------------------------------------------------------------------------

#[tokio::test]
async fn valid_credentials_pass() {
    let t = common::build_test_app().await;
    let response = get_auth(&t.app, "/api/rjc").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "0");
}

// ---------------------------------------------------------------------------
// Test: auth can be switched off
// ---------------------------------------------------------------------------

#[tokio::test]
async fn disabled_auth_lets_anonymous_requests_through() {
    let t = common::build_test_app_with(|c| c.basic_auth = false).await;
    let response = get(&t.app, "/api/rjc").await;

    assert_eq!(response.status(), StatusCode::OK);
}
