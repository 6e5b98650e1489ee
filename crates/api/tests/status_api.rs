//! Integration tests for `GET /api/v1/status`.

mod common;

use axum::http::StatusCode;
use chrono::Utc;
use common::{body_json, get, get_with_key};

// ---------------------------------------------------------------------------
// Test: fresh bridge reports no data and idle metrics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fresh_status_has_no_data() {
    let app = common::build_test_app(common::test_state(common::test_config(&[])));
    let response = get(app, "/api/v1/status").await;

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "disconnected");
    assert_eq!(json["has_data"], false);
    assert!(json["last_error"].is_null());
    assert!(json["timestamp"].is_null());
    assert_eq!(json["link_state"], "disconnected");
    assert_eq!(json["message"], "Waiting for first connection");
    assert_eq!(json["metrics"]["connect_attempts"], 0);
}

// ---------------------------------------------------------------------------
// Test: status reflects the cached snapshot
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_reflects_snapshot() {
    let state = common::test_state(common::test_config(&[]));
    state.snapshots.record_sample(3.5, Utc::now());
    state.snapshots.record_disconnected("I/O error: reset");
    let app = common::build_test_app(state);

    let json = body_json(get(app, "/api/v1/status").await).await;

    assert_eq!(json["status"], "disconnected");
    assert_eq!(json["has_data"], true);
    assert_eq!(json["last_error"], "I/O error: reset");
    assert!(json["timestamp"].is_string());
    assert_eq!(json["message"], "Disconnected: I/O error: reset");
}

// ---------------------------------------------------------------------------
// Test: status is behind the API key too
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_requires_api_key_when_configured() {
    let state = common::test_state(common::test_config(&[("API_KEY", "secret")]));
    let app = common::build_test_app(state);

    let denied = get(app.clone(), "/api/v1/status").await;
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(denied).await["error"], "Missing X-API-Key header");

    let allowed = get_with_key(app, "/api/v1/status", "secret").await;
    assert_eq!(allowed.status(), StatusCode::OK);
}
