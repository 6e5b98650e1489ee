#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use opcbridge_api::app;
use opcbridge_api::config::ServerConfig;
use opcbridge_api::state::AppState;
use opcbridge_core::snapshot::SnapshotCache;
use opcbridge_upstream::PollerMetrics;
use tower::ServiceExt;

/// Build a test `ServerConfig` from defaults plus `overrides`.
///
/// Binds to `127.0.0.1:0` and keeps the dev CORS origin
/// `http://localhost:5173`.
pub fn test_config(overrides: &[(&str, &str)]) -> ServerConfig {
    let mut vars: HashMap<String, String> = [("HOST", "127.0.0.1"), ("PORT", "0")]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    for (k, v) in overrides {
        vars.insert(k.to_string(), v.to_string());
    }
    ServerConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

/// State with an empty cache and idle metrics.
pub fn test_state(config: ServerConfig) -> AppState {
    AppState {
        config: Arc::new(config),
        snapshots: Arc::new(SnapshotCache::new()),
        metrics: Arc::new(PollerMetrics::new()),
    }
}

/// Build the full application router, with the same middleware stack
/// (CORS, request ID, timeout, tracing, panic recovery) production uses.
pub fn build_test_app(state: AppState) -> Router {
    app::build_router(state)
}

pub async fn send(app: Router, request: Request<Body>) -> Response {
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn get_with_key(app: Router, uri: &str, key: &str) -> Response {
    let request = Request::get(uri)
        .header("x-api-key", key)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
