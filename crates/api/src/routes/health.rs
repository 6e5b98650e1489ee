use axum::extract::State;
use axum::{routing::get, Json, Router};
use opcbridge_core::snapshot::LinkStatus;
use opcbridge_upstream::LinkState;
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the poller currently holds an upstream session.
    pub upstream_connected: bool,
}

/// GET /health -- returns service and upstream health.
///
/// Always 200: the process is alive even while the upstream is not.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let upstream_connected = state.metrics.link_state() == LinkState::Connected;
    let healthy = state.snapshots.load().status == LinkStatus::Connected;

    Json(HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        upstream_connected,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
