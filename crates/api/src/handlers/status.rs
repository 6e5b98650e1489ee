//! Operational view of the bridge: snapshot metadata plus poller metrics.

use axum::extract::State;
use axum::Json;
use opcbridge_core::snapshot::{LinkStatus, Snapshot};
use opcbridge_core::types::Timestamp;
use opcbridge_upstream::{LinkState, MetricsSnapshot};
use serde::Serialize;

use crate::middleware::api_key::RequireApiKey;
use crate::state::AppState;

/// Body of `GET /api/v1/status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: LinkStatus,
    pub last_error: Option<String>,
    pub has_data: bool,
    /// When the cached value was sampled.
    pub timestamp: Option<Timestamp>,
    /// What the poller is doing right now.
    pub link_state: LinkState,
    /// One-line summary for dashboards.
    pub message: String,
    pub metrics: MetricsSnapshot,
}

/// Human-readable one-liner describing the bridge.
pub fn status_message(snapshot: &Snapshot, metrics: &MetricsSnapshot) -> String {
    if metrics.link_state == LinkState::Connecting {
        return "Connecting...".to_string();
    }

    match snapshot.status {
        LinkStatus::Connected => format!(
            "OK - connected, sampling every {} ms",
            metrics.poll_interval_ms
        ),
        LinkStatus::Degraded => format!(
            "Connected but value degraded: {}",
            snapshot.last_error.as_deref().unwrap_or("unknown status")
        ),
        LinkStatus::Disconnected if metrics.retry_delay_ms > 0 => format!(
            "Connection configured but unreachable: retrying (back-off {} s).",
            metrics.retry_delay_ms as f64 / 1000.0
        ),
        LinkStatus::Disconnected => match &snapshot.last_error {
            Some(error) => format!("Disconnected: {error}"),
            None => "Waiting for first connection".to_string(),
        },
    }
}

/// GET /api/v1/status
pub async fn get_status(_key: RequireApiKey, State(state): State<AppState>) -> Json<StatusResponse> {
    let snapshot = state.snapshots.load();
    let metrics = state.metrics.snapshot();

    Json(StatusResponse {
        status: snapshot.status,
        last_error: snapshot.last_error.clone(),
        has_data: snapshot.has_data(),
        timestamp: snapshot.sampled_at,
        link_state: metrics.link_state,
        message: status_message(&snapshot, &metrics),
        metrics,
    })
}
