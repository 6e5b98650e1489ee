use std::sync::Arc;

use opcbridge_core::snapshot::SnapshotCache;
use opcbridge_upstream::PollerMetrics;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (API key, bridge settings).
    pub config: Arc<ServerConfig>,
    /// Last-known upstream state, written by the poller.
    pub snapshots: Arc<SnapshotCache>,
    /// Poller counters and link state.
    pub metrics: Arc<PollerMetrics>,
}
