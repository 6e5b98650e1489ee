//! Query façade: the current value of the monitored node.

use axum::extract::State;
use axum::Json;
use opcbridge_core::snapshot::{LinkStatus, Snapshot};
use opcbridge_core::types::Timestamp;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::middleware::api_key::RequireApiKey;
use crate::state::AppState;

/// Reported when nothing has been read and no failure recorded yet.
pub const NO_DATA_YET: &str = "No data received from upstream yet";

/// Body of a successful value lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueResponse {
    /// Last good sample.
    pub value: f64,
    /// When `value` was sampled.
    pub timestamp: Option<Timestamp>,
    /// Outcome of the most recent poll cycle, which may be newer than `value`.
    pub status: LinkStatus,
    /// Cause of the most recent failure, present while not connected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Map a snapshot to the façade's answer.
///
/// A present value is always served, whatever the current status; callers
/// judge staleness from `status` and `timestamp`. Without a value the
/// answer is [`AppError::Unavailable`].
pub fn resolve_value(snapshot: &Snapshot) -> AppResult<ValueResponse> {
    match snapshot.value {
        Some(value) => Ok(ValueResponse {
            value,
            timestamp: snapshot.sampled_at,
            status: snapshot.status,
            error: snapshot.last_error.clone(),
        }),
        None => Err(AppError::Unavailable {
            error: snapshot
                .last_error
                .clone()
                .unwrap_or_else(|| NO_DATA_YET.to_string()),
            status: snapshot.status,
        }),
    }
}

/// GET /api/v1/value
pub async fn get_value(
    _key: RequireApiKey,
    State(state): State<AppState>,
) -> AppResult<Json<ValueResponse>> {
    let snapshot = state.snapshots.load();
    resolve_value(&snapshot).map(Json)
}
