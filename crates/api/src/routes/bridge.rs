//! Route definitions for the bridge read endpoints.

use axum::routing::get;
use axum::Router;

use crate::handlers::{status, value};
use crate::state::AppState;

/// Routes mounted at `/api/v1`.
///
/// ```text
/// GET /value                          -> get_value
/// GET /status                         -> get_status
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/value", get(value::get_value))
        .route("/status", get(status::get_status))
}
