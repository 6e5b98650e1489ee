pub mod bridge;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /value                                           cached value (query facade)
/// /status                                          snapshot metadata + poller metrics
/// ```
///
/// Every route honours the optional `X-API-Key` guard.
pub fn api_routes() -> Router<AppState> {
    Router::new().merge(bridge::router())
}
