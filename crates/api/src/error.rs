use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use opcbridge_core::error::CoreError;
use opcbridge_core::snapshot::LinkStatus;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds the upstream-unavailable case.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `opcbridge_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// No value has been obtained from upstream yet.
    #[error("Upstream unavailable: {error}")]
    Unavailable { error: String, status: LinkStatus },
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Unauthorized(msg) => {
                    (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
                }
            },

            // --- Upstream ---
            AppError::Unavailable { error, status } => {
                let body = json!({
                    "error": error,
                    "code": "UPSTREAM_UNAVAILABLE",
                    "status": status,
                });
                return (StatusCode::SERVICE_UNAVAILABLE, axum::Json(body)).into_response();
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
