//! Error types for the feed gateway
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Gate Error Enum ==
/// Unified error type for the feed gateway.
#[derive(Error, Debug)]
pub enum GateError {
    /// Key is not on the settings whitelist
    #[error("Not allowed: {0}")]
    NotAllowed(String),

    /// Upstream has no document for the key
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Challenge-response verification failed.
    ///
    /// Carries no detail: disabled auth, unknown nonce, reused nonce and a
    /// wrong hash are indistinguishable to the caller.
    #[error("Unauthorized")]
    Unauthorized,

    /// Upstream fetch failed
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Settings store could not persist a value
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid configuration at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            GateError::NotAllowed(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            GateError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            GateError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            GateError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            GateError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            GateError::Storage(_) | GateError::Config(_) | GateError::Internal(_) => {
                tracing::error!("{}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the feed gateway.
pub type Result<T> = std::result::Result<T, GateError>;
