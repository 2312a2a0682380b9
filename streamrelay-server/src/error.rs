//! Error types for the relay server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use streamrelay_core::RelayError;

/// Errors that can occur when building a router.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// No endpoints were configured.
    #[error("No endpoints configured. Call .with_generations() before .build()")]
    NoEndpoints,
}

/// Errors returned by the HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The relay could not be started or ended in failure.
    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    /// Invalid request from client.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// HTTP status for a relay failure
///
/// Upstream start failures and agent errors are gateway failures; a silent
/// upstream is a gateway timeout.
pub fn relay_status(error: &RelayError) -> StatusCode {
    match error {
        RelayError::UserInput { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        RelayError::Agent { .. } | RelayError::Upstream(_) => StatusCode::BAD_GATEWAY,
        RelayError::IdleTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        RelayError::AlreadyRelaying { .. } => StatusCode::CONFLICT,
        RelayError::ClientDisconnected | RelayError::ClientStalled { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::Relay(e) => (relay_status(e), e.to_string()),
            ServerError::InvalidRequest(e) => (StatusCode::BAD_REQUEST, e.clone()),
            ServerError::Internal(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.clone()),
        };

        let body = Json(serde_json::json!({
            "error": message,
            "code": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

/// Result type alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
