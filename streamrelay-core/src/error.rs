//! Relay error types
//!
//! [`RelayError`] covers every way a relayed generation can fail, plus the
//! registry conflict reported when starting one. Cancellation is not an
//! error: a cancelled session simply ends in
//! [`SessionState::Cancelled`](crate::SessionState::Cancelled).

use std::time::Duration;

use thiserror::Error;

use crate::encode::ErrorKind;
use crate::session::GenerationIds;
use crate::source::SourceError;

/// Code of relay-generated idle timeouts
pub const IDLE_TIMEOUT_CODE: &str = "idle_timeout";

/// Error type for relay operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// The upstream service rejected the user message
    #[error("user message rejected ({code}): {message}")]
    UserInput { code: String, message: String },

    /// The agent failed while answering
    #[error("agent error ({code}): {message}")]
    Agent { code: String, message: String },

    /// No upstream event arrived within the idle timeout
    #[error("no upstream event for {}s", after.as_secs_f64())]
    IdleTimeout { after: Duration },

    /// Starting, opening or reading the upstream generation failed
    #[error("upstream error: {0}")]
    Upstream(#[from] SourceError),

    /// The client went away
    #[error("client disconnected")]
    ClientDisconnected,

    /// The client stopped reading; one record could not be written in time
    #[error("client stopped reading for {}s", after.as_secs_f64())]
    ClientStalled { after: Duration },

    /// The generation already has an active relay
    #[error("generation {ids} is already being relayed")]
    AlreadyRelaying { ids: GenerationIds },
}

impl RelayError {
    /// Outbound error kind, or `None` for errors never reported to the client
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            RelayError::UserInput { .. } => Some(ErrorKind::UserInput),
            RelayError::Agent { .. } => Some(ErrorKind::Agent),
            RelayError::IdleTimeout { .. } => Some(ErrorKind::Timeout),
            RelayError::Upstream(_) => Some(ErrorKind::Upstream),
            RelayError::ClientDisconnected
            | RelayError::ClientStalled { .. }
            | RelayError::AlreadyRelaying { .. } => None,
        }
    }

    /// Whether the output side failed rather than the generation
    ///
    /// Such failures are not reported to the client; the relay cancels the
    /// upstream generation instead.
    pub fn is_client_failure(&self) -> bool {
        matches!(
            self,
            RelayError::ClientDisconnected | RelayError::ClientStalled { .. }
        )
    }

    /// Machine-readable code
    pub fn code(&self) -> &str {
        match self {
            RelayError::UserInput { code, .. } | RelayError::Agent { code, .. } => code,
            RelayError::IdleTimeout { .. } => IDLE_TIMEOUT_CODE,
            RelayError::Upstream(e) => e.code(),
            RelayError::ClientDisconnected => "client_disconnected",
            RelayError::ClientStalled { .. } => "client_stalled",
            RelayError::AlreadyRelaying { .. } => "already_relaying",
        }
    }

    /// Human-readable message without the code prefix
    pub fn message(&self) -> String {
        match self {
            RelayError::UserInput { message, .. } | RelayError::Agent { message, .. } => {
                message.clone()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_errors_keep_code_and_message() {
        let err = RelayError::UserInput {
            code: "invalid_mention".to_string(),
            message: "No such agent".to_string(),
        };
        assert_eq!(err.kind(), Some(ErrorKind::UserInput));
        assert_eq!(err.code(), "invalid_mention");
        assert_eq!(err.message(), "No such agent");
        assert_eq!(
            err.to_string(),
            "user message rejected (invalid_mention): No such agent"
        );
    }

    #[test]
    fn test_idle_timeout_is_distinct_from_upstream() {
        let timeout = RelayError::IdleTimeout {
            after: Duration::from_secs(30),
        };
        assert_eq!(timeout.kind(), Some(ErrorKind::Timeout));
        assert_eq!(timeout.code(), IDLE_TIMEOUT_CODE);
        assert_eq!(timeout.message(), "no upstream event for 30s");

        let upstream = RelayError::from(SourceError::Network("reset".to_string()));
        assert_eq!(upstream.kind(), Some(ErrorKind::Upstream));
        assert_eq!(upstream.code(), "network");
    }

    #[test]
    fn test_client_stall_is_not_an_idle_timeout() {
        let stalled = RelayError::ClientStalled {
            after: Duration::from_secs(30),
        };
        assert_eq!(stalled.kind(), None);
        assert_eq!(stalled.code(), "client_stalled");
        assert_eq!(stalled.message(), "client stopped reading for 30s");
        assert!(stalled.is_client_failure());
        assert!(RelayError::ClientDisconnected.is_client_failure());
        assert!(!RelayError::IdleTimeout {
            after: Duration::from_secs(30)
        }
        .is_client_failure());
    }

    #[test]
    fn test_unreported_errors_have_no_kind() {
        assert_eq!(RelayError::ClientDisconnected.kind(), None);
        let conflict = RelayError::AlreadyRelaying {
            ids: GenerationIds::new("c", "m"),
        };
        assert_eq!(conflict.kind(), None);
        assert_eq!(conflict.to_string(), "generation c/m is already being relayed");
    }
}
