//! Error types for the upstream client

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Error body returned by the upstream service
///
/// ```json
/// {"error": {"code": "rate_limited", "message": "slow down"}}
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

/// Errors that can occur when talking to the upstream generation service
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The API key was missing, invalid or lacks access
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// 5xx or an explicit "unavailable" code
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Conversation or message does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A 2xx body that did not match the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Timeouts and connection failures
    #[error("Network error: {0}")]
    Network(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The event stream failed after it was opened
    #[error("Stream error: {0}")]
    Stream(String),

    /// Missing API key or unusable base URL
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Other(String),
}

impl UpstreamError {
    /// Whether a request that failed with this error may be sent again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UpstreamError::RateLimited(_)
                | UpstreamError::ServiceUnavailable(_)
                | UpstreamError::Network(_)
        )
    }

    /// Statuses worth retrying: timeouts, conflicts, throttling and 5xx
    pub fn is_retryable_status(status_code: u16) -> bool {
        matches!(status_code, 408 | 409 | 429 | 500..=599)
    }

    /// Classify a failed response
    ///
    /// The error `code` from the body wins over the status when it is one the
    /// service documents; otherwise the status decides.
    pub fn classify(status_code: u16, code: Option<&str>, message: String) -> Self {
        match code {
            Some("unauthorized" | "forbidden") => return UpstreamError::Authentication(message),
            Some("rate_limited") => return UpstreamError::RateLimited(message),
            Some("unavailable" | "overloaded") => {
                return UpstreamError::ServiceUnavailable(message)
            }
            Some("not_found") => return UpstreamError::NotFound(message),
            Some("invalid_request") => return UpstreamError::InvalidRequest(message),
            _ => {}
        }

        match status_code {
            401 | 403 => UpstreamError::Authentication(message),
            404 => UpstreamError::NotFound(message),
            400 | 422 => UpstreamError::InvalidRequest(message),
            429 => UpstreamError::RateLimited(message),
            500..=599 => UpstreamError::ServiceUnavailable(message),
            _ => UpstreamError::Other(message),
        }
    }

    /// Classify an error body, falling back to the raw text
    pub fn from_body(status_code: u16, body: &str) -> Self {
        match serde_json::from_str::<ApiErrorResponse>(body) {
            Ok(response) => {
                Self::classify(status_code, Some(&response.error.code), response.error.message)
            }
            Err(_) if body.trim().is_empty() => {
                Self::classify(status_code, None, format!("HTTP {}", status_code))
            }
            Err(_) => Self::classify(status_code, None, body.to_string()),
        }
    }

    pub fn from_reqwest_error(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Network(format!("timed out: {}", err))
        } else if err.is_connect() || err.is_request() {
            UpstreamError::Network(err.to_string())
        } else if let Some(status) = err.status() {
            Self::classify(status.as_u16(), None, err.to_string())
        } else {
            UpstreamError::Other(err.to_string())
        }
    }
}

/// Retry policy for non-streaming calls
///
/// The n-th retry waits `base_delay * 2^n`, spread by `±jitter` and capped at
/// `max_delay`. A `retry-after-ms` or `retry-after` header overrides the
/// computed delay.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt (default 2)
    pub max_retries: u32,
    /// Default 500ms
    pub base_delay: Duration,
    /// Default 8s
    pub max_delay: Duration,
    /// Fraction of the delay used as random spread, 0.0 to 1.0 (default 0.25)
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: 0.25,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Fail on the first error
    pub fn disabled() -> Self {
        Self::new(0)
    }

    /// Delay before retry number `attempt` (0-indexed)
    pub(crate) fn delay_for_attempt(&self, attempt: u32) -> Duration {
        use rand::Rng;

        let backoff = self.base_delay.as_secs_f64() * 2_f64.powi(attempt as i32);
        let spread = backoff * self.jitter.clamp(0.0, 1.0);
        let offset = if spread > 0.0 {
            rand::thread_rng().gen_range(-spread..=spread)
        } else {
            0.0
        };

        Duration::from_secs_f64((backoff + offset).max(0.0)).min(self.max_delay)
    }

    /// Server-requested delay, `retry-after-ms` before `retry-after`
    pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
        };

        // HTTP-date values are not supported
        header("retry-after-ms")
            .map(Duration::from_millis)
            .or_else(|| header(reqwest::header::RETRY_AFTER.as_str()).map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

    #[test]
    fn test_retryable_variants() {
        assert!(UpstreamError::RateLimited("x".into()).is_retryable());
        assert!(UpstreamError::ServiceUnavailable("x".into()).is_retryable());
        assert!(UpstreamError::Network("x".into()).is_retryable());
        assert!(!UpstreamError::Authentication("x".into()).is_retryable());
        assert!(!UpstreamError::NotFound("x".into()).is_retryable());
        assert!(!UpstreamError::InvalidRequest("x".into()).is_retryable());
    }

    #[test]
    fn test_retryable_status_codes() {
        for code in [408, 409, 429, 500, 502, 503, 599] {
            assert!(UpstreamError::is_retryable_status(code), "{code}");
        }
        for code in [200, 400, 401, 403, 404, 422] {
            assert!(!UpstreamError::is_retryable_status(code), "{code}");
        }
    }

    #[test]
    fn test_classify_by_status() {
        assert!(matches!(
            UpstreamError::classify(401, None, "x".into()),
            UpstreamError::Authentication(_)
        ));
        assert!(matches!(
            UpstreamError::classify(404, Some("whatever"), "x".into()),
            UpstreamError::NotFound(_)
        ));
        assert!(matches!(
            UpstreamError::classify(502, None, "x".into()),
            UpstreamError::ServiceUnavailable(_)
        ));
        assert!(matches!(
            UpstreamError::classify(418, None, "x".into()),
            UpstreamError::Other(_)
        ));
    }

    #[test]
    fn test_code_wins_over_status() {
        assert!(matches!(
            UpstreamError::classify(400, Some("rate_limited"), "x".into()),
            UpstreamError::RateLimited(_)
        ));
        assert!(matches!(
            UpstreamError::classify(500, Some("invalid_request"), "x".into()),
            UpstreamError::InvalidRequest(_)
        ));
    }

    #[test]
    fn test_from_body() {
        match UpstreamError::from_body(429, r#"{"error":{"code":"rate_limited","message":"slow down"}}"#) {
            UpstreamError::RateLimited(msg) => assert_eq!(msg, "slow down"),
            other => panic!("expected RateLimited, got {:?}", other),
        }
        match UpstreamError::from_body(503, "") {
            UpstreamError::ServiceUnavailable(msg) => assert_eq!(msg, "HTTP 503"),
            other => panic!("expected ServiceUnavailable, got {:?}", other),
        }
        match UpstreamError::from_body(400, "<html>bad</html>") {
            UpstreamError::InvalidRequest(msg) => assert_eq!(msg, "<html>bad</html>"),
            other => panic!("expected InvalidRequest, got {:?}", other),
        }
    }

    #[test]
    fn test_delay_is_capped() {
        let config = RetryConfig {
            max_retries: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(3),
            jitter: 0.0,
        };
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(3));
    }

    #[test]
    fn test_delay_jitter_within_bounds() {
        let config = RetryConfig::default();
        for _ in 0..50 {
            let delay = config.delay_for_attempt(1);
            assert!(delay >= Duration::from_millis(750));
            assert!(delay <= Duration::from_millis(1250));
        }
    }

    #[test]
    fn test_retry_after_ms_preferred() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after-ms", HeaderValue::from_static("250"));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("9"));
        assert_eq!(
            RetryConfig::parse_retry_after(&headers),
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn test_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("2"));
        assert_eq!(
            RetryConfig::parse_retry_after(&headers),
            Some(Duration::from_secs(2))
        );

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(RetryConfig::parse_retry_after(&headers), None);
    }
}
