//! Upstream generation service client

use crate::error::{RetryConfig, UpstreamError};
use crate::streaming::EventStream;
use crate::types::{
    CancelParams, CancelResponse, CreateMessageParams, MessageRef, MessageState,
    MessageStateResponse,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;

/// Default request timeout for non-streaming calls
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default connect timeout, also applied to event streams
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "STREAMRELAY_API_KEY";

/// Environment variable holding the service base URL
pub const BASE_URL_ENV: &str = "STREAMRELAY_UPSTREAM_URL";

// ============================================================================
// Client
// ============================================================================

/// Client for the upstream generation service
#[derive(Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    stream_client: reqwest::Client,
    api_key: String,
    api_base: String,
    retry_config: RetryConfig,
}

impl std::fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("api_base", &self.api_base)
            .field("api_key", &"[REDACTED]")
            .field("retry_config", &self.retry_config)
            .finish()
    }
}

impl UpstreamClient {
    /// Create a builder for client configuration
    pub fn builder() -> UpstreamClientBuilder {
        UpstreamClientBuilder::new()
    }

    /// Create a client from `STREAMRELAY_API_KEY` and `STREAMRELAY_UPSTREAM_URL`
    pub fn from_env() -> Result<Self, UpstreamError> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| {
            UpstreamError::Configuration(format!("{} environment variable not set", API_KEY_ENV))
        })?;
        let api_base = std::env::var(BASE_URL_ENV).map_err(|_| {
            UpstreamError::Configuration(format!("{} environment variable not set", BASE_URL_ENV))
        })?;
        Self::builder().api_key(api_key).api_base(api_base).build()
    }

    /// Get a handle to the conversations API
    pub fn conversations(&self) -> Conversations<'_> {
        Conversations { client: self }
    }

    /// Base URL requests are sent to
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Execute a JSON request, retrying up to `max_retries` times
    ///
    /// Retries 408/409/429/5xx responses and retryable transport errors with
    /// exponential backoff, honoring `retry-after` headers. Pass `0` for
    /// requests that must not be repeated.
    async fn execute_with_retry<T, B>(
        &self,
        url: &str,
        body: Option<&B>,
        method: reqwest::Method,
        max_retries: u32,
    ) -> Result<T, UpstreamError>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize,
    {
        let headers = build_headers(&self.api_key, "application/json")?;
        let mut last_error: Option<UpstreamError> = None;

        for attempt in 0..=max_retries {
            let mut request = self
                .client
                .request(method.clone(), url)
                .headers(headers.clone());

            if let Some(b) = body {
                request = request.json(b);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json::<T>().await.map_err(|e| {
                            UpstreamError::InvalidResponse(format!(
                                "Failed to parse response: {}",
                                e
                            ))
                        });
                    }

                    let status_code = status.as_u16();
                    let retry_after = RetryConfig::parse_retry_after(response.headers());
                    let error_body = response.text().await.unwrap_or_default();
                    let error = UpstreamError::from_body(status_code, &error_body);

                    if attempt < max_retries
                        && UpstreamError::is_retryable_status(status_code)
                    {
                        let delay = retry_after
                            .unwrap_or_else(|| self.retry_config.delay_for_attempt(attempt));
                        tracing::debug!(
                            %url,
                            status = status_code,
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            "retrying upstream request"
                        );
                        tokio::time::sleep(delay).await;
                        last_error = Some(error);
                        continue;
                    }

                    return Err(error);
                }
                Err(e) => {
                    let error = UpstreamError::from_reqwest_error(e);

                    if attempt < max_retries && error.is_retryable() {
                        let delay = self.retry_config.delay_for_attempt(attempt);
                        tracing::debug!(
                            %url,
                            error = %error,
                            attempt = attempt + 1,
                            "retrying upstream request after transport error"
                        );
                        tokio::time::sleep(delay).await;
                        last_error = Some(error);
                        continue;
                    }

                    return Err(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| UpstreamError::Other("Max retries exceeded".to_string())))
    }
}

/// Builder for [`UpstreamClient`]
///
/// `api_key` and `api_base` are required.
pub struct UpstreamClientBuilder {
    api_key: Option<String>,
    api_base: Option<String>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    retry_config: Option<RetryConfig>,
}

impl UpstreamClientBuilder {
    fn new() -> Self {
        Self {
            api_key: None,
            api_base: None,
            timeout: None,
            connect_timeout: None,
            retry_config: None,
        }
    }

    /// Set the API key
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the service base URL
    pub fn api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = Some(api_base.into());
        self
    }

    /// Set the timeout for non-streaming requests
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the connect timeout (applies to event streams too)
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the maximum number of retries (default: 2)
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        let mut config = self.retry_config.take().unwrap_or_default();
        config.max_retries = max_retries;
        self.retry_config = Some(config);
        self
    }

    /// Set custom retry configuration
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = Some(config);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<UpstreamClient, UpstreamError> {
        let api_key = self
            .api_key
            .ok_or_else(|| UpstreamError::Configuration("API key is required".to_string()))?;
        let api_base = self
            .api_base
            .ok_or_else(|| UpstreamError::Configuration("API base URL is required".to_string()))?;
        let api_base = api_base.trim_end_matches('/').to_string();

        let connect_timeout = self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);

        let client = reqwest::Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| {
                UpstreamError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        // Event streams stay open for the whole generation, so no total timeout.
        let stream_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| {
                UpstreamError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(UpstreamClient {
            client,
            stream_client,
            api_key,
            api_base,
            retry_config: self.retry_config.unwrap_or_default(),
        })
    }
}

// ============================================================================
// Conversations API
// ============================================================================

/// Conversations API handle
pub struct Conversations<'a> {
    client: &'a UpstreamClient,
}

impl<'a> Conversations<'a> {
    /// Post a user message, starting a generation
    ///
    /// Creates a new conversation unless `params.conversation_id` is set.
    /// Sent exactly once: every accepted POST starts a generation upstream,
    /// and a retry after a lost response would start another that nobody
    /// holds the ids to cancel.
    pub async fn create_message(
        &self,
        params: CreateMessageParams,
    ) -> Result<MessageRef, UpstreamError> {
        let url = match &params.conversation_id {
            Some(cid) => format!("{}/v1/conversations/{}/messages", self.client.api_base, cid),
            None => format!("{}/v1/conversations", self.client.api_base),
        };

        self.client
            .execute_with_retry(&url, Some(&params), reqwest::Method::POST, 0)
            .await
    }

    /// Open the event stream of a generation
    ///
    /// Not retried: a partially consumed stream cannot be replayed safely.
    pub fn events(&self, ids: &MessageRef) -> Result<EventStream, UpstreamError> {
        let url = format!(
            "{}/v1/conversations/{}/messages/{}/events",
            self.client.api_base, ids.conversation_id, ids.message_id
        );
        let headers = build_headers(&self.client.api_key, "text/event-stream")?;

        EventStream::new(self.client.stream_client.get(url).headers(headers))
    }

    /// Ask the service to cancel generations in a conversation
    pub async fn cancel(
        &self,
        conversation_id: &str,
        message_ids: &[String],
    ) -> Result<CancelResponse, UpstreamError> {
        let url = format!(
            "{}/v1/conversations/{}/cancel",
            self.client.api_base, conversation_id
        );

        self.client
            .execute_with_retry(
                &url,
                Some(&CancelParams { message_ids }),
                reqwest::Method::POST,
                self.client.retry_config.max_retries,
            )
            .await
    }

    /// Fetch the current state of an agent message
    pub async fn get_message(&self, ids: &MessageRef) -> Result<MessageState, UpstreamError> {
        let url = format!(
            "{}/v1/conversations/{}/messages/{}",
            self.client.api_base, ids.conversation_id, ids.message_id
        );

        self.client
            .execute_with_retry::<MessageStateResponse, ()>(
                &url,
                None,
                reqwest::Method::GET,
                self.client.retry_config.max_retries,
            )
            .await
            .map(|r| r.message)
    }
}

// ============================================================================
// Shared Helpers
// ============================================================================

fn build_headers(api_key: &str, accept: &'static str) -> Result<HeaderMap, UpstreamError> {
    let mut headers = HeaderMap::new();

    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| UpstreamError::Configuration(format!("Invalid API key: {}", e)))?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static(accept));

    Ok(headers)
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
