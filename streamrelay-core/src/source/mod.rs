//! Upstream generation sources
//!
//! This module contains the [`GenerationSource`] trait the relay consumes
//! events through, and the HTTP implementation backed by
//! `streamrelay-upstream` (feature `http`).

#[cfg(feature = "http")]
pub mod http;

use std::sync::Arc;

use futures::stream::BoxStream;

use crate::events::UpstreamEvent;
use crate::session::GenerationIds;

#[cfg(feature = "http")]
pub use http::HttpSource;

/// Stream of inbound events for one generation
///
/// Ends when the upstream generation ends. An `Err` item is fatal for the
/// relay.
pub type EventStream = BoxStream<'static, Result<UpstreamEvent, SourceError>>;

/// Error types for generation sources
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// Authentication or authorization failed
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting or throttling
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Network or connectivity issues
    #[error("Network error: {0}")]
    Network(String),

    /// Service unavailable or temporary issues
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Unknown conversation or message
    #[error("Not found: {0}")]
    NotFound(String),

    /// The service rejected the request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The event stream broke mid-generation
    #[error("Stream error: {0}")]
    Stream(String),

    /// Invalid configuration (missing key, bad base URL, ...)
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl SourceError {
    /// Stable machine-readable code, used in outbound error records
    pub fn code(&self) -> &'static str {
        match self {
            SourceError::Authentication(_) => "authentication",
            SourceError::RateLimited(_) => "rate_limited",
            SourceError::Network(_) => "network",
            SourceError::ServiceUnavailable(_) => "service_unavailable",
            SourceError::NotFound(_) => "not_found",
            SourceError::InvalidRequest(_) => "invalid_request",
            SourceError::Stream(_) => "stream",
            SourceError::Configuration(_) => "configuration",
            SourceError::Other(_) => "upstream_error",
        }
    }
}

/// Request to start a new generation by posting a user message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    pub message: String,
    /// Post into an existing conversation instead of creating one
    pub conversation_id: Option<String>,
    pub agent_id: Option<String>,
}

impl StartRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            conversation_id: None,
            agent_id: None,
        }
    }

    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }
}

/// Status of a generation as recorded by the upstream service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalStatus {
    Pending,
    Succeeded,
    Failed,
    Cancelled,
    Unknown,
}

/// Stored state of a generation, read back after the stream ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalState {
    pub status: FinalStatus,
    pub answer: Option<String>,
    pub thought: Option<String>,
}

/// Trait for upstream generation services
///
/// The relay only needs four calls: start a generation, subscribe to its
/// events, cancel it, and read back what the service stored.
#[async_trait::async_trait]
pub trait GenerationSource: Send + Sync {
    /// Post a user message, starting a generation
    async fn start(&self, request: StartRequest) -> Result<GenerationIds, SourceError>;

    /// Open the event stream of a generation
    async fn subscribe(&self, ids: &GenerationIds) -> Result<EventStream, SourceError>;

    /// Ask the service to stop generations in a conversation
    async fn cancel(&self, conversation_id: &str, message_ids: &[String])
        -> Result<(), SourceError>;

    /// Read back the stored state of a generation
    async fn final_state(&self, ids: &GenerationIds) -> Result<FinalState, SourceError>;
}

// Implement GenerationSource for Arc<dyn GenerationSource> to support dynamic dispatch
#[async_trait::async_trait]
impl GenerationSource for Arc<dyn GenerationSource> {
    async fn start(&self, request: StartRequest) -> Result<GenerationIds, SourceError> {
        (**self).start(request).await
    }

    async fn subscribe(&self, ids: &GenerationIds) -> Result<EventStream, SourceError> {
        (**self).subscribe(ids).await
    }

    async fn cancel(
        &self,
        conversation_id: &str,
        message_ids: &[String],
    ) -> Result<(), SourceError> {
        (**self).cancel(conversation_id, message_ids).await
    }

    async fn final_state(&self, ids: &GenerationIds) -> Result<FinalState, SourceError> {
        (**self).final_state(ids).await
    }
}
