//! Client for the upstream agent generation service
//!
//! This crate covers the four calls a relay needs: posting a user message
//! (which starts a generation), subscribing to the generation's event stream,
//! cancelling generations, and reading back a message's final state.
//!
//! # Quick Start
//!
//! ```no_run
//! // Requires STREAMRELAY_API_KEY and STREAMRELAY_UPSTREAM_URL
//! use futures::StreamExt;
//! use streamrelay_upstream::{ConversationEvent, CreateMessageParams, UpstreamClient};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = UpstreamClient::from_env()?;
//!
//! let ids = client
//!     .conversations()
//!     .create_message(CreateMessageParams::new("Hello!"))
//!     .await?;
//!
//! let mut events = client.conversations().events(&ids)?;
//! while let Some(event) = events.next().await {
//!     if let ConversationEvent::GenerationTokens { text, .. } = event? {
//!         print!("{}", text);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Retry Configuration
//!
//! JSON calls are retried with exponential backoff. Event streams never are.
//!
//! ```
//! use std::time::Duration;
//! use streamrelay_upstream::{RetryConfig, UpstreamClient};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = UpstreamClient::builder()
//!     .api_key("your-api-key")
//!     .api_base("https://agents.example.com/api")
//!     .retry_config(RetryConfig {
//!         max_retries: 3,
//!         base_delay: Duration::from_millis(500),
//!         max_delay: Duration::from_secs(10),
//!         jitter: 0.25,
//!     })
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
pub mod events;
pub mod streaming;
pub mod types;

// Client types
pub use client::{Conversations, UpstreamClient, UpstreamClientBuilder, API_KEY_ENV, BASE_URL_ENV};

// Error types
pub use error::{ApiError, ApiErrorResponse, RetryConfig, UpstreamError};

// Events and streaming
pub use events::{AgentMessage, ConversationEvent, EventError, TokenClassification};
pub use streaming::EventStream;

// Request/response types
pub use types::{CancelResponse, CreateMessageParams, MessageRef, MessageState, MessageStatus};
