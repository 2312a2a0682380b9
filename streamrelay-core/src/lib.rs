//! # streamrelay-core
//!
//! Relays a streamed agent generation from an upstream service to a client.
//!
//! For every generation the relay consumes the upstream event stream,
//! accumulates the answer and reasoning text, forwards deltas as
//! [`OutboundRecord`]s, fails the generation when upstream goes silent for
//! longer than the idle timeout, and stops deterministically when the client
//! cancels, disconnects, or upstream ends the stream.
//!
//! ## Quick Start
//!
//! ```ignore
//! use streamrelay_core::{HttpSource, RelayConfig, RelayManager, StartRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = RelayManager::new(HttpSource::from_env()?, RelayConfig::from_env()?);
//!
//!     let mut relay = manager.start(StartRequest::new("What is 2 + 2?")).await?;
//!     while let Some(record) = relay.recv().await {
//!         println!("{}", streamrelay_core::encode_record(&record)?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Cancellation
//!
//! Every relay is registered under its [`GenerationIds`]. Cancelling through
//! the [`RelayManager`] or a [`CancelHandle`] stops the relay at once and
//! sends one best-effort cancel request upstream; repeated cancels are no-ops.
//!
//! ## Features
//!
//! - `http`: [`HttpSource`], backed by `streamrelay-upstream`
//! - `test-utils`: [`test_utils::MockSource`], a scripted source for tests

pub mod cancel;
pub mod config;
pub mod encode;
pub mod error;
pub mod events;
pub mod registry;
pub mod relay;
pub mod session;
pub mod source;
pub mod translate;
pub mod watchdog;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use cancel::{CancelHandle, CancelOutcome};
pub use config::{ConfigError, RelayConfig};
pub use encode::{encode_record, ndjson_stream, ErrorKind, OutboundRecord, NDJSON_CONTENT_TYPE};
pub use error::RelayError;
pub use events::{TokenClassification, UpstreamEvent};
pub use registry::SessionRegistry;
pub use relay::{RelayHandle, RelayManager};
pub use session::{GenerationIds, Session, SessionState, SessionSummary, StateCell};
#[cfg(feature = "http")]
pub use source::HttpSource;
pub use source::{
    EventStream, FinalState, FinalStatus, GenerationSource, SourceError, StartRequest,
};
pub use translate::{translate, Step};
pub use watchdog::IdleWatchdog;
