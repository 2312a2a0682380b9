//! HTTP endpoints for relaying streamed agent generations.
//!
//! The generation endpoint starts (or attaches to) a generation upstream and
//! answers with a newline-delimited JSON stream of records:
//!
//! ```text
//! {"type":"ids","conversationId":"c1","messageId":"m1"}
//! {"type":"chain_of_thought","text":"thinking"}
//! {"type":"text","text":"Hi"}
//! {"type":"success","message":"Hi there!"}
//! ```
//!
//! With `{"options": {"stream": false}}` it waits for the generation to end
//! and replies with a single `result` or `error` record.
//!
//! # Example
//!
//! ```rust,no_run
//! use streamrelay_core::{HttpSource, RelayConfig, RelayManager};
//! use streamrelay_server::RelayRouter;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = RelayManager::new(HttpSource::from_env()?, RelayConfig::from_env()?);
//!
//! let app = RelayRouter::new(manager)
//!     .with_generations("/api/generate")
//!     .build()?;
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub(crate) mod handler;
pub mod router;
pub(crate) mod state;
pub mod telemetry;

pub use error::{BuildError, ServerError, ServerResult};
pub use handler::{CancelRequest, GenerationRequest, RunOptions};
pub use router::{RelayRouter, HEALTH_PATH};
pub use telemetry::init_tracing;
