//! Test utilities for streamrelay-core.
//!
//! This module provides a scripted [`GenerationSource`] for testing relays
//! without an upstream service.
//!
//! Enable with the `test-utils` feature:
//!
//! ```toml
//! [dev-dependencies]
//! streamrelay-core = { version = "...", features = ["test-utils"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use streamrelay_core::test_utils::MockSource;
//! use streamrelay_core::{RelayConfig, RelayManager, StartRequest};
//!
//! # async fn example() -> Result<(), streamrelay_core::RelayError> {
//! let source = MockSource::new()
//!     .with_thought("thinking")
//!     .with_tokens("Hi")
//!     .with_success("Hi there!");
//!
//! let manager = RelayManager::new(source, RelayConfig::default());
//! let handle = manager.start(StartRequest::new("Hello")).await?;
//! let summary = handle.finish().await.expect("relay task panicked");
//! assert_eq!(summary.answer, "Hi there!");
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;

use crate::events::UpstreamEvent;
use crate::session::GenerationIds;
use crate::source::{
    EventStream, FinalState, FinalStatus, GenerationSource, SourceError, StartRequest,
};

#[derive(Debug, Clone)]
enum ScriptStep {
    Event(UpstreamEvent),
    Delay(Duration),
    Fail(SourceError),
}

#[derive(Default)]
struct Calls {
    starts: Vec<StartRequest>,
    subscribes: usize,
    cancels: Vec<(String, Vec<String>)>,
    final_states: usize,
}

/// A scripted generation source for testing.
///
/// Every subscription replays the same script of events, delays and stream
/// errors. Calls are recorded so tests can assert on them.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use streamrelay_core::test_utils::MockSource;
///
/// // Two deltas, then a stream that stays open with no further events
/// let source = MockSource::new()
///     .with_tokens("Hel")
///     .with_delay(Duration::from_millis(50))
///     .with_tokens("lo")
///     .hang();
/// ```
#[derive(Clone)]
pub struct MockSource {
    ids: GenerationIds,
    script: Arc<Mutex<Vec<ScriptStep>>>,
    hang: bool,
    start_error: Option<SourceError>,
    subscribe_error: Option<SourceError>,
    cancel_error: Option<SourceError>,
    cancel_delay: Option<Duration>,
    final_state: Option<FinalState>,
    calls: Arc<Mutex<Calls>>,
    open_streams: Arc<AtomicUsize>,
}

impl MockSource {
    /// Create a mock whose generations end immediately.
    ///
    /// `start` returns the ids `conv-1`/`msg-1` unless changed with
    /// [`with_ids`](Self::with_ids).
    pub fn new() -> Self {
        Self {
            ids: GenerationIds::new("conv-1", "msg-1"),
            script: Arc::new(Mutex::new(Vec::new())),
            hang: false,
            start_error: None,
            subscribe_error: None,
            cancel_error: None,
            cancel_delay: None,
            final_state: None,
            calls: Arc::new(Mutex::new(Calls::default())),
            open_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Ids returned from `start`
    pub fn with_ids(mut self, ids: GenerationIds) -> Self {
        self.ids = ids;
        self
    }

    /// Append an event to the script
    pub fn with_event(self, event: UpstreamEvent) -> Self {
        self.script.lock().push(ScriptStep::Event(event));
        self
    }

    /// Append several events to the script
    pub fn with_events(self, events: impl IntoIterator<Item = UpstreamEvent>) -> Self {
        self.script
            .lock()
            .extend(events.into_iter().map(ScriptStep::Event));
        self
    }

    /// Append an answer delta
    pub fn with_tokens(self, text: impl Into<String>) -> Self {
        self.with_event(UpstreamEvent::tokens(text))
    }

    /// Append a reasoning delta
    pub fn with_thought(self, text: impl Into<String>) -> Self {
        self.with_event(UpstreamEvent::thought(text))
    }

    /// Append the final answer
    pub fn with_success(self, text: impl Into<String>) -> Self {
        self.with_event(UpstreamEvent::success(text))
    }

    /// Pause the stream before the next scripted step
    pub fn with_delay(self, delay: Duration) -> Self {
        self.script.lock().push(ScriptStep::Delay(delay));
        self
    }

    /// End the script with a stream error
    pub fn with_stream_error(self, error: SourceError) -> Self {
        self.script.lock().push(ScriptStep::Fail(error));
        self
    }

    /// Keep the stream open, silent, once the script is exhausted
    pub fn hang(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Make `start` fail
    pub fn failing_start(mut self, error: SourceError) -> Self {
        self.start_error = Some(error);
        self
    }

    /// Make `subscribe` fail
    pub fn failing_subscribe(mut self, error: SourceError) -> Self {
        self.subscribe_error = Some(error);
        self
    }

    /// Make `cancel` fail (the call is still recorded)
    pub fn failing_cancel(mut self, error: SourceError) -> Self {
        self.cancel_error = Some(error);
        self
    }

    /// Make `cancel` take `delay` to answer (the call is recorded first)
    pub fn with_cancel_delay(mut self, delay: Duration) -> Self {
        self.cancel_delay = Some(delay);
        self
    }

    /// State returned from `final_state`
    pub fn with_final_state(mut self, state: FinalState) -> Self {
        self.final_state = Some(state);
        self
    }

    /// Requests passed to `start`
    pub fn start_requests(&self) -> Vec<StartRequest> {
        self.calls.lock().starts.clone()
    }

    /// Number of times `subscribe` was called
    pub fn subscribe_count(&self) -> usize {
        self.calls.lock().subscribes
    }

    /// Number of times `cancel` was called
    pub fn cancel_count(&self) -> usize {
        self.calls.lock().cancels.len()
    }

    /// Arguments of every `cancel` call
    pub fn cancel_calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().cancels.clone()
    }

    /// Number of times `final_state` was called
    pub fn final_state_count(&self) -> usize {
        self.calls.lock().final_states
    }

    /// Number of event streams handed out and not yet dropped
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks a live mock stream; dropping the stream releases it.
struct OpenStream(Arc<AtomicUsize>);

impl OpenStream {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for OpenStream {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl GenerationSource for MockSource {
    async fn start(&self, request: StartRequest) -> Result<GenerationIds, SourceError> {
        self.calls.lock().starts.push(request);
        match &self.start_error {
            Some(e) => Err(e.clone()),
            None => Ok(self.ids.clone()),
        }
    }

    async fn subscribe(&self, _ids: &GenerationIds) -> Result<EventStream, SourceError> {
        self.calls.lock().subscribes += 1;
        if let Some(e) = &self.subscribe_error {
            return Err(e.clone());
        }

        let steps = self.script.lock().clone();
        let hang = self.hang;
        let guard = OpenStream::new(self.open_streams.clone());

        let stream = async_stream::stream! {
            let _guard = guard;
            for step in steps {
                match step {
                    ScriptStep::Event(event) => yield Ok(event),
                    ScriptStep::Delay(delay) => tokio::time::sleep(delay).await,
                    ScriptStep::Fail(error) => {
                        yield Err(error);
                        return;
                    }
                }
            }
            if hang {
                futures::future::pending::<()>().await;
            }
        };

        Ok(stream.boxed())
    }

    async fn cancel(
        &self,
        conversation_id: &str,
        message_ids: &[String],
    ) -> Result<(), SourceError> {
        self.calls
            .lock()
            .cancels
            .push((conversation_id.to_string(), message_ids.to_vec()));
        if let Some(delay) = self.cancel_delay {
            tokio::time::sleep(delay).await;
        }
        match &self.cancel_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn final_state(&self, _ids: &GenerationIds) -> Result<FinalState, SourceError> {
        self.calls.lock().final_states += 1;
        Ok(self.final_state.clone().unwrap_or(FinalState {
            status: FinalStatus::Unknown,
            answer: None,
            thought: None,
        }))
    }
}
