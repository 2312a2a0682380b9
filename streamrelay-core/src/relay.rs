//! Relay manager and the per-generation relay task
//!
//! [`RelayManager`] owns the generation source, the session registry and the
//! configuration. Each call to [`start`](RelayManager::start) or
//! [`attach`](RelayManager::attach) spawns one task that:
//!
//! 1. opens the upstream event stream,
//! 2. waits on whichever of {next event, idle deadline, cancellation, client
//!    disconnect} resolves first,
//! 3. translates events into [`OutboundRecord`]s on the handle's channel,
//!    giving up on a client that leaves one record unread for the idle
//!    timeout,
//! 4. settles on exactly one terminal state, then releases the registry
//!    entry, the upstream stream and the channel.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::cancel::{CancelHandle, CancelOutcome};
use crate::config::RelayConfig;
use crate::encode::OutboundRecord;
use crate::error::RelayError;
use crate::registry::SessionRegistry;
use crate::session::{GenerationIds, Session, SessionState, SessionSummary, StateCell};
use crate::source::{FinalStatus, GenerationSource, StartRequest};
use crate::translate::{translate, Step};
use crate::watchdog::IdleWatchdog;

/// Process-wide owner of relays
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct RelayManager {
    source: Arc<dyn GenerationSource>,
    registry: SessionRegistry,
    config: RelayConfig,
}

impl RelayManager {
    pub fn new(source: impl GenerationSource + 'static, config: RelayConfig) -> Self {
        Self::from_arc(Arc::new(source), config)
    }

    pub fn from_arc(source: Arc<dyn GenerationSource>, config: RelayConfig) -> Self {
        Self {
            source,
            registry: SessionRegistry::new(),
            config,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Number of generations currently being relayed
    pub fn active_sessions(&self) -> usize {
        self.registry.len()
    }

    /// Start a generation upstream and relay it
    ///
    /// The first record on the returned handle is
    /// [`OutboundRecord::Ids`].
    pub async fn start(&self, request: StartRequest) -> Result<RelayHandle, RelayError> {
        let ids = self.source.start(request).await.map_err(|e| {
            tracing::warn!(error = %e, "failed to start generation");
            RelayError::from(e)
        })?;
        tracing::info!(%ids, "generation started");

        self.spawn(ids, true)
    }

    /// Relay a generation that was started elsewhere
    pub fn attach(&self, ids: GenerationIds) -> Result<RelayHandle, RelayError> {
        self.spawn(ids, false)
    }

    /// Cancel the relay of `ids`; `None` if it is not being relayed
    pub async fn cancel(&self, ids: &GenerationIds) -> Option<CancelOutcome> {
        let handle = self.registry.get(ids)?;
        Some(handle.cancel().await)
    }

    /// Cancel relays in a conversation
    ///
    /// With an empty `message_ids`, every relay in the conversation is
    /// cancelled. Unknown ids are skipped. Returns how many relays this call
    /// cancelled.
    pub async fn cancel_conversation(&self, conversation_id: &str, message_ids: &[String]) -> usize {
        let handles: Vec<CancelHandle> = if message_ids.is_empty() {
            self.registry.in_conversation(conversation_id)
        } else {
            message_ids
                .iter()
                .filter_map(|message_id| {
                    self.registry
                        .get(&GenerationIds::new(conversation_id, message_id.as_str()))
                })
                .collect()
        };

        let outcomes =
            futures::future::join_all(handles.iter().map(|handle| handle.cancel())).await;
        outcomes
            .into_iter()
            .filter(|outcome| *outcome == CancelOutcome::Cancelled)
            .count()
    }

    fn spawn(&self, ids: GenerationIds, announce: bool) -> Result<RelayHandle, RelayError> {
        let cancel = CancelHandle::new(
            ids.clone(),
            StateCell::new(),
            self.source.clone(),
            self.config.cancel_timeout,
            &self.registry,
        );
        self.registry.register(cancel.clone())?;

        let (tx, records) = mpsc::channel(self.config.channel_capacity.max(1));
        let task = RelayTask {
            cancel: cancel.clone(),
            source: self.source.clone(),
            config: self.config.clone(),
            tx,
            announce,
        };

        let span = tracing::info_span!(
            "relay",
            conversation_id = %ids.conversation_id,
            message_id = %ids.message_id,
        );
        let join = tokio::spawn(task.run().instrument(span));

        Ok(RelayHandle {
            ids,
            cancel,
            records,
            join,
        })
    }
}

impl std::fmt::Debug for RelayManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayManager")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

/// Handle to one running relay
///
/// Records arrive in the order upstream events were observed. The channel
/// closes when the relay reaches a terminal state; dropping the handle (or
/// its receiver) counts as a client disconnect.
#[derive(Debug)]
pub struct RelayHandle {
    ids: GenerationIds,
    cancel: CancelHandle,
    records: mpsc::Receiver<OutboundRecord>,
    join: JoinHandle<SessionSummary>,
}

impl RelayHandle {
    pub fn ids(&self) -> &GenerationIds {
        &self.ids
    }

    pub fn cancel_handle(&self) -> &CancelHandle {
        &self.cancel
    }

    /// Next record, or `None` once the relay has ended
    pub async fn recv(&mut self) -> Option<OutboundRecord> {
        self.records.recv().await
    }

    pub fn into_parts(
        self,
    ) -> (
        CancelHandle,
        mpsc::Receiver<OutboundRecord>,
        JoinHandle<SessionSummary>,
    ) {
        (self.cancel, self.records, self.join)
    }

    /// Drain the remaining records and wait for the relay to end
    pub async fn finish(self) -> Result<SessionSummary, JoinError> {
        self.collect().await.map(|(_, summary)| summary)
    }

    /// Gather the remaining records and the summary
    pub async fn collect(mut self) -> Result<(Vec<OutboundRecord>, SessionSummary), JoinError> {
        let mut records = Vec::new();
        while let Some(record) = self.records.recv().await {
            records.push(record);
        }
        let summary = self.join.await?;
        Ok((records, summary))
    }
}

/// How the relay loop ended, before the terminal state is settled
enum Exit {
    Completed,
    Cancelled,
    Failed(RelayError),
}

struct RelayTask {
    cancel: CancelHandle,
    source: Arc<dyn GenerationSource>,
    config: RelayConfig,
    tx: mpsc::Sender<OutboundRecord>,
    announce: bool,
}

impl RelayTask {
    async fn run(self) -> SessionSummary {
        let mut session = Session::new(
            self.cancel.ids().clone(),
            self.cancel.state_cell().clone(),
        );

        let exit = self.drive(&mut session).await;
        let error = self.settle(exit, &session).await;
        self.cancel.unregister();

        let RelayTask {
            source, config, tx, ..
        } = self;
        drop(tx);

        if config.verify_final_state && session.state() == SessionState::Completed {
            verify_final_state(source.as_ref(), &session).await;
        }

        session.into_summary(error)
    }

    async fn drive(&self, session: &mut Session) -> Exit {
        let token = self.cancel.token();

        if self.announce {
            if let Err(exit) = self.send(OutboundRecord::ids(session.ids()), &token).await {
                return exit;
            }
        }

        let subscribed = tokio::select! {
            biased;
            _ = token.cancelled() => return Exit::Cancelled,
            _ = self.tx.closed() => return Exit::Failed(RelayError::ClientDisconnected),
            result = self.source.subscribe(session.ids()) => result,
        };
        let mut stream = match subscribed {
            Ok(stream) => stream,
            Err(e) => return Exit::Failed(RelayError::Upstream(e)),
        };

        if !session.state_cell().begin_streaming() {
            return Exit::Cancelled;
        }
        tracing::debug!("upstream stream open");

        let mut watchdog = IdleWatchdog::new(self.config.idle_timeout);
        let idle_timeout = watchdog.timeout();

        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Exit::Cancelled,
                _ = self.tx.closed() => return Exit::Failed(RelayError::ClientDisconnected),
                _ = watchdog.expired() => {
                    return Exit::Failed(RelayError::IdleTimeout { after: idle_timeout })
                }
                next = stream.next() => next,
            };

            let event = match next {
                None => return Exit::Completed,
                Some(Err(e)) => return Exit::Failed(RelayError::Upstream(e)),
                Some(Ok(event)) => event,
            };
            watchdog.reset();
            tracing::trace!(event = event.kind(), "upstream event");

            match translate(session, event) {
                Step::Skip => {}
                Step::Forward(record) => {
                    if let Err(exit) = self.send(record, &token).await {
                        return exit;
                    }
                    // Upstream silence is only counted while we are reading.
                    watchdog.reset();
                }
                Step::Terminate(error) => return Exit::Failed(error),
            }
        }
    }

    /// Write one record
    ///
    /// Gives up on cancellation, on disconnect, or when the client has not
    /// made room for the record within the idle timeout.
    async fn send(&self, record: OutboundRecord, token: &CancellationToken) -> Result<(), Exit> {
        let after = self.config.idle_timeout;

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(Exit::Cancelled),
            sent = self.tx.send(record) => {
                sent.map_err(|_| Exit::Failed(RelayError::ClientDisconnected))
            }
            _ = tokio::time::sleep(after) => {
                Err(Exit::Failed(RelayError::ClientStalled { after }))
            }
        }
    }

    /// Record the terminal state; returns the error if this relay failed
    async fn settle(&self, exit: Exit, session: &Session) -> Option<RelayError> {
        let state = session.state_cell();

        match exit {
            Exit::Completed => {
                match state.finish(SessionState::Completed) {
                    Ok(()) => tracing::info!(
                        answer_len = session.answer().len(),
                        thought_len = session.thought().len(),
                        "generation completed"
                    ),
                    Err(winner) => {
                        tracing::debug!(%winner, "stream ended after session was settled")
                    }
                }
                None
            }
            Exit::Cancelled => {
                tracing::info!("relay stopped by cancellation");
                None
            }
            Exit::Failed(error) => {
                if let Err(winner) = state.finish(SessionState::Errored) {
                    tracing::debug!(%winner, error = %error, "failure after session was settled");
                    return None;
                }

                if error.is_client_failure() {
                    tracing::info!(error = %error, "client gone, cancelling upstream generation");
                    self.cancel.cancel_upstream().await;
                } else {
                    tracing::warn!(code = error.code(), error = %error, "generation failed");
                    if let Some(record) = OutboundRecord::from_error(&error) {
                        let sent =
                            tokio::time::timeout(self.config.idle_timeout, self.tx.send(record))
                                .await;
                        if !matches!(sent, Ok(Ok(()))) {
                            tracing::debug!("error record not delivered");
                        }
                    }
                }
                Some(error)
            }
        }
    }
}

async fn verify_final_state(source: &dyn GenerationSource, session: &Session) {
    match source.final_state(session.ids()).await {
        Ok(stored) if stored.status != FinalStatus::Succeeded => {
            tracing::warn!(status = ?stored.status, "stored generation did not succeed");
        }
        Ok(stored) => {
            let stored_answer = stored.answer.as_deref().map(str::trim).unwrap_or_default();
            if stored_answer != session.answer() {
                tracing::warn!(
                    relayed_len = session.answer().len(),
                    stored_len = stored_answer.len(),
                    "relayed answer differs from stored answer"
                );
            } else {
                tracing::debug!("relayed answer matches stored answer");
            }
        }
        Err(e) => tracing::warn!(error = %e, "final state check failed"),
    }
}

#[cfg(test)]
#[path = "relay_tests.rs"]
mod tests;
