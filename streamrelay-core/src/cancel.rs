//! Cancellation of relayed generations

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::registry::{self, Entries, SessionRegistry};
use crate::session::{GenerationIds, SessionState, StateCell};
use crate::source::GenerationSource;

/// Result of [`CancelHandle::cancel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// This call ended the session
    Cancelled,
    /// The session had already ended in the given state; nothing was done
    AlreadyTerminal(SessionState),
}

/// Handle that stops one relayed generation
///
/// Clones refer to the same session. Cancelling is idempotent: only the call
/// that moves the session to `Cancelled` has any effect, and it fires at most
/// one upstream cancel request.
#[derive(Clone)]
pub struct CancelHandle {
    inner: Arc<Inner>,
}

struct Inner {
    ids: GenerationIds,
    state: StateCell,
    token: CancellationToken,
    source: Arc<dyn GenerationSource>,
    cancel_timeout: Duration,
    registry: Weak<Entries>,
}

impl CancelHandle {
    pub(crate) fn new(
        ids: GenerationIds,
        state: StateCell,
        source: Arc<dyn GenerationSource>,
        cancel_timeout: Duration,
        registry: &SessionRegistry,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                ids,
                state,
                token: CancellationToken::new(),
                source,
                cancel_timeout,
                registry: registry.downgrade(),
            }),
        }
    }

    pub fn ids(&self) -> &GenerationIds {
        &self.inner.ids
    }

    /// Current state of the session
    pub fn state(&self) -> SessionState {
        self.inner.state.get()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Whether both handles belong to the same relay
    pub fn ptr_eq(&self, other: &CancelHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn state_cell(&self) -> &StateCell {
        &self.inner.state
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    /// Stop relaying and ask upstream to stop generating
    ///
    /// Stops the local relay immediately, without waiting for the next
    /// upstream event. The upstream cancel request is best effort: a failure
    /// is logged and otherwise ignored, and it is abandoned after
    /// [`RelayConfig::cancel_timeout`](crate::RelayConfig::cancel_timeout).
    pub async fn cancel(&self) -> CancelOutcome {
        if let Err(state) = self.inner.state.finish(SessionState::Cancelled) {
            tracing::debug!(ids = %self.inner.ids, %state, "cancel ignored, session already ended");
            return CancelOutcome::AlreadyTerminal(state);
        }

        tracing::info!(ids = %self.inner.ids, "cancelling generation");
        self.inner.token.cancel();
        self.cancel_upstream().await;
        self.unregister();

        CancelOutcome::Cancelled
    }

    /// Send the upstream cancel request, logging failures and timeouts
    pub(crate) async fn cancel_upstream(&self) {
        let ids = &self.inner.ids;
        let message_ids = [ids.message_id.clone()];
        let request = self.inner.source.cancel(&ids.conversation_id, &message_ids);

        match tokio::time::timeout(self.inner.cancel_timeout, request).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(ids = %ids, error = %e, "upstream cancel failed"),
            Err(_) => tracing::warn!(
                ids = %ids,
                timeout_ms = self.inner.cancel_timeout.as_millis() as u64,
                "upstream cancel timed out"
            ),
        }
    }

    /// Drop this handle's registry entry, if it is still the registered one
    pub(crate) fn unregister(&self) -> bool {
        match self.inner.registry.upgrade() {
            Some(entries) => registry::remove_entry(&entries, self),
            None => false,
        }
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("ids", &self.inner.ids)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
#[path = "cancel_tests.rs"]
mod tests;
