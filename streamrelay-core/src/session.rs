//! Per-generation session state
//!
//! A [`Session`] holds what the relay has accumulated for one generation. Its
//! text fields belong to the relay task alone; the only piece shared with the
//! outside world is the [`StateCell`], which the relay task and the
//! [`CancelHandle`](crate::CancelHandle) race on to record a terminal state.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Identifiers of one upstream generation
///
/// Issued by the upstream service when a user message is posted. Opaque to
/// the relay and never modified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationIds {
    pub conversation_id: String,
    pub message_id: String,
}

impl GenerationIds {
    pub fn new(conversation_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            message_id: message_id.into(),
        }
    }
}

impl fmt::Display for GenerationIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.conversation_id, self.message_id)
    }
}

/// Lifecycle of a relayed generation
///
/// `Idle → Streaming → {Completed | Cancelled | Errored}`. A session may also
/// go straight from `Idle` to a terminal state when it is cancelled or fails
/// before the upstream stream opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SessionState {
    Idle = 0,
    Streaming = 1,
    Completed = 2,
    Cancelled = 3,
    Errored = 4,
}

impl SessionState {
    /// Whether no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Cancelled | SessionState::Errored
        )
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Idle,
            1 => SessionState::Streaming,
            2 => SessionState::Completed,
            3 => SessionState::Cancelled,
            _ => SessionState::Errored,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Streaming => "streaming",
            SessionState::Completed => "completed",
            SessionState::Cancelled => "cancelled",
            SessionState::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Shared, atomically updated [`SessionState`]
///
/// Cloning shares the same cell. Every transition is a compare-and-swap, so
/// when several paths try to end a session concurrently exactly one of them
/// observes success.
#[derive(Debug, Clone)]
pub struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(SessionState::Idle as u8)))
    }

    /// Current state
    pub fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move `Idle → Streaming`. Returns `false` if the session already left `Idle`.
    pub fn begin_streaming(&self) -> bool {
        self.0
            .compare_exchange(
                SessionState::Idle as u8,
                SessionState::Streaming as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move to `terminal` from any non-terminal state.
    ///
    /// Returns the state that was already recorded if another path won.
    pub fn finish(&self, terminal: SessionState) -> Result<(), SessionState> {
        debug_assert!(terminal.is_terminal());

        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let state = SessionState::from_u8(current);
            if state.is_terminal() {
                return Err(state);
            }
            match self.0.compare_exchange_weak(
                current,
                terminal as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    /// Whether both cells are the same shared cell
    pub fn ptr_eq(&self, other: &StateCell) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Accumulated state of one relayed generation
#[derive(Debug)]
pub struct Session {
    ids: GenerationIds,
    answer: String,
    thought: String,
    final_answer_seen: bool,
    state: StateCell,
}

impl Session {
    pub fn new(ids: GenerationIds, state: StateCell) -> Self {
        Self {
            ids,
            answer: String::new(),
            thought: String::new(),
            final_answer_seen: false,
            state,
        }
    }

    pub fn ids(&self) -> &GenerationIds {
        &self.ids
    }

    /// Answer text so far, trimmed
    pub fn answer(&self) -> &str {
        self.answer.trim()
    }

    /// Reasoning text so far, as received
    pub fn thought(&self) -> &str {
        &self.thought
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub fn state_cell(&self) -> &StateCell {
        &self.state
    }

    /// Whether the authoritative final answer has replaced the accumulated one
    pub fn has_final_answer(&self) -> bool {
        self.final_answer_seen
    }

    pub(crate) fn append_answer(&mut self, delta: &str) {
        self.answer.push_str(delta);
    }

    pub(crate) fn append_thought(&mut self, delta: &str) {
        self.thought.push_str(delta);
    }

    pub(crate) fn set_final_answer(&mut self, text: String) {
        self.answer = text;
        self.final_answer_seen = true;
    }

    /// Consume the session into the summary returned from the relay task
    pub fn into_summary(self, error: Option<RelayError>) -> SessionSummary {
        let state = self.state.get();
        let answer = self.answer.trim().to_string();
        SessionSummary {
            ids: self.ids,
            state,
            answer,
            thought: self.thought,
            error,
        }
    }
}

/// Outcome of a relayed generation
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub ids: GenerationIds,
    pub state: SessionState,
    pub answer: String,
    pub thought: String,
    /// The failure that ended the session when `state` is `Errored`
    pub error: Option<RelayError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(GenerationIds::new("c", "m"), StateCell::new())
    }

    #[test]
    fn test_state_cell_starts_idle() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), SessionState::Idle);
        assert!(!cell.get().is_terminal());
    }

    #[test]
    fn test_begin_streaming_only_from_idle() {
        let cell = StateCell::new();
        assert!(cell.begin_streaming());
        assert_eq!(cell.get(), SessionState::Streaming);
        assert!(!cell.begin_streaming());

        let cancelled = StateCell::new();
        cancelled.finish(SessionState::Cancelled).unwrap();
        assert!(!cancelled.begin_streaming());
        assert_eq!(cancelled.get(), SessionState::Cancelled);
    }

    #[test]
    fn test_finish_has_one_winner() {
        let cell = StateCell::new();
        cell.begin_streaming();

        assert_eq!(cell.finish(SessionState::Completed), Ok(()));
        assert_eq!(
            cell.finish(SessionState::Cancelled),
            Err(SessionState::Completed)
        );
        assert_eq!(
            cell.finish(SessionState::Errored),
            Err(SessionState::Completed)
        );
        assert_eq!(cell.get(), SessionState::Completed);
    }

    #[test]
    fn test_finish_races_across_threads() {
        let cell = StateCell::new();
        cell.begin_streaming();

        let handles: Vec<_> = [
            SessionState::Completed,
            SessionState::Cancelled,
            SessionState::Errored,
        ]
        .into_iter()
        .cycle()
        .take(30)
        .map(|target| {
            let cell = cell.clone();
            std::thread::spawn(move || cell.finish(target).is_ok())
        })
        .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert!(cell.get().is_terminal());
    }

    #[test]
    fn test_clones_share_the_cell() {
        let cell = StateCell::new();
        let other = cell.clone();
        other.finish(SessionState::Errored).unwrap();
        assert_eq!(cell.get(), SessionState::Errored);
        assert!(cell.ptr_eq(&other));
        assert!(!cell.ptr_eq(&StateCell::new()));
    }

    #[test]
    fn test_answer_reads_trimmed() {
        let mut session = session();
        session.append_answer("  Hello");
        session.append_answer(" world \n");
        assert_eq!(session.answer(), "Hello world");
    }

    #[test]
    fn test_final_answer_overwrites() {
        let mut session = session();
        session.append_answer("Hello wor");
        session.set_final_answer("Hello world.".to_string());
        assert_eq!(session.answer(), "Hello world.");
        assert!(session.has_final_answer());
    }

    #[test]
    fn test_summary_carries_state_and_text() {
        let mut session = session();
        session.append_thought("because");
        session.append_answer(" yes ");
        session.state_cell().finish(SessionState::Completed).unwrap();

        let summary = session.into_summary(None);
        assert_eq!(summary.ids, GenerationIds::new("c", "m"));
        assert_eq!(summary.state, SessionState::Completed);
        assert_eq!(summary.answer, "yes");
        assert_eq!(summary.thought, "because");
        assert!(summary.error.is_none());
    }

    #[test]
    fn test_ids_display_and_serde() {
        let ids = GenerationIds::new("conv", "msg");
        assert_eq!(ids.to_string(), "conv/msg");
        assert_eq!(
            serde_json::to_value(&ids).unwrap(),
            serde_json::json!({"conversationId": "conv", "messageId": "msg"})
        );
    }
}
