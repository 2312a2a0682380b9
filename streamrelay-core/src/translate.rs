//! Inbound event translation
//!
//! [`translate`] applies one [`UpstreamEvent`] to a [`Session`] and tells the
//! relay what to do next. It never blocks and never touches the state cell:
//! deciding who ends a session is the relay's job.

use crate::encode::OutboundRecord;
use crate::error::RelayError;
use crate::events::{TokenClassification, UpstreamEvent};
use crate::session::Session;

/// What the relay should do after an event was applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Nothing to forward
    Skip,
    /// Write this record to the client
    Forward(OutboundRecord),
    /// End the session as `Errored`
    Terminate(RelayError),
}

/// Apply `event` to `session`
pub fn translate(session: &mut Session, event: UpstreamEvent) -> Step {
    if session.state().is_terminal() {
        tracing::debug!(
            event = event.kind(),
            state = %session.state(),
            "ignoring event for finished session"
        );
        return Step::Skip;
    }

    match event {
        UpstreamEvent::UserMessageError { code, message } => {
            Step::Terminate(RelayError::UserInput { code, message })
        }
        UpstreamEvent::AgentError { code, message }
        | UpstreamEvent::AgentMessageError { code, message } => {
            Step::Terminate(RelayError::Agent { code, message })
        }
        UpstreamEvent::AgentActionSuccess => Step::Skip,
        UpstreamEvent::GenerationTokens {
            classification,
            text,
        } => match classification {
            TokenClassification::Tokens if session.has_final_answer() => {
                tracing::debug!(len = text.len(), "dropping answer delta after final answer");
                Step::Skip
            }
            TokenClassification::Tokens => {
                session.append_answer(&text);
                Step::Forward(OutboundRecord::Text { text })
            }
            TokenClassification::ChainOfThought => {
                session.append_thought(&text);
                Step::Forward(OutboundRecord::ChainOfThought { text })
            }
            TokenClassification::Other => {
                tracing::debug!(len = text.len(), "skipping unclassified delta");
                Step::Skip
            }
        },
        UpstreamEvent::AgentMessageSuccess { final_text } => {
            match final_text {
                Some(text) => session.set_final_answer(text),
                None => tracing::debug!("final answer missing, keeping accumulated text"),
            }
            Step::Forward(OutboundRecord::Success {
                message: session.answer().to_string(),
            })
        }
        UpstreamEvent::Unrecognized { kind } => {
            tracing::info!(event = %kind, "skipping unrecognized event");
            Step::Skip
        }
    }
}

#[cfg(test)]
#[path = "translate_tests.rs"]
mod tests;
