//! Inbound events consumed by the relay

/// What a generated text delta belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClassification {
    /// Answer text
    Tokens,
    /// Visible reasoning text
    ChainOfThought,
    /// Delimiters and anything else the relay does not forward
    Other,
}

/// One event from an upstream generation
///
/// Malformed and null payloads never become an `UpstreamEvent`; the
/// [`GenerationSource`](crate::GenerationSource) skips them.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    /// The user message was rejected
    UserMessageError { code: String, message: String },

    /// The agent failed
    AgentError { code: String, message: String },

    /// An agent action finished (informational)
    AgentActionSuccess,

    /// Incremental generated text
    GenerationTokens {
        classification: TokenClassification,
        text: String,
    },

    /// The agent message finished, with the authoritative final text when the
    /// service provides it
    AgentMessageSuccess { final_text: Option<String> },

    /// The agent message failed
    AgentMessageError { code: String, message: String },

    /// An event type this relay does not know
    Unrecognized { kind: String },
}

impl UpstreamEvent {
    /// Answer delta
    pub fn tokens(text: impl Into<String>) -> Self {
        UpstreamEvent::GenerationTokens {
            classification: TokenClassification::Tokens,
            text: text.into(),
        }
    }

    /// Reasoning delta
    pub fn thought(text: impl Into<String>) -> Self {
        UpstreamEvent::GenerationTokens {
            classification: TokenClassification::ChainOfThought,
            text: text.into(),
        }
    }

    /// Final answer
    pub fn success(final_text: impl Into<String>) -> Self {
        UpstreamEvent::AgentMessageSuccess {
            final_text: Some(final_text.into()),
        }
    }

    /// Short name used in logs
    pub fn kind(&self) -> &str {
        match self {
            UpstreamEvent::UserMessageError { .. } => "user_message_error",
            UpstreamEvent::AgentError { .. } => "agent_error",
            UpstreamEvent::AgentActionSuccess => "agent_action_success",
            UpstreamEvent::GenerationTokens { .. } => "generation_tokens",
            UpstreamEvent::AgentMessageSuccess { .. } => "agent_message_success",
            UpstreamEvent::AgentMessageError { .. } => "agent_message_error",
            UpstreamEvent::Unrecognized { kind } => kind,
        }
    }
}
