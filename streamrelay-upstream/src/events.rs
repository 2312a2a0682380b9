//! Conversation event types carried on the generation event stream
//!
//! Each SSE `data:` payload is a JSON object tagged by `type`. Payloads may
//! also arrive wrapped as `{"eventId": "...", "data": {...}}`.

use serde::Deserialize;
use serde_json::Value;

use crate::error::UpstreamError;

/// Event types this client knows how to decode.
const KNOWN_EVENT_TYPES: &[&str] = &[
    "user_message_error",
    "agent_error",
    "agent_action_success",
    "generation_tokens",
    "agent_message_success",
    "agent_message_error",
];

/// One event from a generation's event stream
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    /// The user message was rejected
    UserMessageError { error: EventError },

    /// The agent failed outside of message generation
    AgentError { error: EventError },

    /// An agent action (tool call, retrieval, ...) finished
    AgentActionSuccess {
        #[serde(default)]
        action: Option<Value>,
    },

    /// Incremental generated text
    GenerationTokens {
        classification: TokenClassification,
        #[serde(default)]
        text: String,
    },

    /// The agent message finished; carries the authoritative final text
    AgentMessageSuccess { message: AgentMessage },

    /// The agent message failed
    AgentMessageError { error: EventError },

    /// Event type this client does not know
    #[serde(skip)]
    Unrecognized { kind: String },
}

/// Error payload of the error-tagged events
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventError {
    pub code: String,
    pub message: String,
}

/// What a `generation_tokens` delta belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenClassification {
    /// Answer text
    Tokens,
    /// Visible reasoning text
    ChainOfThought,
    /// Delimiters and other classifications
    #[serde(other)]
    Other,
}

/// Agent message carried by `agent_message_success`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMessage {
    #[serde(default)]
    pub s_id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl ConversationEvent {
    /// Parse one SSE data payload.
    ///
    /// Returns `Ok(None)` for empty and `null` payloads. Payloads whose `type`
    /// is unknown decode to [`ConversationEvent::Unrecognized`]. Payloads of a
    /// known type that fail to decode, or that carry no `type` at all, are
    /// errors.
    pub fn parse(data: &str) -> Result<Option<Self>, UpstreamError> {
        let data = data.trim();
        if data.is_empty() {
            return Ok(None);
        }

        let mut value: Value = serde_json::from_str(data)?;
        if value.get("type").is_none() {
            if let Some(inner) = value.get_mut("data").map(Value::take) {
                value = inner;
            }
        }
        if value.is_null() {
            return Ok(None);
        }

        let kind = match value.get("type").and_then(Value::as_str) {
            Some(kind) => kind.to_string(),
            None => {
                return Err(UpstreamError::Stream(format!(
                    "event without a type: {}",
                    data
                )))
            }
        };

        if !KNOWN_EVENT_TYPES.contains(&kind.as_str()) {
            return Ok(Some(ConversationEvent::Unrecognized { kind }));
        }

        Ok(Some(serde_json::from_value(value)?))
    }

    /// The wire `type` of this event
    pub fn kind(&self) -> &str {
        match self {
            ConversationEvent::UserMessageError { .. } => "user_message_error",
            ConversationEvent::AgentError { .. } => "agent_error",
            ConversationEvent::AgentActionSuccess { .. } => "agent_action_success",
            ConversationEvent::GenerationTokens { .. } => "generation_tokens",
            ConversationEvent::AgentMessageSuccess { .. } => "agent_message_success",
            ConversationEvent::AgentMessageError { .. } => "agent_message_error",
            ConversationEvent::Unrecognized { kind } => kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_generation_tokens() {
        let event = ConversationEvent::parse(
            r#"{"type":"generation_tokens","classification":"tokens","text":"Hel"}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            event,
            ConversationEvent::GenerationTokens {
                classification: TokenClassification::Tokens,
                text: "Hel".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_chain_of_thought_and_other_classification() {
        let cot = ConversationEvent::parse(
            r#"{"type":"generation_tokens","classification":"chain_of_thought","text":"hmm"}"#,
        )
        .unwrap()
        .unwrap();
        assert!(matches!(
            cot,
            ConversationEvent::GenerationTokens {
                classification: TokenClassification::ChainOfThought,
                ..
            }
        ));

        let delimiter = ConversationEvent::parse(
            r#"{"type":"generation_tokens","classification":"opening_delimiter","text":"<"}"#,
        )
        .unwrap()
        .unwrap();
        assert!(matches!(
            delimiter,
            ConversationEvent::GenerationTokens {
                classification: TokenClassification::Other,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_error_events_keep_code_and_message() {
        let event = ConversationEvent::parse(
            r#"{"type":"user_message_error","error":{"code":"invalid_mention","message":"No agent"}}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            event,
            ConversationEvent::UserMessageError {
                error: EventError {
                    code: "invalid_mention".to_string(),
                    message: "No agent".to_string(),
                }
            }
        );
    }

    #[test]
    fn test_parse_agent_message_success() {
        let event = ConversationEvent::parse(
            r#"{"type":"agent_message_success","message":{"sId":"m1","content":"Hi there!"}}"#,
        )
        .unwrap()
        .unwrap();
        match event {
            ConversationEvent::AgentMessageSuccess { message } => {
                assert_eq!(message.s_id.as_deref(), Some("m1"));
                assert_eq!(message.content.as_deref(), Some("Hi there!"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_wrapped_payload() {
        let event = ConversationEvent::parse(
            r#"{"eventId":"e-1","data":{"type":"agent_action_success","action":{"id":1}}}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(event.kind(), "agent_action_success");
    }

    #[test]
    fn test_parse_unknown_type_is_tolerated() {
        let event = ConversationEvent::parse(r#"{"type":"agent_message_new","foo":1}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            ConversationEvent::Unrecognized {
                kind: "agent_message_new".to_string()
            }
        );
        assert_eq!(event.kind(), "agent_message_new");
    }

    #[test]
    fn test_parse_null_and_empty_are_skipped() {
        assert!(ConversationEvent::parse("").unwrap().is_none());
        assert!(ConversationEvent::parse("  ").unwrap().is_none());
        assert!(ConversationEvent::parse("null").unwrap().is_none());
        assert!(ConversationEvent::parse(r#"{"eventId":"e","data":null}"#)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_parse_malformed_payloads_error() {
        assert!(ConversationEvent::parse("{not json").is_err());
        assert!(ConversationEvent::parse(r#"{"text":"no type"}"#).is_err());
        assert!(
            ConversationEvent::parse(r#"{"type":"agent_error","error":"flat string"}"#).is_err()
        );
    }
}
