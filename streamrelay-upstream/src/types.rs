//! Request and response types for the conversations API

use serde::{Deserialize, Serialize};

/// Identifiers of one generation, as issued by the service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub conversation_id: String,
    pub message_id: String,
}

/// Parameters for posting a user message, which starts a generation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageParams {
    /// User message content
    pub message: String,

    /// Agent to answer the message; the service default when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    /// Existing conversation to post into; a new one is created when absent
    #[serde(skip)]
    pub conversation_id: Option<String>,
}

impl CreateMessageParams {
    /// Create params for a message in a new conversation
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            agent_id: None,
            conversation_id: None,
        }
    }

    /// Address the message to a specific agent
    pub fn agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Post into an existing conversation
    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }
}

/// Body of a cancellation request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CancelParams<'a> {
    pub message_ids: &'a [String],
}

/// Response to a cancellation request
#[derive(Debug, Clone, Deserialize)]
pub struct CancelResponse {
    pub success: bool,
}

/// Lifecycle status of an agent message as reported by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Created,
    Succeeded,
    Failed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

/// Final (or current) state of an agent message
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageState {
    pub status: MessageStatus,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub chain_of_thought: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageStateResponse {
    pub message: MessageState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_params_skip_conversation_id() {
        let params = CreateMessageParams::new("Hi")
            .agent("helper")
            .in_conversation("c-1");
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json, serde_json::json!({"message": "Hi", "agentId": "helper"}));
        assert_eq!(params.conversation_id.as_deref(), Some("c-1"));
    }

    #[test]
    fn test_message_ref_camel_case() {
        let ids: MessageRef =
            serde_json::from_str(r#"{"conversationId":"c","messageId":"m"}"#).unwrap();
        assert_eq!(ids.conversation_id, "c");
        assert_eq!(ids.message_id, "m");
    }

    #[test]
    fn test_message_state_unknown_status() {
        let state: MessageState =
            serde_json::from_str(r#"{"status":"paused","content":null}"#).unwrap();
        assert_eq!(state.status, MessageStatus::Unknown);
        assert!(state.content.is_none());
        assert!(state.chain_of_thought.is_none());
    }
}
