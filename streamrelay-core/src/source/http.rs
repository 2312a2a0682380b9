//! Generation source backed by the upstream HTTP service

use futures::StreamExt;
use streamrelay_upstream::TokenClassification as WireClassification;
use streamrelay_upstream::{
    ConversationEvent, CreateMessageParams, MessageRef, MessageStatus, UpstreamClient,
    UpstreamError,
};

use super::{EventStream, FinalState, FinalStatus, GenerationSource, SourceError, StartRequest};
use crate::events::{TokenClassification, UpstreamEvent};
use crate::session::GenerationIds;

// ===== Error Classification =====

fn classify_upstream_error(err: &UpstreamError) -> SourceError {
    match err {
        UpstreamError::Authentication(msg) => SourceError::Authentication(msg.clone()),
        UpstreamError::RateLimited(msg) => SourceError::RateLimited(msg.clone()),
        UpstreamError::ServiceUnavailable(msg) => SourceError::ServiceUnavailable(msg.clone()),
        UpstreamError::InvalidRequest(msg) => SourceError::InvalidRequest(msg.clone()),
        UpstreamError::NotFound(msg) => SourceError::NotFound(msg.clone()),
        UpstreamError::InvalidResponse(msg) => {
            SourceError::Other(format!("Invalid response: {}", msg))
        }
        UpstreamError::Network(msg) => SourceError::Network(msg.clone()),
        UpstreamError::Json(e) => SourceError::Other(format!("JSON error: {}", e)),
        UpstreamError::Stream(msg) => SourceError::Stream(msg.clone()),
        UpstreamError::Configuration(msg) => SourceError::Configuration(msg.clone()),
        UpstreamError::Other(msg) => SourceError::Other(msg.clone()),
    }
}

// ===== Conversion =====

fn to_message_ref(ids: &GenerationIds) -> MessageRef {
    MessageRef {
        conversation_id: ids.conversation_id.clone(),
        message_id: ids.message_id.clone(),
    }
}

impl From<ConversationEvent> for UpstreamEvent {
    fn from(event: ConversationEvent) -> Self {
        match event {
            ConversationEvent::UserMessageError { error } => UpstreamEvent::UserMessageError {
                code: error.code,
                message: error.message,
            },
            ConversationEvent::AgentError { error } => UpstreamEvent::AgentError {
                code: error.code,
                message: error.message,
            },
            ConversationEvent::AgentActionSuccess { .. } => UpstreamEvent::AgentActionSuccess,
            ConversationEvent::GenerationTokens {
                classification,
                text,
            } => UpstreamEvent::GenerationTokens {
                classification: match classification {
                    WireClassification::Tokens => TokenClassification::Tokens,
                    WireClassification::ChainOfThought => TokenClassification::ChainOfThought,
                    WireClassification::Other => TokenClassification::Other,
                },
                text,
            },
            ConversationEvent::AgentMessageSuccess { message } => {
                UpstreamEvent::AgentMessageSuccess {
                    final_text: message.content,
                }
            }
            ConversationEvent::AgentMessageError { error } => UpstreamEvent::AgentMessageError {
                code: error.code,
                message: error.message,
            },
            ConversationEvent::Unrecognized { kind } => UpstreamEvent::Unrecognized { kind },
        }
    }
}

fn to_final_status(status: MessageStatus) -> FinalStatus {
    match status {
        MessageStatus::Created => FinalStatus::Pending,
        MessageStatus::Succeeded => FinalStatus::Succeeded,
        MessageStatus::Failed => FinalStatus::Failed,
        MessageStatus::Cancelled => FinalStatus::Cancelled,
        MessageStatus::Unknown => FinalStatus::Unknown,
    }
}

// ===== HttpSource =====

/// Generation source talking to the upstream service over HTTP
///
/// ```ignore
/// use streamrelay_core::{HttpSource, RelayConfig, RelayManager};
///
/// let source = HttpSource::from_env()?;
/// let manager = RelayManager::new(source, RelayConfig::default());
/// ```
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: UpstreamClient,
}

impl HttpSource {
    pub fn new(client: UpstreamClient) -> Self {
        Self { client }
    }

    /// Build a client from `STREAMRELAY_API_KEY` and `STREAMRELAY_UPSTREAM_URL`
    pub fn from_env() -> Result<Self, SourceError> {
        let client = UpstreamClient::from_env().map_err(|e| classify_upstream_error(&e))?;
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &UpstreamClient {
        &self.client
    }
}

#[async_trait::async_trait]
impl GenerationSource for HttpSource {
    async fn start(&self, request: StartRequest) -> Result<GenerationIds, SourceError> {
        let mut params = CreateMessageParams::new(request.message);
        if let Some(agent_id) = request.agent_id {
            params = params.agent(agent_id);
        }
        if let Some(conversation_id) = request.conversation_id {
            params = params.in_conversation(conversation_id);
        }

        let created = self
            .client
            .conversations()
            .create_message(params)
            .await
            .map_err(|e| classify_upstream_error(&e))?;

        Ok(GenerationIds::new(created.conversation_id, created.message_id))
    }

    async fn subscribe(&self, ids: &GenerationIds) -> Result<EventStream, SourceError> {
        let events = self
            .client
            .conversations()
            .events(&to_message_ref(ids))
            .map_err(|e| classify_upstream_error(&e))?;

        Ok(events
            .map(|item| {
                item.map(UpstreamEvent::from)
                    .map_err(|e| classify_upstream_error(&e))
            })
            .boxed())
    }

    async fn cancel(
        &self,
        conversation_id: &str,
        message_ids: &[String],
    ) -> Result<(), SourceError> {
        let response = self
            .client
            .conversations()
            .cancel(conversation_id, message_ids)
            .await
            .map_err(|e| classify_upstream_error(&e))?;

        if response.success {
            Ok(())
        } else {
            Err(SourceError::Other(
                "upstream refused the cancellation".to_string(),
            ))
        }
    }

    async fn final_state(&self, ids: &GenerationIds) -> Result<FinalState, SourceError> {
        let state = self
            .client
            .conversations()
            .get_message(&to_message_ref(ids))
            .await
            .map_err(|e| classify_upstream_error(&e))?;

        Ok(FinalState {
            status: to_final_status(state.status),
            answer: state.content,
            thought: state.chain_of_thought,
        })
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
