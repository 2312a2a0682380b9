//! HTTP handlers for relaying generations.

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use streamrelay_core::{
    ndjson_stream, GenerationIds, OutboundRecord, RelayHandle, SessionState, StartRequest,
    NDJSON_CONTENT_TYPE,
};

use crate::error::{relay_status, ServerError, ServerResult};
use crate::state::AppState;

/// Request body for the generation endpoint.
///
/// A `message` without a `messageId` starts a new generation, optionally in
/// an existing conversation. A `conversationId` with a `messageId` attaches
/// to a generation that is already running upstream.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub options: RunOptions,
}

/// Options for a relay run.
#[derive(Debug, Deserialize)]
pub struct RunOptions {
    /// Stream NDJSON records (default: true); otherwise reply once with the result.
    #[serde(default = "default_true")]
    pub stream: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { stream: true }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, PartialEq)]
enum Target {
    Start(StartRequest),
    Attach(GenerationIds),
}

impl GenerationRequest {
    fn target(self) -> ServerResult<Target> {
        match (self.message, self.conversation_id, self.message_id) {
            (_, Some(conversation_id), Some(message_id)) => Ok(Target::Attach(
                GenerationIds::new(conversation_id, message_id),
            )),
            (Some(message), conversation_id, None) => {
                let mut request = StartRequest::new(message);
                if let Some(conversation_id) = conversation_id {
                    request = request.in_conversation(conversation_id);
                }
                if let Some(agent_id) = self.agent_id {
                    request = request.agent(agent_id);
                }
                Ok(Target::Start(request))
            }
            (_, None, Some(_)) => Err(ServerError::InvalidRequest(
                "messageId requires conversationId".to_string(),
            )),
            (None, _, None) => Err(ServerError::InvalidRequest(
                "either message or conversationId and messageId is required".to_string(),
            )),
        }
    }
}

/// Start or attach to a generation and relay it.
pub async fn generation_handler(
    State(state): State<AppState>,
    Json(request): Json<GenerationRequest>,
) -> ServerResult<Response> {
    let stream = request.options.stream;

    let relay = match request.target()? {
        Target::Start(start) => state.manager.start(start).await?,
        Target::Attach(ids) => {
            tracing::info!(%ids, "attaching to generation");
            state.manager.attach(ids)?
        }
    };

    if stream {
        Ok(stream_response(relay))
    } else {
        complete_response(relay).await
    }
}

fn stream_response(relay: RelayHandle) -> Response {
    // Dropping the body drops the receiver, which the relay treats as a
    // client disconnect.
    let (_cancel, records, _join) = relay.into_parts();

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)],
        Body::from_stream(ndjson_stream(records)),
    )
        .into_response()
}

async fn complete_response(relay: RelayHandle) -> ServerResult<Response> {
    let summary = relay
        .finish()
        .await
        .map_err(|e| ServerError::Internal(format!("relay task failed: {}", e)))?;

    if summary.state == SessionState::Errored {
        if let Some(error) = summary.error.as_ref() {
            if let Some(record) = OutboundRecord::from_error(error) {
                return Ok((relay_status(error), Json(record)).into_response());
            }
        }
        return Err(ServerError::Internal(
            "relay ended without a reportable error".to_string(),
        ));
    }

    Ok(Json(OutboundRecord::result(&summary)).into_response())
}

/// Request body for the cancel endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub conversation_id: String,
    /// Empty cancels every relayed generation in the conversation.
    #[serde(default)]
    pub message_ids: Vec<String>,
}

/// Cancel relayed generations.
///
/// Unknown ids are ignored; the reply is always `{"success": true}` for a
/// well-formed request.
pub async fn cancel_handler(
    State(state): State<AppState>,
    Json(request): Json<CancelRequest>,
) -> ServerResult<Json<Value>> {
    if request.conversation_id.is_empty() {
        return Err(ServerError::InvalidRequest(
            "conversationId must not be empty".to_string(),
        ));
    }

    let cancelled = state
        .manager
        .cancel_conversation(&request.conversation_id, &request.message_ids)
        .await;
    tracing::info!(
        conversation_id = %request.conversation_id,
        cancelled,
        "cancel requested"
    );

    Ok(Json(json!({ "success": true })))
}

pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "activeSessions": state.manager.active_sessions(),
    }))
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
