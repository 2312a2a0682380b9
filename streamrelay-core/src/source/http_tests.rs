use super::*;
use crate::encode::OutboundRecord;
use crate::relay::RelayManager;
use crate::session::SessionState;
use crate::RelayConfig;
use streamrelay_upstream::{AgentMessage, EventError, RetryConfig};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn source(base: &str) -> HttpSource {
    let client = UpstreamClient::builder()
        .api_key("test-key")
        .api_base(base)
        .retry_config(RetryConfig::disabled())
        .build()
        .unwrap();
    HttpSource::new(client)
}

#[test]
fn test_error_classification() {
    assert_eq!(
        classify_upstream_error(&UpstreamError::Authentication("bad".into())),
        SourceError::Authentication("bad".into())
    );
    assert_eq!(
        classify_upstream_error(&UpstreamError::NotFound("gone".into())),
        SourceError::NotFound("gone".into())
    );
    assert_eq!(
        classify_upstream_error(&UpstreamError::InvalidResponse("eh".into())),
        SourceError::Other("Invalid response: eh".into())
    );
}

#[test]
fn test_event_conversion() {
    let event = UpstreamEvent::from(ConversationEvent::AgentError {
        error: EventError {
            code: "c".into(),
            message: "m".into(),
        },
    });
    assert_eq!(
        event,
        UpstreamEvent::AgentError {
            code: "c".into(),
            message: "m".into()
        }
    );

    let event = UpstreamEvent::from(ConversationEvent::AgentMessageSuccess {
        message: AgentMessage {
            s_id: None,
            content: None,
        },
    });
    assert_eq!(event, UpstreamEvent::AgentMessageSuccess { final_text: None });

    let event = UpstreamEvent::from(ConversationEvent::GenerationTokens {
        classification: WireClassification::Other,
        text: "<".into(),
    });
    assert!(matches!(
        event,
        UpstreamEvent::GenerationTokens {
            classification: TokenClassification::Other,
            ..
        }
    ));
}

#[tokio::test]
async fn test_start_maps_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/conversations/conv-7/messages"))
        .and(body_json(serde_json::json!({"message": "Hi", "agentId": "helper"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "conversationId": "conv-7",
            "messageId": "msg-3"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ids = source(&server.uri())
        .start(
            StartRequest::new("Hi")
                .in_conversation("conv-7")
                .agent("helper"),
        )
        .await
        .unwrap();

    assert_eq!(ids, GenerationIds::new("conv-7", "msg-3"));
}

#[tokio::test]
async fn test_cancel_refused_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/conversations/conv-1/cancel"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": false})))
        .mount(&server)
        .await;

    let result = source(&server.uri())
        .cancel("conv-1", &["msg-1".to_string()])
        .await;

    assert!(matches!(result, Err(SourceError::Other(_))));
}

#[tokio::test]
async fn test_final_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/conversations/conv-1/messages/msg-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "message": {"status": "created", "content": null}
        })))
        .mount(&server)
        .await;

    let state = source(&server.uri())
        .final_state(&GenerationIds::new("conv-1", "msg-1"))
        .await
        .unwrap();

    assert_eq!(state.status, FinalStatus::Pending);
    assert!(state.answer.is_none());
}

#[tokio::test]
async fn test_relay_over_http() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/conversations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "conversationId": "conv-1",
            "messageId": "msg-1"
        })))
        .mount(&server)
        .await;

    let body = [
        r#"{"type":"generation_tokens","classification":"chain_of_thought","text":"thinking"}"#,
        r#"{"type":"generation_tokens","classification":"tokens","text":"Hi"}"#,
        r#"{"type":"something_new"}"#,
        r#"{"type":"agent_message_success","message":{"content":"Hi there!"}}"#,
    ]
    .iter()
    .map(|payload| format!("data: {}\n\n", payload))
    .collect::<String>();

    Mock::given(method("GET"))
        .and(path("/v1/conversations/conv-1/messages/msg-1/events"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let manager = RelayManager::new(source(&server.uri()), RelayConfig::default());
    let (records, summary) = manager
        .start(StartRequest::new("Hello"))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();

    let kinds: Vec<&str> = records.iter().map(OutboundRecord::kind).collect();
    assert_eq!(kinds, vec!["ids", "chain_of_thought", "text", "success"]);
    assert_eq!(summary.state, SessionState::Completed);
    assert_eq!(summary.answer, "Hi there!");
    assert_eq!(summary.thought, "thinking");
}
