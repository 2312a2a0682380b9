//! Tests for request parsing and target selection.

use super::*;

fn parse(json: &str) -> GenerationRequest {
    serde_json::from_str(json).unwrap()
}

#[test]
fn test_generation_request_all_fields() {
    let request = parse(
        r#"{
            "message": "Hello",
            "conversationId": "conv-1",
            "agentId": "helper",
            "options": {"stream": false}
        }"#,
    );

    assert_eq!(request.message.as_deref(), Some("Hello"));
    assert_eq!(request.conversation_id.as_deref(), Some("conv-1"));
    assert!(request.message_id.is_none());
    assert_eq!(request.agent_id.as_deref(), Some("helper"));
    assert!(!request.options.stream);
}

#[test]
fn test_stream_defaults_to_true() {
    assert!(parse(r#"{"message": "Hi"}"#).options.stream);
    assert!(parse(r#"{"message": "Hi", "options": {}}"#).options.stream);
}

#[test]
fn test_message_starts_new_conversation() {
    let target = parse(r#"{"message": "Hi"}"#).target().unwrap();
    assert_eq!(target, Target::Start(StartRequest::new("Hi")));
}

#[test]
fn test_message_in_existing_conversation() {
    let target = parse(r#"{"message": "Hi", "conversationId": "c", "agentId": "a"}"#)
        .target()
        .unwrap();
    assert_eq!(
        target,
        Target::Start(StartRequest::new("Hi").in_conversation("c").agent("a"))
    );
}

#[test]
fn test_ids_attach() {
    let target = parse(r#"{"conversationId": "c", "messageId": "m"}"#)
        .target()
        .unwrap();
    assert_eq!(target, Target::Attach(GenerationIds::new("c", "m")));
}

#[test]
fn test_message_id_takes_precedence_over_message() {
    let target = parse(r#"{"message": "Hi", "conversationId": "c", "messageId": "m"}"#)
        .target()
        .unwrap();
    assert_eq!(target, Target::Attach(GenerationIds::new("c", "m")));
}

#[test]
fn test_message_id_without_conversation_rejected() {
    let err = parse(r#"{"message": "Hi", "messageId": "m"}"#)
        .target()
        .unwrap_err();
    assert!(matches!(err, ServerError::InvalidRequest(_)));
}

#[test]
fn test_empty_request_rejected() {
    assert!(matches!(
        parse("{}").target(),
        Err(ServerError::InvalidRequest(_))
    ));
    assert!(matches!(
        parse(r#"{"conversationId": "c"}"#).target(),
        Err(ServerError::InvalidRequest(_))
    ));
}

#[test]
fn test_cancel_request_defaults() {
    let request: CancelRequest = serde_json::from_str(r#"{"conversationId": "c"}"#).unwrap();
    assert_eq!(request.conversation_id, "c");
    assert!(request.message_ids.is_empty());
}

#[test]
fn test_cancel_request_requires_conversation() {
    assert!(serde_json::from_str::<CancelRequest>(r#"{"messageIds": ["m"]}"#).is_err());
}
