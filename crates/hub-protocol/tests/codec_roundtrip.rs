use hub_protocol::message::HubMessage;
use serde_json::value::RawValue;

fn raw(json: &str) -> Box<RawValue> {
    RawValue::from_string(json.to_owned()).unwrap()
}

fn assert_roundtrips(msg: HubMessage) {
    let encoded = msg.encode().unwrap();
    let decoded = HubMessage::decode(&encoded).unwrap();
    assert_eq!(format!("{msg}"), format!("{decoded}"));
}

#[test]
fn invocation_roundtrips() {
    assert_roundtrips(HubMessage::Invocation {
        invocation_id: Some("0".to_owned()),
        target: "echo".to_owned(),
        arguments: vec![raw("\"hi\"")],
        stream_ids: vec![],
    });
}

#[test]
fn stream_invocation_with_stream_ids_roundtrips() {
    assert_roundtrips(HubMessage::StreamInvocation {
        invocation_id: Some("7".to_owned()),
        target: "upload".to_owned(),
        arguments: vec![],
        stream_ids: vec!["s1".to_owned()],
    });
}

#[test]
fn completion_with_result_roundtrips() {
    assert_roundtrips(HubMessage::Completion {
        invocation_id: "0".to_owned(),
        result: Some(raw("\"hi\"")),
        error: None,
    });
}

#[test]
fn completion_with_error_roundtrips() {
    assert_roundtrips(HubMessage::Completion {
        invocation_id: "0".to_owned(),
        result: None,
        error: Some("Unknown method nope".to_owned()),
    });
}

#[test]
fn ping_roundtrips() {
    assert_roundtrips(HubMessage::Ping);
}

#[test]
fn close_roundtrips() {
    assert_roundtrips(HubMessage::Close {
        error: Some("client timeout interval elapsed".to_owned()),
        allow_reconnect: false,
    });
}

#[test]
fn completion_with_both_result_and_error_is_rejected() {
    let bytes = br#"{"type":3,"invocationId":"0","result":1,"error":"boom"}"#;
    let err = HubMessage::decode(bytes).unwrap_err();
    assert!(matches!(
        err,
        hub_protocol::MessageError::CompletionHasBothResultAndError
    ));
}

#[test]
fn unknown_type_is_rejected() {
    let bytes = br#"{"type":99}"#;
    let err = HubMessage::decode(bytes).unwrap_err();
    assert!(matches!(err, hub_protocol::MessageError::UnknownType(99)));
}

#[test]
fn missing_type_is_rejected() {
    let bytes = br#"{"invocationId":"0"}"#;
    let err = HubMessage::decode(bytes).unwrap_err();
    assert!(matches!(err, hub_protocol::MessageError::MissingType));
}

#[test]
fn unknown_fields_are_ignored() {
    let bytes = br#"{"type":6,"somethingFromTheFuture":true}"#;
    let msg = HubMessage::decode(bytes).unwrap();
    assert!(matches!(msg, HubMessage::Ping));
}
