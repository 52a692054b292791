use hub_protocol::{HandshakeRequest, HubMessage};
use hub_rpc::{HubBuilder, HubOptions};
use hub_test_support::{duplex_pair, RawPeer};
use serde_json::json;

#[tokio::test]
async fn echo_returns_completion_with_same_value() {
    let (server_io, client_io) = duplex_pair(64 * 1024);
    let server = HubBuilder::new(HubOptions::default())
        .register_unary::<(String,), String, _, _>("Echo", |(value,)| async move { Ok(value) })
        .build();

    let accept = tokio::spawn(async move { server.accept(server_io, "conn-echo").await });

    let mut peer = RawPeer::new(client_io);
    peer.send_handshake(HandshakeRequest::PROTOCOL, HandshakeRequest::VERSION)
        .await
        .unwrap();
    peer.recv_handshake_response().await.unwrap();
    let _client = accept.await.unwrap().unwrap();

    peer.send_message(&HubMessage::Invocation {
        invocation_id: Some("0".into()),
        target: "Echo".into(),
        arguments: vec![serde_json::value::to_raw_value(&json!("hello")).unwrap()],
        stream_ids: vec![],
    })
    .await
    .unwrap();

    match peer.recv_message().await.unwrap() {
        HubMessage::Completion {
            invocation_id,
            result,
            error,
        } => {
            assert_eq!(invocation_id, "0");
            assert_eq!(result.unwrap().get(), "\"hello\"");
            assert!(error.is_none());
        }
        other => panic!("unexpected message: {other}"),
    }
}

#[tokio::test]
async fn unregistered_method_name_is_resolved_case_insensitively() {
    let (server_io, client_io) = duplex_pair(64 * 1024);
    let server = HubBuilder::new(HubOptions::default())
        .register_unary::<(), String, _, _>("Ping", |()| async move { Ok("pong".to_owned()) })
        .build();

    let accept = tokio::spawn(async move { server.accept(server_io, "conn-case").await });

    let mut peer = RawPeer::new(client_io);
    peer.send_handshake(HandshakeRequest::PROTOCOL, HandshakeRequest::VERSION)
        .await
        .unwrap();
    peer.recv_handshake_response().await.unwrap();
    let _client = accept.await.unwrap().unwrap();

    peer.send_message(&HubMessage::Invocation {
        invocation_id: Some("0".into()),
        target: "pInG".into(),
        arguments: vec![],
        stream_ids: vec![],
    })
    .await
    .unwrap();

    match peer.recv_message().await.unwrap() {
        HubMessage::Completion { result, error, .. } => {
            assert_eq!(result.unwrap().get(), "\"pong\"");
            assert!(error.is_none());
        }
        other => panic!("unexpected message: {other}"),
    }
}

#[tokio::test]
async fn unknown_method_returns_completion_with_error() {
    let (server_io, client_io) = duplex_pair(64 * 1024);
    let server = HubBuilder::new(HubOptions::default()).build();

    let accept = tokio::spawn(async move { server.accept(server_io, "conn-unknown").await });

    let mut peer = RawPeer::new(client_io);
    peer.send_handshake(HandshakeRequest::PROTOCOL, HandshakeRequest::VERSION)
        .await
        .unwrap();
    peer.recv_handshake_response().await.unwrap();
    let _client = accept.await.unwrap().unwrap();

    peer.send_message(&HubMessage::Invocation {
        invocation_id: Some("0".into()),
        target: "Nope".into(),
        arguments: vec![],
        stream_ids: vec![],
    })
    .await
    .unwrap();

    match peer.recv_message().await.unwrap() {
        HubMessage::Completion {
            invocation_id,
            result,
            error,
        } => {
            assert_eq!(invocation_id, "0");
            assert!(result.is_none());
            assert_eq!(error.unwrap(), "Unknown method Nope");
        }
        other => panic!("unexpected message: {other}"),
    }
}

#[tokio::test]
async fn send_without_invocation_id_gets_no_completion() {
    let (server_io, client_io) = duplex_pair(64 * 1024);
    let server = HubBuilder::new(HubOptions::default())
        .register_unary::<(), (), _, _>("Noop", |()| async move { Ok(()) })
        .build();

    let accept = tokio::spawn(async move { server.accept(server_io, "conn-send").await });

    let mut peer = RawPeer::new(client_io);
    peer.send_handshake(HandshakeRequest::PROTOCOL, HandshakeRequest::VERSION)
        .await
        .unwrap();
    peer.recv_handshake_response().await.unwrap();
    let _client = accept.await.unwrap().unwrap();

    peer.send_message(&HubMessage::Invocation {
        invocation_id: None,
        target: "Noop".into(),
        arguments: vec![],
        stream_ids: vec![],
    })
    .await
    .unwrap();

    // Follow up with a real invocation; if a stray Completion had been sent
    // for the Send above, it would arrive first and this assertion would
    // see the wrong invocation id.
    peer.send_message(&HubMessage::Invocation {
        invocation_id: Some("1".into()),
        target: "Noop".into(),
        arguments: vec![],
        stream_ids: vec![],
    })
    .await
    .unwrap();

    match peer.recv_message().await.unwrap() {
        HubMessage::Completion { invocation_id, .. } => assert_eq!(invocation_id, "1"),
        other => panic!("unexpected message: {other}"),
    }
}
