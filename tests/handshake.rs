use hub_rpc::{HubBuilder, HubOptions};
use hub_test_support::{duplex_pair, RawPeer};

#[tokio::test]
async fn mismatched_protocol_name_is_rejected() {
    let (server_io, client_io) = duplex_pair(64 * 1024);
    let server = HubBuilder::new(HubOptions::default()).build();
    let accept = tokio::spawn(async move { server.accept(server_io, "conn-bad-handshake").await });

    let mut peer = RawPeer::new(client_io);
    peer.send_handshake("messagepack", hub_protocol::HandshakeRequest::VERSION)
        .await
        .unwrap();
    let response = peer.recv_handshake_response().await.unwrap();
    assert_eq!(response.error.unwrap(), "Protocol \"messagepack\" not supported");

    assert!(accept.await.unwrap().is_err());
}

#[tokio::test]
async fn mismatched_protocol_version_is_accepted_since_only_the_name_is_checked() {
    let (server_io, client_io) = duplex_pair(64 * 1024);
    let server = HubBuilder::new(HubOptions::default()).build();
    let accept = tokio::spawn(async move { server.accept(server_io, "conn-ignored-version").await });

    let mut peer = RawPeer::new(client_io);
    peer.send_handshake(hub_protocol::HandshakeRequest::PROTOCOL, 99).await.unwrap();
    let response = peer.recv_handshake_response().await.unwrap();
    assert!(response.error.is_none());

    assert!(accept.await.unwrap().is_ok());
}

#[tokio::test]
async fn matching_protocol_and_version_is_accepted() {
    let (server_io, client_io) = duplex_pair(64 * 1024);
    let server = HubBuilder::new(HubOptions::default()).build();
    let accept = tokio::spawn(async move { server.accept(server_io, "conn-good-handshake").await });

    let mut peer = RawPeer::new(client_io);
    peer.send_handshake(
        hub_protocol::HandshakeRequest::PROTOCOL,
        hub_protocol::HandshakeRequest::VERSION,
    )
    .await
    .unwrap();
    let response = peer.recv_handshake_response().await.unwrap();
    assert!(response.error.is_none());

    assert!(accept.await.unwrap().is_ok());
}
