use std::time::Duration;

use hub_protocol::{HandshakeRequest, HubMessage};
use hub_rpc::{HubBuilder, HubOptions};
use hub_test_support::{duplex_pair, RawPeer};

#[tokio::test(start_paused = true)]
async fn silence_past_keep_alive_interval_triggers_a_ping() {
    let options = HubOptions::default()
        .with_keep_alive_interval(Duration::from_secs(2))
        .with_timeout_interval(Duration::from_secs(10));

    let (server_io, client_io) = duplex_pair(64 * 1024);
    let server = HubBuilder::new(options).build();
    let accept = tokio::spawn(async move { server.accept(server_io, "conn-keepalive").await });

    let mut peer = RawPeer::new(client_io);
    peer.send_handshake(HandshakeRequest::PROTOCOL, HandshakeRequest::VERSION)
        .await
        .unwrap();
    peer.recv_handshake_response().await.unwrap();
    let _client = accept.await.unwrap().unwrap();

    tokio::time::advance(Duration::from_secs(3)).await;

    match peer.recv_message().await.unwrap() {
        HubMessage::Ping => {}
        other => panic!("expected a Ping, got {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn silence_past_timeout_interval_closes_the_connection() {
    let options = HubOptions::default()
        .with_keep_alive_interval(Duration::from_millis(100))
        .with_timeout_interval(Duration::from_secs(5));

    let (server_io, client_io) = duplex_pair(64 * 1024);
    let server = HubBuilder::new(options).build();
    let accept = tokio::spawn(async move { server.accept(server_io, "conn-timeout").await });

    let mut peer = RawPeer::new(client_io);
    peer.send_handshake(HandshakeRequest::PROTOCOL, HandshakeRequest::VERSION)
        .await
        .unwrap();
    peer.recv_handshake_response().await.unwrap();
    let _client = accept.await.unwrap().unwrap();

    // Drain the keep-alive Pings the server sends while we stay silent.
    tokio::time::advance(Duration::from_secs(6)).await;
    loop {
        match peer.recv_message().await.unwrap() {
            HubMessage::Ping => continue,
            HubMessage::Close { allow_reconnect, .. } => {
                assert!(!allow_reconnect);
                break;
            }
            other => panic!("unexpected message: {other}"),
        }
    }
}
