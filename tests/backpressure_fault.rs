use std::time::Duration;

use hub_protocol::{HandshakeRequest, HubMessage};
use hub_rpc::stream_client::StreamSource;
use hub_rpc::{HubBuilder, HubOptions};
use hub_test_support::{duplex_pair, RawPeer};

/// With a buffer of 1 and a short `chanReceiveTimeout`, a handler that never
/// reads its `StreamSource` must force the upload to fault with a
/// Completion-with-error rather than blocking the connection forever.
#[tokio::test]
async fn slow_consumer_faults_the_upload_instead_of_hanging() {
    let options = HubOptions::default()
        .with_stream_buffer_capacity(1)
        .with_chan_receive_timeout(Duration::from_millis(50));

    let (server_io, client_io) = duplex_pair(64 * 1024);
    let server = HubBuilder::new(options)
        .register_client_stream::<(), i64, _, _>("Sink", |(), _source: StreamSource<i64>| async move {
            // Never calls `recv`: the sink fills up and stays full.
            std::future::pending::<()>().await;
        })
        .build();

    let accept = tokio::spawn(async move { server.accept(server_io, "conn-backpressure").await });

    let mut peer = RawPeer::new(client_io);
    peer.send_handshake(HandshakeRequest::PROTOCOL, HandshakeRequest::VERSION)
        .await
        .unwrap();
    peer.recv_handshake_response().await.unwrap();
    let _client = accept.await.unwrap().unwrap();

    peer.send_message(&HubMessage::Invocation {
        invocation_id: Some("0".into()),
        target: "Sink".into(),
        arguments: vec![],
        stream_ids: vec!["s0".into()],
    })
    .await
    .unwrap();

    // First item fills the capacity-1 buffer; the second has nowhere to go
    // and must time out.
    for value in [1i64, 2] {
        peer.send_message(&HubMessage::StreamItem {
            invocation_id: "s0".into(),
            item: serde_json::value::to_raw_value(&value).unwrap(),
        })
        .await
        .unwrap();
    }

    match peer.recv_message().await.unwrap() {
        HubMessage::Completion {
            invocation_id,
            result,
            error,
        } => {
            assert_eq!(invocation_id, "s0");
            assert!(result.is_none());
            assert_eq!(error.unwrap(), "chanReceiveTimeout elapsed waiting for the consumer");
        }
        other => panic!("unexpected message: {other}"),
    }
}
