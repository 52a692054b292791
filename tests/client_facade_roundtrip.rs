use futures_util::stream;
use hub_rpc::{HubBuilder, HubClient, HubOptions};
use hub_test_support::duplex_pair;

#[tokio::test]
async fn invoke_round_trips_through_the_real_client_and_server() {
    let (server_io, client_io) = duplex_pair(64 * 1024);
    let server = HubBuilder::new(HubOptions::default())
        .register_unary::<(i64, i64), i64, _, _>("Add", |(a, b)| async move { Ok(a + b) })
        .build();

    let accept = tokio::spawn(async move { server.accept(server_io, "conn-real").await });
    let client = HubClient::connect(client_io, hub_rpc::Dispatcher::new(false), HubOptions::default())
        .await
        .unwrap();
    let _server_side = accept.await.unwrap().unwrap();

    let sum: i64 = client.invoke("Add", (2i64, 40i64)).await.unwrap();
    assert_eq!(sum, 42);
}

#[tokio::test]
async fn pull_stream_drains_every_item_from_a_real_server_stream() {
    let (server_io, client_io) = duplex_pair(64 * 1024);
    let server = HubBuilder::new(HubOptions::default())
        .register_server_stream::<(u32,), u32, _, _, _>("Count", |(n,)| async move { Ok(stream::iter(0..n)) })
        .build();

    let accept = tokio::spawn(async move { server.accept(server_io, "conn-pull").await });
    let client = HubClient::connect(client_io, hub_rpc::Dispatcher::new(false), HubOptions::default())
        .await
        .unwrap();
    let _server_side = accept.await.unwrap().unwrap();

    let mut items = client.pull_stream::<_, u32>("Count", (5u32,)).await.unwrap();
    let mut collected = Vec::new();
    while let Some(value) = items.recv().await {
        collected.push(value);
    }
    assert_eq!(collected, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn push_streams_uploads_every_item_to_a_real_client_stream_handler() {
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    let total = Arc::new(AtomicI64::new(0));
    let handler_total = Arc::clone(&total);

    let (server_io, client_io) = duplex_pair(64 * 1024);
    let server = HubBuilder::new(HubOptions::default())
        .register_client_stream::<(), i64, _, _>("Sum", move |(), mut source| {
            let handler_total = Arc::clone(&handler_total);
            async move {
                while let Some(value) = source.recv().await {
                    handler_total.fetch_add(value, Ordering::SeqCst);
                }
            }
        })
        .build();

    let accept = tokio::spawn(async move { server.accept(server_io, "conn-push").await });
    let client = HubClient::connect(client_io, hub_rpc::Dispatcher::new(false), HubOptions::default())
        .await
        .unwrap();
    let _server_side = accept.await.unwrap().unwrap();

    client
        .push_streams("Sum", (), stream::iter(vec![1i64, 2, 3, 4]))
        .await
        .unwrap();

    for _ in 0..50 {
        if total.load(Ordering::SeqCst) == 10 {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("upload never completed, saw {}", total.load(Ordering::SeqCst));
}
