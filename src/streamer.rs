//! Tracks streams this side is *producing*: a server-streaming handler's
//! output, or a `push_streams` upload. Each stream runs as its own task so a
//! slow or infinite producer never blocks the message loop; `Stop` requests
//! ask that task to unwind early via a `CancellationToken` (§4.6).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures_util::{Stream, StreamExt};
use hub_protocol::HubMessage;
use serde_json::value::RawValue;
use tokio_util::sync::CancellationToken;

use crate::connection::HubConnection;

pub type BoxedItemStream = std::pin::Pin<Box<dyn Stream<Item = Box<RawValue>> + Send>>;

pub struct Streamer {
    connection: Arc<HubConnection>,
    cancels: Mutex<HashMap<String, CancellationToken>>,
}

impl Streamer {
    pub fn new(connection: Arc<HubConnection>) -> Self {
        Self {
            connection,
            cancels: Mutex::new(HashMap::new()),
        }
    }

    /// Spawns a task driving `source` to completion (or early cancellation),
    /// emitting one StreamItem per element and a final Completion.
    pub fn start(self: &Arc<Self>, invocation_id: String, source: BoxedItemStream) {
        let cancel = CancellationToken::new();
        self.cancels.lock().unwrap().insert(invocation_id.clone(), cancel.clone());

        let streamer = Arc::clone(self);
        tokio::spawn(async move {
            streamer.drive(invocation_id, source, cancel).await;
        });
    }

    async fn drive(&self, invocation_id: String, mut source: BoxedItemStream, cancel: CancellationToken) {
        let outcome = loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break Err("stream canceled".to_owned()),
                item = source.next() => match item {
                    Some(value) => {
                        if self.connection.send(HubMessage::StreamItem {
                            invocation_id: invocation_id.clone(),
                            item: value,
                        }).await.is_err() {
                            break Err("transport error while streaming".to_owned());
                        }
                    }
                    None => break Ok(()),
                },
            }
        };
        self.cancels.lock().unwrap().remove(&invocation_id);
        let (result, error) = match outcome {
            Ok(()) => (None, None),
            Err(message) => (None, Some(message)),
        };
        let _ = self
            .connection
            .send(HubMessage::Completion {
                invocation_id,
                result,
                error,
            })
            .await;
    }

    pub fn stop(&self, invocation_id: &str) {
        if let Some(cancel) = self.cancels.lock().unwrap().remove(invocation_id) {
            cancel.cancel();
        }
    }

    pub fn stop_all(&self) {
        for (_, cancel) in self.cancels.lock().unwrap().drain() {
            cancel.cancel();
        }
    }
}
