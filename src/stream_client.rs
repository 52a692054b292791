//! Tracks channels this side is *consuming* items into: a server stream
//! this side pulled, or a client stream this side is dispatching to a
//! handler. The same map and the same id-keyspace back both, because on the
//! wire a StreamItem/Completion only carries one id and doesn't say which
//! role its sender is playing (§4.5).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::value::RawValue;
use tokio::sync::mpsc;

use crate::error::StreamItemFault;
use crate::invoke_registry::InvokeRegistry;

type Validator = Arc<dyn Fn(&RawValue) -> Result<(), String> + Send + Sync>;

struct Upstream {
    tx: mpsc::Sender<Box<RawValue>>,
    validate: Validator,
}

pub struct StreamClient {
    buffer_capacity: usize,
    chan_receive_timeout: Duration,
    upstreams: Mutex<HashMap<String, Upstream>>,
}

impl StreamClient {
    pub fn new(buffer_capacity: usize, chan_receive_timeout: Duration) -> Self {
        Self {
            buffer_capacity,
            chan_receive_timeout,
            upstreams: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a new inbound item sink under `id`, typed by `T` so that
    /// items can be validated against their declared element type as they
    /// arrive (rather than deferring that check to whenever a consumer
    /// happens to read the channel).
    pub fn new_upstream<T: DeserializeOwned + Send + Sync + 'static>(
        &self,
        id: String,
    ) -> mpsc::Receiver<Box<RawValue>> {
        let (tx, rx) = mpsc::channel(self.buffer_capacity);
        let validate: Validator = Arc::new(|raw: &RawValue| {
            serde_json::from_str::<T>(raw.get())
                .map(|_| ())
                .map_err(|e| e.to_string())
        });
        self.upstreams.lock().unwrap().insert(id, Upstream { tx, validate });
        rx
    }

    pub fn handles_id(&self, id: &str) -> bool {
        self.upstreams.lock().unwrap().contains_key(id)
    }

    /// Validates and enqueues one item. `chanReceiveTimeout` bounds how long
    /// this will wait for a slow consumer before giving up on the stream
    /// entirely (a fault, not a fatal protocol violation); a deserialization
    /// mismatch against the declared element type *is* fatal to the whole
    /// connection (spec §4.5).
    pub async fn receive_stream_item(
        &self,
        invocation_id: &str,
        item: Box<RawValue>,
    ) -> Result<(), StreamItemFault> {
        let entry = {
            let upstreams = self.upstreams.lock().unwrap();
            upstreams.get(invocation_id).map(|u| (u.tx.clone(), u.validate.clone()))
        };
        let Some((tx, validate)) = entry else {
            return Ok(());
        };
        if let Err(message) = validate(&item) {
            self.delete_upstream(invocation_id);
            return Err(StreamItemFault::Fatal(message));
        }
        match tokio::time::timeout(self.chan_receive_timeout, tx.send(item)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => {
                // Consumer dropped its receiver: the stream is abandoned,
                // not a protocol fault.
                self.delete_upstream(invocation_id);
                Ok(())
            }
            Err(_) => {
                self.delete_upstream(invocation_id);
                Err(StreamItemFault::TimedOut)
            }
        }
    }

    pub fn delete_upstream(&self, id: &str) {
        self.upstreams.lock().unwrap().remove(id);
    }

    /// Closes the sink and forwards the terminal state to `invoke_registry`
    /// (a no-op there if `id` was never one of its own invocations -- true
    /// for client-stream uploads on the dispatch side).
    pub fn receive_completion(&self, invocation_id: &str, error: Option<String>, invoke_registry: &InvokeRegistry) {
        self.delete_upstream(invocation_id);
        invoke_registry.receive_completion(invocation_id, None, error);
    }

    pub fn abort_all(&self) {
        self.upstreams.lock().unwrap().clear();
    }
}

/// A typed, read-only view over one upstream channel, handed to a
/// client-streaming handler in place of the raw `Box<RawValue>` receiver.
pub struct StreamSource<T> {
    rx: mpsc::Receiver<Box<RawValue>>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: DeserializeOwned> StreamSource<T> {
    pub(crate) fn new(rx: mpsc::Receiver<Box<RawValue>>) -> Self {
        Self {
            rx,
            _marker: std::marker::PhantomData,
        }
    }

    /// Panics only if `StreamClient` enqueued something that failed its own
    /// validation, which `receive_stream_item` never does.
    pub async fn recv(&mut self) -> Option<T> {
        let raw = self.rx.recv().await?;
        Some(serde_json::from_str(raw.get()).expect("StreamClient validates before enqueueing"))
    }
}

impl<T: DeserializeOwned + Send + 'static> StreamSource<T> {
    pub fn into_stream(mut self) -> impl futures_util::Stream<Item = T> + Send {
        async_stream::stream! {
            while let Some(value) = self.recv().await {
                yield value;
            }
        }
    }
}
