//! The calling-side facade: `HubClient::invoke`/`send`/`pull_stream`/
//! `push_streams`, plus the monotonic id generator and the fail-fast check
//! against a loop that has already ended (`examples/original_source/client.go`'s
//! `isLoopEnded`/`GetNewID`).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::Stream;
use hub_protocol::HubMessage;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::value::RawValue;

use crate::config::HubOptions;
use crate::connection::HubConnection;
use crate::dispatcher::Dispatcher;
use crate::error::{ConnectError, InvokeError};
use crate::handshake::perform_client_handshake;
use crate::invoke_registry::{InvokeOutcome, InvokeRegistry};
use crate::loop_::HubLoop;
use crate::stream_client::{StreamClient, StreamSource};
use crate::streamer::{BoxedItemStream, Streamer};
use crate::transport::ByteTransport;

fn next_connection_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

fn encode_args<A: Serialize>(args: &A) -> Result<Vec<Box<RawValue>>, InvokeError> {
    match serde_json::to_value(args)? {
        serde_json::Value::Array(items) => items
            .iter()
            .map(|v| serde_json::value::to_raw_value(v).map_err(InvokeError::from))
            .collect(),
        serde_json::Value::Null => Ok(Vec::new()),
        other => Ok(vec![serde_json::value::to_raw_value(&other)?]),
    }
}

pub struct HubClient {
    connection: Arc<HubConnection>,
    invoke_registry: Arc<InvokeRegistry>,
    stream_client: Arc<StreamClient>,
    streamer: Arc<Streamer>,
    next_id: AtomicU64,
}

impl HubClient {
    /// Performs the handshake over `io`, then spawns the message loop and
    /// returns a handle to it. `dispatcher` is empty on a pure caller; pass
    /// one with registrations if the peer is also allowed to invoke back.
    pub async fn connect(
        mut io: impl ByteTransport,
        dispatcher: Dispatcher,
        options: HubOptions,
    ) -> Result<Self, ConnectError> {
        options.validate()?;
        perform_client_handshake(&mut io, options.handshake_timeout).await?;

        let connection_id = format!("client-{}", next_connection_id());
        let connection = Arc::new(HubConnection::new(io, connection_id, options.maximum_receive_message_size));
        let invoke_registry = Arc::new(InvokeRegistry::new());
        let stream_client = Arc::new(StreamClient::new(options.stream_buffer_capacity, options.chan_receive_timeout));
        let streamer = Arc::new(Streamer::new(Arc::clone(&connection)));
        let dispatcher = Arc::new(dispatcher);

        let hub_loop = HubLoop::new(
            Arc::clone(&connection),
            Arc::clone(&invoke_registry),
            Arc::clone(&stream_client),
            Arc::clone(&streamer),
            dispatcher,
            options,
        );
        tokio::spawn(hub_loop.run());

        Ok(Self {
            connection,
            invoke_registry,
            stream_client,
            streamer,
            next_id: AtomicU64::new(0),
        })
    }

    pub(crate) fn from_parts(
        connection: Arc<HubConnection>,
        invoke_registry: Arc<InvokeRegistry>,
        stream_client: Arc<StreamClient>,
        streamer: Arc<Streamer>,
    ) -> Self {
        Self {
            connection,
            invoke_registry,
            stream_client,
            streamer,
            next_id: AtomicU64::new(0),
        }
    }

    fn new_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    fn fail_fast(&self) -> Result<(), InvokeError> {
        if self.connection.is_closed() {
            Err(InvokeError::LoopEnded)
        } else {
            Ok(())
        }
    }

    pub async fn invoke<A, R>(&self, method: &str, args: A) -> Result<R, InvokeError>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        self.fail_fast()?;
        let id = self.new_id();
        let arguments = encode_args(&args)?;
        let rx = self.invoke_registry.new_invocation(id.clone());
        if let Err(err) = self
            .connection
            .send(HubMessage::Invocation {
                invocation_id: Some(id.clone()),
                target: method.to_owned(),
                arguments,
                stream_ids: Vec::new(),
            })
            .await
        {
            self.invoke_registry.delete_invocation(&id);
            return Err(InvokeError::Send(err));
        }
        match rx.await {
            Ok(InvokeOutcome::Result(raw)) => Ok(serde_json::from_str(raw.get())?),
            Ok(InvokeOutcome::Error(message)) => Err(InvokeError::Remote(message)),
            Ok(InvokeOutcome::Aborted(reason)) => Err(InvokeError::Aborted(reason)),
            Err(_) => Err(InvokeError::LoopEnded),
        }
    }

    /// Fire-and-forget: no invocation id is allocated, so the callee never
    /// sends (and we never wait for) a Completion.
    pub async fn send<A: Serialize>(&self, method: &str, args: A) -> Result<(), InvokeError> {
        self.fail_fast()?;
        let arguments = encode_args(&args)?;
        self.connection
            .send(HubMessage::Invocation {
                invocation_id: None,
                target: method.to_owned(),
                arguments,
                stream_ids: Vec::new(),
            })
            .await
            .map_err(InvokeError::Send)
    }

    /// Invokes `method` as a StreamInvocation and returns a source yielding
    /// its StreamItems. A terminal error on the underlying Completion is
    /// logged rather than re-surfaced here -- the returned source stays a
    /// plain item stream, closing when the remote side finishes or faults.
    pub async fn pull_stream<A, T>(&self, method: &str, args: A) -> Result<StreamSource<T>, InvokeError>
    where
        A: Serialize,
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.fail_fast()?;
        let id = self.new_id();
        let arguments = encode_args(&args)?;
        let completion_rx = self.invoke_registry.new_invocation(id.clone());
        let item_rx = self.stream_client.new_upstream::<T>(id.clone());
        if let Err(err) = self
            .connection
            .send(HubMessage::StreamInvocation {
                invocation_id: Some(id.clone()),
                target: method.to_owned(),
                arguments,
                stream_ids: Vec::new(),
            })
            .await
        {
            self.invoke_registry.delete_invocation(&id);
            self.stream_client.delete_upstream(&id);
            return Err(InvokeError::Send(err));
        }

        let connection_id = self.connection.connection_id().to_owned();
        tokio::spawn(async move {
            match completion_rx.await {
                Ok(InvokeOutcome::Error(message)) => {
                    tracing::warn!(connection_id, invocation_id = %id, error = %message, "pulled stream ended with error");
                }
                Ok(InvokeOutcome::Aborted(reason)) => {
                    tracing::warn!(connection_id, invocation_id = %id, reason = %reason, "pulled stream aborted");
                }
                Ok(InvokeOutcome::Result(_)) | Err(_) => {}
            }
        });

        Ok(StreamSource::new(item_rx))
    }

    /// Invokes `method` and then streams `source`'s items up to it as a
    /// client-streaming upload. Returns once the initial Invocation is
    /// sent; the upload itself runs in the background via `Streamer`.
    pub async fn push_streams<A, T, S>(&self, method: &str, args: A, source: S) -> Result<(), InvokeError>
    where
        A: Serialize,
        T: Serialize + Send + 'static,
        S: Stream<Item = T> + Send + 'static,
    {
        self.fail_fast()?;
        let invocation_id = self.new_id();
        let stream_id = self.new_id();
        let arguments = encode_args(&args)?;
        let completion_rx = self.invoke_registry.new_invocation(invocation_id.clone());
        if let Err(err) = self
            .connection
            .send(HubMessage::Invocation {
                invocation_id: Some(invocation_id.clone()),
                target: method.to_owned(),
                arguments,
                stream_ids: vec![stream_id.clone()],
            })
            .await
        {
            self.invoke_registry.delete_invocation(&invocation_id);
            return Err(InvokeError::Send(err));
        }

        let boxed: BoxedItemStream = Box::pin(futures_util::StreamExt::map(source, |item| {
            serde_json::value::to_raw_value(&item).unwrap_or_else(|_| RawValue::from_string("null".to_owned()).expect("\"null\" is valid JSON"))
        }));
        self.streamer.start(stream_id, boxed);

        let connection_id = self.connection.connection_id().to_owned();
        tokio::spawn(async move {
            if let Ok(InvokeOutcome::Error(message)) = completion_rx.await {
                tracing::warn!(connection_id, invocation_id = %invocation_id, error = %message, "push_streams invocation failed");
            }
        });

        Ok(())
    }

    pub fn is_loop_ended(&self) -> bool {
        self.connection.is_closed()
    }
}
