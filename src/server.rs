//! The accept-side facade. `HubBuilder` collects method registrations and
//! configuration; `HubServer::accept` runs the server half of the
//! handshake and hands back a `HubClient` for the new connection -- the
//! same loop and the same `HubClient` API serve both call directions
//! (§9 "no separate, less-rigorous server code path").

use std::sync::Arc;

use crate::client::HubClient;
use crate::config::HubOptions;
use crate::connection::HubConnection;
use crate::dispatcher::Dispatcher;
use crate::error::ConnectError;
use crate::handshake::perform_server_handshake;
use crate::invoke_registry::InvokeRegistry;
use crate::loop_::HubLoop;
use crate::stream_client::StreamClient;
use crate::streamer::Streamer;
use crate::transport::ByteTransport;

#[derive(Default)]
pub struct HubBuilder {
    dispatcher: Dispatcher,
    options: HubOptions,
}

impl HubBuilder {
    pub fn new(options: HubOptions) -> Self {
        Self {
            dispatcher: Dispatcher::new(options.enable_detailed_errors),
            options,
        }
    }

    pub fn register_unary<A, R, F, Fut>(mut self, name: &str, handler: F) -> Self
    where
        A: crate::dispatcher::FromArgs + 'static,
        R: serde::Serialize + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<R, String>> + Send + 'static,
    {
        self.dispatcher.register_unary(name, handler);
        self
    }

    pub fn register_server_stream<A, T, F, Fut, S>(mut self, name: &str, handler: F) -> Self
    where
        A: crate::dispatcher::FromArgs + 'static,
        T: serde::Serialize + 'static,
        S: futures_util::Stream<Item = T> + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<S, String>> + Send + 'static,
    {
        self.dispatcher.register_server_stream(name, handler);
        self
    }

    pub fn register_client_stream<A, T, F, Fut>(mut self, name: &str, handler: F) -> Self
    where
        A: crate::dispatcher::FromArgs + 'static,
        T: serde::de::DeserializeOwned + Send + Sync + 'static,
        F: Fn(A, crate::stream_client::StreamSource<T>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.dispatcher.register_client_stream(name, handler);
        self
    }

    pub fn build(self) -> HubServer {
        HubServer {
            dispatcher: Arc::new(self.dispatcher),
            options: self.options,
        }
    }
}

pub struct HubServer {
    dispatcher: Arc<Dispatcher>,
    options: HubOptions,
}

impl HubServer {
    /// Runs the server side of the handshake over `io`, then spawns the
    /// message loop bound to this server's registrations. The returned
    /// `HubClient` lets the application invoke back onto the same duplex
    /// connection; dropping it does not close the connection, only ending
    /// the loop (by transport error, timeout, or a received Close) does.
    pub async fn accept(&self, mut io: impl ByteTransport, connection_id: impl Into<String>) -> Result<HubClient, ConnectError> {
        self.options.validate()?;
        perform_server_handshake(&mut io, self.options.handshake_timeout).await?;

        let connection = Arc::new(HubConnection::new(io, connection_id.into(), self.options.maximum_receive_message_size));
        let invoke_registry = Arc::new(InvokeRegistry::new());
        let stream_client = Arc::new(StreamClient::new(
            self.options.stream_buffer_capacity,
            self.options.chan_receive_timeout,
        ));
        let streamer = Arc::new(Streamer::new(Arc::clone(&connection)));

        let hub_loop = HubLoop::new(
            Arc::clone(&connection),
            Arc::clone(&invoke_registry),
            Arc::clone(&stream_client),
            Arc::clone(&streamer),
            Arc::clone(&self.dispatcher),
            self.options.clone(),
        );
        tokio::spawn(hub_loop.run());

        Ok(HubClient::from_parts(connection, invoke_registry, stream_client, streamer))
    }
}
