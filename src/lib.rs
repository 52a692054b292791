//! A duplex, hub-style RPC protocol on top of any reliable ordered byte
//! stream: handshake, unary invocation, server streaming, client
//! streaming, ping/timeout liveness and cooperative cancellation. The
//! wire format and framing live in `hub_protocol`; this crate is the
//! connection, the dispatch table, and the message loop tying them
//! together.

pub mod client;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod handshake;
mod invoke_registry;
mod loop_;
pub mod server;
pub mod stream_client;
pub mod streamer;
pub mod transport;

pub use client::HubClient;
pub use config::HubOptions;
pub use dispatcher::{Dispatcher, FromArgs};
pub use error::{ConnectError, DispatchError, HandshakeError, InvokeError, LoopError, StreamItemFault};
pub use server::{HubBuilder, HubServer};
pub use stream_client::StreamSource;
pub use transport::ByteTransport;

/// Alias matching the external-interface naming in the design notes:
/// what `HubClient::pull_stream` returns.
pub type StreamReceiver<T> = StreamSource<T>;
