use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("transport error during handshake: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed handshake frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("peer rejected handshake: {0}")]
    Rejected(String),
    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),
    #[error("peer closed the connection during handshake")]
    Closed,
}

/// Fatal errors: all of these break the message loop (§7 "Protocol
/// violation" / "Transport error" / "Timeout").
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("transport error: {0}")]
    Transport(#[from] hub_protocol::FramingError),
    #[error("client timeout interval elapsed ({0:?})")]
    PeerTimeout(Duration),
    #[error("connection canceled")]
    Canceled,
    #[error("peer closed the connection: {0:?}")]
    PeerClosed(Option<String>),
    #[error("protocol violation: {0}")]
    Protocol(String),
}

/// Errors surfaced to a caller of `HubClient::invoke`/`send`/`pull_stream`/
/// `push_streams`. Never fatal to the connection itself (§7 "Caller
/// misuse" is the callee-side mirror of this).
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("message loop ended")]
    LoopEnded,
    #[error("send failed: {0}")]
    Send(#[from] hub_protocol::FramingError),
    #[error("invocation aborted: {0}")]
    Aborted(String),
    #[error("remote error: {0}")]
    Remote(String),
    #[error("argument/result encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors resolving and invoking a target method on the inbound side.
/// Every variant here is packaged into a Completion's `error` field by the
/// dispatcher; none of them are fatal to the connection.
#[derive(Debug, Error, Clone)]
pub enum DispatchError {
    #[error("Unknown method {0}")]
    UnknownMethod(String),
    #[error("parameter mismatch calling method {0}")]
    ParameterMismatch(String),
    #[error("to many StreamIds for channel parameters of method {0}")]
    StreamIdMismatch(String),
    #[error("{0}")]
    ArgumentDecode(String),
    #[error("{0}")]
    HandlerFault(String),
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("invalid configuration: {0}")]
    Config(#[from] crate::config::ConfigError),
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
}

/// A fault raised while feeding inbound stream items into their sink
/// (§4.5). `Fatal` must terminate the connection; `TimedOut` only fails
/// the one stream's invocation.
#[derive(Debug, Error)]
pub enum StreamItemFault {
    #[error("deserialization failed: {0}")]
    Fatal(String),
    #[error("chanReceiveTimeout elapsed waiting for the consumer")]
    TimedOut,
}
