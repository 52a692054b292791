//! The byte transport this crate runs over is out of scope (spec Non-goal):
//! anything that's a reliable, ordered, bidirectional byte stream qualifies,
//! a TCP socket, a TLS stream, an in-memory duplex pipe for tests.

use tokio::io::{AsyncRead, AsyncWrite};

pub trait ByteTransport: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> ByteTransport for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Type-erased transport, boxed once at connection construction so the rest
/// of the crate (`HubConnection`, `Loop`, `Streamer`, ...) doesn't need to be
/// generic over every possible socket type.
pub type DynTransport = Box<dyn ByteTransport>;
