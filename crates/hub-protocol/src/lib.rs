//! Wire types and framing for the hub RPC protocol: a length-free,
//! record-separator-delimited sequence of JSON objects carrying
//! invocation, streaming, completion and control messages.
//!
//! This crate only knows about bytes and JSON shapes. Connection
//! handling, dispatch and the message loop live in the root `hub-rpc`
//! crate one level up.

pub mod codec;
pub mod handshake;
pub mod message;

pub use codec::{FramingError, HubMessageCodec};
pub use handshake::{HandshakeRequest, HandshakeResponse};
pub use message::{kind, HubMessage, MessageError};
