//! The one-shot handshake exchanged before either side starts speaking
//! `HubMessage`. Bounded by `handshake_timeout`; a timeout, a transport
//! error, or a non-empty `error` field in the response are all fatal before
//! the connection is ever handed to the message loop.

use std::time::Duration;

use bytes::BytesMut;
use hub_protocol::codec::{join_frame, split_frame};
use hub_protocol::{HandshakeRequest, HandshakeResponse};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::HandshakeError;

const HANDSHAKE_MAX_FRAME: usize = 4096;

async fn write_frame<W: AsyncWrite + Unpin>(io: &mut W, payload: &[u8]) -> Result<(), HandshakeError> {
    let mut out = BytesMut::new();
    join_frame(&mut out, payload);
    io.write_all(&out).await?;
    Ok(())
}

async fn read_frame<R: AsyncRead + Unpin>(io: &mut R, buf: &mut BytesMut) -> Result<BytesMut, HandshakeError> {
    loop {
        if let Some(frame) = split_frame(buf, HANDSHAKE_MAX_FRAME).map_err(|e| HandshakeError::Io(std::io::Error::other(e)))? {
            return Ok(frame);
        }
        let mut chunk = [0u8; 1024];
        let n = io.read(&mut chunk).await?;
        if n == 0 {
            return Err(HandshakeError::Closed);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Runs the client side: send a request, wait for a response.
pub async fn perform_client_handshake<S>(io: &mut S, timeout: Duration) -> Result<(), HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tokio::time::timeout(timeout, async move {
        let request = serde_json::to_vec(&HandshakeRequest::json())?;
        write_frame(io, &request).await?;

        let mut buf = BytesMut::new();
        let frame = read_frame(io, &mut buf).await?;
        let response: HandshakeResponse = serde_json::from_slice(&frame)?;
        if let Some(message) = response.error {
            return Err(HandshakeError::Rejected(message));
        }
        Ok(())
    })
    .await
    .map_err(|_| HandshakeError::Timeout(timeout))?
}

/// Runs the server side: wait for a request, validate it, respond.
pub async fn perform_server_handshake<S>(io: &mut S, timeout: Duration) -> Result<(), HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tokio::time::timeout(timeout, async move {
        let mut buf = BytesMut::new();
        let frame = read_frame(io, &mut buf).await?;
        let request: HandshakeRequest = serde_json::from_slice(&frame)?;

        if request.protocol != HandshakeRequest::PROTOCOL {
            let response = HandshakeResponse::error(format!("Protocol \"{}\" not supported", request.protocol));
            let payload = serde_json::to_vec(&response)?;
            write_frame(io, &payload).await?;
            return Err(HandshakeError::Rejected(response.error.unwrap_or_default()));
        }

        let payload = serde_json::to_vec(&HandshakeResponse::ok())?;
        write_frame(io, &payload).await?;
        Ok(())
    })
    .await
    .map_err(|_| HandshakeError::Timeout(timeout))?
}
