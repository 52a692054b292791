//! Test-only helpers for driving a hub connection end to end without a
//! real network socket: an in-memory duplex byte pipe standing in for
//! the transport, and a hand-rolled peer that speaks raw hub frames so
//! tests can assert on exact wire behavior.

use bytes::BytesMut;
use hub_protocol::codec::{join_frame, split_frame};
use hub_protocol::message::HubMessage;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

/// A pair of in-memory, ordered, reliable byte pipes -- satisfies the
/// "bidirectional reliable ordered byte channel" the hub core expects of
/// its transport, without touching a socket.
pub fn duplex_pair(max_buf_size: usize) -> (DuplexStream, DuplexStream) {
    tokio::io::duplex(max_buf_size)
}

/// A peer that reads/writes raw hub frames directly over a byte stream,
/// for asserting on exact protocol behavior (handshakes, message
/// ordering, error texts) from outside the hub-core state machine.
pub struct RawPeer<S> {
    io: S,
    read_buf: BytesMut,
    max_frame_size: usize,
}

impl<S> RawPeer<S>
where
    S: AsyncReadExt + AsyncWriteExt + Unpin,
{
    pub fn new(io: S) -> Self {
        Self {
            io,
            read_buf: BytesMut::new(),
            max_frame_size: 1 << 20,
        }
    }

    pub async fn send_handshake(&mut self, protocol: &str, version: u32) -> std::io::Result<()> {
        let req = hub_protocol::HandshakeRequest {
            protocol: protocol.to_owned(),
            version,
        };
        self.send_raw_json(&req).await
    }

    pub async fn recv_handshake_response(
        &mut self,
    ) -> std::io::Result<hub_protocol::HandshakeResponse> {
        let frame = self.recv_raw_frame().await?;
        Ok(serde_json::from_slice(&frame).expect("handshake response is valid JSON"))
    }

    pub async fn send_message(&mut self, msg: &HubMessage) -> std::io::Result<()> {
        let payload = msg.encode().expect("message encodes");
        let mut out = BytesMut::new();
        join_frame(&mut out, &payload);
        self.io.write_all(&out).await
    }

    pub async fn recv_message(&mut self) -> std::io::Result<HubMessage> {
        let frame = self.recv_raw_frame().await?;
        Ok(HubMessage::decode(&frame).expect("peer sent a well-formed message"))
    }

    async fn send_raw_json<T: serde::Serialize>(&mut self, value: &T) -> std::io::Result<()> {
        let payload = serde_json::to_vec(value).expect("value serializes");
        let mut out = BytesMut::new();
        join_frame(&mut out, &payload);
        self.io.write_all(&out).await
    }

    async fn recv_raw_frame(&mut self) -> std::io::Result<BytesMut> {
        loop {
            if let Some(frame) = split_frame(&mut self.read_buf, self.max_frame_size)
                .expect("frame within size budget")
            {
                return Ok(frame);
            }
            let mut chunk = [0u8; 4096];
            let n = self.io.read(&mut chunk).await?;
            if n == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "peer closed the connection",
                ));
            }
            self.read_buf.extend_from_slice(&chunk[..n]);
        }
    }
}
