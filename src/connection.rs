//! A single connection's framed read/write halves. This is the thing
//! `Loop`, `Streamer` and the `HubClient`/`HubServer` facades all share an
//! `Arc` of; the single-writer discipline (spec §9) lives here as a mutex
//! around the `FramedWrite` half rather than a send-queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Instant;

use futures_util::{SinkExt, StreamExt};
use hub_protocol::codec::FramingError;
use hub_protocol::{HubMessage, HubMessageCodec};
use tokio::io::{split, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::transport::{ByteTransport, DynTransport};

pub struct HubConnection {
    connection_id: String,
    reader: Mutex<FramedRead<ReadHalf<DynTransport>, HubMessageCodec>>,
    writer: Mutex<FramedWrite<WriteHalf<DynTransport>, HubMessageCodec>>,
    last_write: StdMutex<Instant>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl HubConnection {
    pub fn new(io: impl ByteTransport, connection_id: String, max_frame_size: usize) -> Self {
        let boxed: DynTransport = Box::new(io);
        let (read_half, write_half) = split(boxed);
        Self {
            connection_id,
            reader: Mutex::new(FramedRead::new(read_half, HubMessageCodec::new(max_frame_size))),
            writer: Mutex::new(FramedWrite::new(write_half, HubMessageCodec::new(max_frame_size))),
            last_write: StdMutex::new(Instant::now()),
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Sends one message, holding the writer lock for the duration of the
    /// encode + flush. Safe to call concurrently from the loop task and any
    /// number of `Streamer` workers; callers never interleave partial
    /// frames.
    pub async fn send(&self, message: HubMessage) -> Result<(), FramingError> {
        let mut writer = self.writer.lock().await;
        writer.send(message).await?;
        *self.last_write.lock().unwrap() = Instant::now();
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), FramingError> {
        self.send(HubMessage::Ping).await
    }

    /// Non-blocking: used by the keep-alive branch of the loop's `select!`
    /// to decide whether a Ping is due without contending the writer lock.
    pub fn last_write_stamp(&self) -> Instant {
        *self.last_write.lock().unwrap()
    }

    /// Reads the next frame. Only the dedicated receiver task in `Loop`
    /// calls this; holding a `tokio::sync::Mutex` here (instead of giving
    /// the loop exclusive ownership of the reader) is what lets tests drive
    /// `HubConnection` without also reimplementing the loop.
    pub async fn receive(&self) -> Result<HubMessage, FramingError> {
        let mut reader = self.reader.lock().await;
        match reader.next().await {
            Some(result) => result,
            None => Err(FramingError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "peer closed the connection",
            ))),
        }
    }

    /// Sends a Close frame (best-effort) and shuts the write half down.
    /// Idempotent: a second call is a no-op.
    pub async fn close(&self, error: Option<String>, allow_reconnect: bool) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.send(HubMessage::Close { error, allow_reconnect }).await;
        let mut writer = self.writer.lock().await;
        let _ = writer.close().await;
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
