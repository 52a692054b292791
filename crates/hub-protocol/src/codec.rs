//! Record-separator framing: frames are JSON objects concatenated and
//! separated by a single `0x1E` byte. The decoder accumulates bytes,
//! scans for `0x1E`, and yields one frame per complete prefix; partial
//! trailing bytes stay buffered for the next read. Empty frames are
//! ignored rather than surfaced as errors -- a double separator or a
//! leading one from a previous partial write shouldn't kill the
//! connection.

use crate::message::{HubMessage, MessageError};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const RECORD_SEPARATOR: u8 = 0x1E;

#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("frame of {len} bytes exceeds maximumReceiveMessageSize of {max}")]
    FrameTooLarge { len: usize, max: usize },
    #[error(transparent)]
    Message(#[from] MessageError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Splits `0x1E`-delimited frames out of `buf`, honoring `max_frame_size`.
/// Returns the next complete (non-empty) frame's bytes, leaving any
/// partial trailing data in `buf` for the next call. This is the left
/// inverse of [`join_frame`]: splitting the output of joining any
/// sequence of non-empty frames reproduces that sequence.
pub fn split_frame(
    buf: &mut BytesMut,
    max_frame_size: usize,
) -> Result<Option<BytesMut>, FramingError> {
    loop {
        let Some(pos) = buf.iter().position(|&b| b == RECORD_SEPARATOR) else {
            if buf.len() > max_frame_size {
                return Err(FramingError::FrameTooLarge {
                    len: buf.len(),
                    max: max_frame_size,
                });
            }
            return Ok(None);
        };
        if pos > max_frame_size {
            return Err(FramingError::FrameTooLarge {
                len: pos,
                max: max_frame_size,
            });
        }
        let frame = buf.split_to(pos);
        buf.advance(1); // drop the separator itself
        if frame.is_empty() {
            continue;
        }
        return Ok(Some(frame));
    }
}

/// Appends `payload` followed by the record separator.
pub fn join_frame(dst: &mut BytesMut, payload: &[u8]) {
    dst.reserve(payload.len() + 1);
    dst.put_slice(payload);
    dst.put_u8(RECORD_SEPARATOR);
}

/// [`Decoder`]/[`Encoder`] pair for the hub message protocol proper (as
/// opposed to the bespoke handshake frames, which use [`split_frame`]
/// directly since their shape isn't a [`HubMessage`]).
pub struct HubMessageCodec {
    max_frame_size: usize,
}

impl HubMessageCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Decoder for HubMessageCodec {
    type Item = HubMessage;
    type Error = FramingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match split_frame(src, self.max_frame_size)? {
            Some(frame) => Ok(Some(HubMessage::decode(&frame)?)),
            None => Ok(None),
        }
    }
}

impl Encoder<HubMessage> for HubMessageCodec {
    type Error = FramingError;

    fn encode(&mut self, item: HubMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = item.encode()?;
        join_frame(dst, &payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_frame_is_left_inverse_of_join_frame() {
        let payloads: Vec<&[u8]> = vec![br#"{"type":6}"#, br#"{"type":1,"target":"x"}"#, br#"{}"#];
        let mut joined = BytesMut::new();
        for p in &payloads {
            join_frame(&mut joined, p);
        }
        let mut out = Vec::new();
        while let Some(frame) = split_frame(&mut joined, 1 << 20).unwrap() {
            out.push(frame.to_vec());
        }
        assert_eq!(out, payloads.iter().map(|p| p.to_vec()).collect::<Vec<_>>());
    }

    #[test]
    fn partial_frame_across_two_reads_yields_exactly_one_message() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(br#"{"type":6"#);
        assert!(split_frame(&mut buf, 1 << 20).unwrap().is_none());
        buf.extend_from_slice(b"}\x1e");
        let frame = split_frame(&mut buf, 1 << 20).unwrap().unwrap();
        assert_eq!(&frame[..], br#"{"type":6}"#);
        assert!(split_frame(&mut buf, 1 << 20).unwrap().is_none());
    }

    #[test]
    fn empty_frames_are_ignored() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"\x1e\x1e{\"type\":6}\x1e");
        let frame = split_frame(&mut buf, 1 << 20).unwrap().unwrap();
        assert_eq!(&frame[..], br#"{"type":6}"#);
    }

    #[test]
    fn oversize_frame_without_separator_is_an_error() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&vec![b'a'; 16]);
        let err = split_frame(&mut buf, 8).unwrap_err();
        assert!(matches!(err, FramingError::FrameTooLarge { .. }));
    }
}
