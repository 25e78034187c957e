//! eISCP framing.
//!
//! Outbound commands are wrapped in a [`FrameHeader`] plus the `!1` unit-type
//! designator and a CR terminator. Inbound bytes are accumulated until a
//! batch is complete, then cut into bare `TAGparams` messages: along the
//! header sizes when they line up, otherwise on the `ISCP` magic once the
//! device closes the batch with CRLF.

use std::ops::Range;

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::error::EiscpError;
use crate::header::{FrameHeader, HEADER_SIZE, MAGIC};

/// Unit-type designator for a receiver.
pub const UNIT_TYPE: &[u8; 2] = b"!1";

/// Upper bound on buffered bytes awaiting a batch terminator.
pub const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Bytes between the end of a split `ISCP` token and the message tag.
const MESSAGE_OFFSET: usize = HEADER_SIZE - MAGIC.len() + UNIT_TYPE.len();

const EOF: u8 = 0x1A;

/// Build the wire frame for a host command.
pub fn encode(command: &str) -> Bytes {
    frame(command, b"\r")
}

/// Build a frame the way the device emits it (`EOF CR LF` tail).
///
/// Used by simulated receivers.
pub fn encode_notification(message: &str) -> Bytes {
    frame(message, &[EOF, b'\r', b'\n'])
}

fn frame(body: &str, tail: &[u8]) -> Bytes {
    let data_size = UNIT_TYPE.len() + body.len() + tail.len();
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + data_size);
    buf.put_slice(&FrameHeader::new(data_size as u32).to_bytes());
    buf.put_slice(UNIT_TYPE);
    buf.put_slice(body.as_bytes());
    buf.put_slice(tail);
    buf.freeze()
}

/// Append `incoming` to `accumulator` and drain every message of a completed
/// batch. Returns an empty list while the batch is still partial.
pub fn decode(accumulator: &mut BytesMut, incoming: &[u8]) -> Vec<String> {
    accumulator.extend_from_slice(incoming);
    take_batch(accumulator).unwrap_or_default()
}

/// Result of walking a buffer frame by frame along the header sizes.
#[derive(Debug, PartialEq, Eq)]
enum Scan {
    /// Back-to-back frames ending exactly at the end of the buffer. Each
    /// range covers the data section of one frame.
    Complete(Vec<Range<usize>>),
    /// The last frame is still arriving.
    Partial,
    /// The sizes do not line up; fall back to splitting on the magic.
    Malformed,
}

fn scan_frames(buf: &[u8]) -> Scan {
    let Some(mut start) = find_magic(buf, 0) else {
        return Scan::Malformed;
    };
    let mut frames = Vec::new();
    loop {
        if buf.len() - start < HEADER_SIZE {
            return Scan::Partial;
        }
        let header = match FrameHeader::from_bytes(&buf[start..]) {
            Ok(header) if header.header_size() as usize == HEADER_SIZE => header,
            _ => return Scan::Malformed,
        };
        let end = start + header.frame_len();
        if end > buf.len() {
            return Scan::Partial;
        }
        frames.push(start + HEADER_SIZE..end);

        let rest = &buf[end..];
        if rest.is_empty() {
            return Scan::Complete(frames);
        }
        if rest.len() < MAGIC.len() && MAGIC.starts_with(rest) {
            return Scan::Partial;
        }
        if !rest.starts_with(MAGIC) {
            return Scan::Malformed;
        }
        start = end;
    }
}

/// Well-formed frames are cut along their headers, so payloads may contain
/// the magic. Anything else is processed once the device closes the batch
/// with CRLF, split on the magic.
fn take_batch(buf: &mut BytesMut) -> Option<Vec<String>> {
    let messages = match scan_frames(buf) {
        Scan::Complete(frames) => frames
            .into_iter()
            .filter_map(|data| message_from_data(&buf[data]))
            .collect(),
        Scan::Partial => return None,
        Scan::Malformed if buf.ends_with(b"\r\n") => split_on_magic(buf)
            .into_iter()
            .filter_map(message_from_segment)
            .collect(),
        Scan::Malformed => return None,
    };
    buf.clear();
    Some(messages)
}

fn find_magic(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .windows(MAGIC.len())
        .position(|w| w == MAGIC)
        .map(|i| i + from)
}

fn split_on_magic(buf: &[u8]) -> Vec<&[u8]> {
    let mut segments = Vec::new();
    let mut start = 0;
    while let Some(at) = find_magic(buf, start) {
        segments.push(&buf[start..at]);
        start = at + MAGIC.len();
    }
    segments.push(&buf[start..]);
    segments
}

/// `data` is the frame body after the header: unit type, message, terminator.
fn message_from_data(data: &[u8]) -> Option<String> {
    let body = data.get(UNIT_TYPE.len()..)?;
    Some(String::from_utf8_lossy(strip_terminator(body)).into_owned())
}

/// `segment` is whatever followed one magic token.
fn message_from_segment(segment: &[u8]) -> Option<String> {
    let body = segment.get(MESSAGE_OFFSET..)?;
    let message = strip_terminator(body);
    if message.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(message).into_owned())
    }
}

/// Device frames end in `[EOF] CR LF`, host frames in exactly one CR.
fn strip_terminator(body: &[u8]) -> &[u8] {
    if let Some(rest) = body.strip_suffix(b"\r\n") {
        rest.strip_suffix(&[EOF]).unwrap_or(rest)
    } else if let Some(rest) = body.strip_suffix(b"\r") {
        rest
    } else {
        body.strip_suffix(&[EOF]).unwrap_or(body)
    }
}

/// `tokio_util` decoder yielding one `Vec<String>` per completed batch.
#[derive(Debug, Default)]
pub struct EiscpCodec;

impl Decoder for EiscpCodec {
    type Item = Vec<String>;
    type Error = EiscpError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(batch) = take_batch(src) {
            return Ok(Some(batch));
        }
        if src.len() > MAX_BUFFER_SIZE {
            return Err(EiscpError::FrameTooLarge {
                size: src.len(),
                max: MAX_BUFFER_SIZE,
            });
        }
        Ok(None)
    }
}
