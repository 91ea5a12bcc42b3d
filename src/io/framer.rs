//! Frame assembly over a fragmented byte stream
//!
//! [`FrameAssembler`] performs no I/O. Bytes are pushed in exactly as the
//! transport delivered them, in chunks of any size, and complete frames come
//! out once the 58-byte header and its `body_size` body bytes are all
//! buffered. A frame that is still incomplete is never handed to a decoder.
//!
//! ```text
//! AwaitingHeader --(58 bytes)--> AwaitingBody --(body_size bytes)--> frame
//!       ^                                                              |
//!       +--------------------------------------------------------------+
//! ```
//!
//! There is no byte-level resynchronisation: a corrupted length field cannot
//! be recovered from, which is why an oversized `body_size` is terminal.

use crate::error::{IgtlError, Result};
use crate::protocol::any_message::{decode_any, AnyMessage};
use crate::protocol::crc::Crc64;
use crate::protocol::header::Header;
use bytes::{Bytes, BytesMut};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// One complete frame: header plus every body byte it announced
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub header: Header,
    /// Header and body bytes exactly as received
    pub bytes: Bytes,
}

impl Frame {
    /// Body bytes after the 58-byte header
    pub fn body(&self) -> &[u8] {
        &self.bytes[Header::SIZE..]
    }

    /// Verify and decode into the matching message kind
    pub fn decode(&self, crc: &Crc64, verify_crc: bool) -> Result<AnyMessage> {
        let msg_type = self.header.type_name.as_str().unwrap_or("UNKNOWN");
        let device_name = self.header.device_name.as_str().unwrap_or("UNKNOWN");

        match decode_any(&self.bytes, crc, verify_crc) {
            Ok(message) => {
                debug!(
                    msg_type = msg_type,
                    device_name = device_name,
                    body_size = self.header.body_size,
                    "Message decoded"
                );
                Ok(message)
            }
            Err(e) => {
                warn!(
                    msg_type = msg_type,
                    device_name = device_name,
                    error = %e,
                    "Failed to decode message"
                );
                Err(e)
            }
        }
    }
}

/// A partial frame that has waited too long for its remaining bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stall {
    /// Bytes currently buffered
    pub buffered: usize,
    /// Bytes needed to complete the frame, once the header is known
    pub expected: Option<usize>,
    /// Time since the first byte of the frame arrived
    pub elapsed: Duration,
}

#[derive(Debug)]
enum State {
    AwaitingHeader,
    AwaitingBody { header: Header, frame_len: usize },
}

/// Sans-IO frame assembler
///
/// # Examples
///
/// ```
/// use openigtlink_codec::io::FrameAssembler;
/// use openigtlink_codec::protocol::IgtlMessage;
/// use openigtlink_codec::protocol::types::StringBody;
///
/// let frame = IgtlMessage::new(StringBody::new("hello"), "Console")?.encode()?;
/// let mut assembler = FrameAssembler::new(1024);
///
/// for byte in &frame {
///     assert!(assembler.next_frame()?.is_none());
///     assembler.push(std::slice::from_ref(byte));
/// }
/// let complete = assembler.next_frame()?.unwrap();
/// assert_eq!(&complete.bytes[..], &frame[..]);
/// assert_eq!(assembler.buffered(), 0);
/// # Ok::<(), openigtlink_codec::IgtlError>(())
/// ```
#[derive(Debug)]
pub struct FrameAssembler {
    buffer: BytesMut,
    state: State,
    max_body_size: u64,
    pending_since: Option<Instant>,
    stall_reported: bool,
}

impl FrameAssembler {
    /// Assembler rejecting bodies larger than `max_body_size`
    pub fn new(max_body_size: u64) -> Self {
        FrameAssembler {
            buffer: BytesMut::with_capacity(Header::SIZE),
            state: State::AwaitingHeader,
            max_body_size,
            pending_since: None,
            stall_reported: false,
        }
    }

    /// Append bytes as delivered by the transport
    pub fn push(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        if self.buffer.is_empty() {
            self.pending_since = Some(Instant::now());
        }
        self.buffer.extend_from_slice(data);
        trace!(
            received = data.len(),
            buffered = self.buffer.len(),
            "Bytes buffered"
        );
    }

    /// Take the next complete frame, if one is buffered
    ///
    /// # Errors
    /// `BodyTooLarge` when a header announces more than the configured
    /// maximum. The stream cannot be realigned after that, so the error
    /// repeats on every call.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let State::AwaitingHeader = self.state {
            if self.buffer.len() < Header::SIZE {
                return Ok(None);
            }
            let header = Header::decode(&self.buffer[..Header::SIZE])?;
            if header.body_size > self.max_body_size {
                warn!(
                    body_size = header.body_size,
                    max = self.max_body_size,
                    "Header announces an oversized body"
                );
                return Err(IgtlError::BodyTooLarge {
                    size: header.body_size,
                    max: self.max_body_size,
                });
            }
            // Bounded by max_body_size above
            let frame_len = Header::SIZE + header.body_size as usize;
            self.buffer
                .reserve(frame_len.saturating_sub(self.buffer.len()));
            trace!(
                body_size = header.body_size,
                "Header complete, awaiting body"
            );
            self.state = State::AwaitingBody { header, frame_len };
        }

        let frame_len = match self.state {
            State::AwaitingBody { frame_len, .. } => frame_len,
            State::AwaitingHeader => return Ok(None),
        };
        if self.buffer.len() < frame_len {
            return Ok(None);
        }
        let State::AwaitingBody { header, .. } =
            std::mem::replace(&mut self.state, State::AwaitingHeader)
        else {
            return Ok(None);
        };
        let bytes = self.buffer.split_to(frame_len).freeze();
        self.pending_since = (!self.buffer.is_empty()).then(Instant::now);
        self.stall_reported = false;
        trace!(frame_len = frame_len, "Frame complete");
        Ok(Some(Frame { header, bytes }))
    }

    /// Bytes buffered but not yet returned as a frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// How long the current partial frame has been waiting, as of `now`
    ///
    /// `None` when nothing is buffered.
    pub fn pending_for(&self, now: Instant) -> Option<Duration> {
        self.pending_since
            .filter(|_| !self.buffer.is_empty())
            .map(|since| now.saturating_duration_since(since))
    }

    /// Report a partial frame that has waited at least `timeout`
    ///
    /// Each partial frame is reported at most once; enforcing a timeout is left
    /// to the caller.
    pub fn stall(&mut self, timeout: Duration) -> Option<Stall> {
        if self.stall_reported {
            return None;
        }
        let elapsed = self.pending_for(Instant::now())?;
        if elapsed < timeout {
            return None;
        }
        self.stall_reported = true;
        let expected = match &self.state {
            State::AwaitingBody { frame_len, .. } => Some(*frame_len),
            State::AwaitingHeader => None,
        };
        Some(Stall {
            buffered: self.buffer.len(),
            expected,
            elapsed,
        })
    }

    /// Time left before the current partial frame counts as stalled
    ///
    /// `None` when nothing is pending or the stall was already reported.
    pub fn until_stall(&self, timeout: Duration) -> Option<Duration> {
        if self.stall_reported {
            return None;
        }
        self.pending_for(Instant::now())
            .map(|elapsed| timeout.saturating_sub(elapsed))
    }
}
