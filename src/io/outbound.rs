//! Outbound path: metadata stamping, change suppression and framing

use crate::error::{IgtlError, Result};
use crate::protocol::crc::Crc64;
use crate::protocol::header::{Header, MessageKind};
use crate::protocol::message::{encode_message, IgtlMessage, Message};
use crate::protocol::metadata::MetadataEntry;
use crate::protocol::types::string::ENCODING_UTF8;
use std::collections::HashMap;
use tracing::{debug, trace};

/// Metadata key naming the sending model
pub const MODEL_NAME_KEY: &str = "ModelName";

/// Attach `ModelName` metadata naming the message's device
///
/// An existing `ModelName` entry is left alone. The value is US-ASCII when the
/// device name allows it and UTF-8 otherwise.
pub fn with_model_name<T: Message>(mut message: IgtlMessage<T>) -> Result<IgtlMessage<T>> {
    if message.metadata.get(MODEL_NAME_KEY).is_some() {
        return Ok(message);
    }
    let device = message.header.device_name.as_str()?.to_string();
    let entry = if device.is_ascii() {
        MetadataEntry::ascii(MODEL_NAME_KEY, &device)
    } else {
        MetadataEntry {
            key: MODEL_NAME_KEY.to_string(),
            encoding: ENCODING_UTF8,
            value: device.into_bytes(),
        }
    };
    let mut metadata = std::mem::take(&mut message.metadata);
    metadata.insert(entry);
    Ok(message.with_metadata(metadata))
}

/// Remembers the last content sent per device and message kind
///
/// # Examples
///
/// ```
/// use openigtlink_codec::io::ChangeTracker;
/// use openigtlink_codec::protocol::MessageKind;
///
/// let mut tracker = ChangeTracker::new();
/// assert!(tracker.should_send("Needle", MessageKind::Transform, &[1, 2, 3]));
/// assert!(!tracker.should_send("Needle", MessageKind::Transform, &[1, 2, 3]));
/// assert!(tracker.should_send("Needle", MessageKind::Transform, &[1, 2, 4]));
/// ```
#[derive(Debug, Default)]
pub struct ChangeTracker {
    last_sent: HashMap<(String, MessageKind), Vec<u8>>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        ChangeTracker::default()
    }

    /// Whether `content` differs from what was last sent for this device and
    /// kind; records it when it does
    pub fn should_send(&mut self, device: &str, kind: MessageKind, content: &[u8]) -> bool {
        self.record(device, kind, content).is_some()
    }

    /// Record `content` unless unchanged
    ///
    /// `Some` carries the record it replaced, for `restore`.
    fn record(
        &mut self,
        device: &str,
        kind: MessageKind,
        content: &[u8],
    ) -> Option<Option<Vec<u8>>> {
        let key = (device.to_string(), kind);
        match self.last_sent.get(&key) {
            Some(previous) if previous.as_slice() == content => None,
            _ => Some(self.last_sent.insert(key, content.to_vec())),
        }
    }

    /// Put back a replaced record; `None` leaves no record
    fn restore(&mut self, device: &str, kind: MessageKind, previous: Option<Vec<u8>>) {
        let key = (device.to_string(), kind);
        match previous {
            Some(content) => {
                self.last_sent.insert(key, content);
            }
            None => {
                self.last_sent.remove(&key);
            }
        }
    }

    /// Drop the record for this device and kind so the next send goes out
    pub fn forget(&mut self, device: &str, kind: MessageKind) {
        self.last_sent.remove(&(device.to_string(), kind));
    }

    /// Drop every record
    pub fn clear(&mut self) {
        self.last_sent.clear();
    }

    pub fn len(&self) -> usize {
        self.last_sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_sent.is_empty()
    }
}

/// Frame builder shared by the blocking and async sessions
#[derive(Debug)]
pub(crate) struct OutboundEncoder {
    crc: Crc64,
    max_body_size: u64,
    model_name_metadata: bool,
    tracker: ChangeTracker,
}

/// Frame ready for the transport, with what to roll the tracker back to on
/// failure
#[derive(Debug)]
pub(crate) struct PreparedFrame {
    pub bytes: Vec<u8>,
    pub device: String,
    pub kind: MessageKind,
    previous: Option<Vec<u8>>,
}

impl OutboundEncoder {
    pub fn new(crc: Crc64, max_body_size: u64, model_name_metadata: bool) -> Self {
        OutboundEncoder {
            crc,
            max_body_size,
            model_name_metadata,
            tracker: ChangeTracker::new(),
        }
    }

    /// Fully encode `message`, or `None` when its content is unchanged
    ///
    /// The tracker is left as it was unless a complete frame is returned.
    pub fn prepare<T: Message + Clone>(
        &mut self,
        message: &IgtlMessage<T>,
    ) -> Result<Option<PreparedFrame>> {
        let device = message.header.device_name.as_str()?.to_string();
        let kind = T::kind();
        let content = message.content.encode_content()?;
        let Some(previous) = self.tracker.record(&device, kind, &content) else {
            trace!(msg_type = kind.type_name(), device_name = %device, "Content unchanged, not sending");
            return Ok(None);
        };

        let encoded = if self.model_name_metadata {
            with_model_name(message.clone()).and_then(|stamped| encode_message(&stamped, &self.crc))
        } else {
            encode_message(message, &self.crc)
        };
        let bytes = match encoded.and_then(|bytes| self.check_size(bytes)) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.tracker.restore(&device, kind, previous);
                return Err(e);
            }
        };

        debug!(
            msg_type = kind.type_name(),
            device_name = %device,
            size = bytes.len(),
            "Encoding message"
        );
        Ok(Some(PreparedFrame {
            bytes,
            device,
            kind,
            previous,
        }))
    }

    /// Roll back the tracker after the transport failed to take a frame
    pub fn sent_failed(&mut self, frame: PreparedFrame) {
        self.tracker.restore(&frame.device, frame.kind, frame.previous);
    }

    pub fn tracker_mut(&mut self) -> &mut ChangeTracker {
        &mut self.tracker
    }

    fn check_size(&self, bytes: Vec<u8>) -> Result<Vec<u8>> {
        let body_size = (bytes.len() - Header::SIZE) as u64;
        if body_size > self.max_body_size {
            return Err(IgtlError::BodyTooLarge {
                size: body_size,
                max: self.max_body_size,
            });
        }
        Ok(bytes)
    }
}
