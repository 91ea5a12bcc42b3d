//! OpenIGTLink message trait and structures
//!
//! A complete message on the wire is:
//!
//! ```text
//! Header (58) | [ExtendedHeader (12)] | content | [metadata index | metadata data]
//! ```
//!
//! The extended header and metadata are present when the header version is 3
//! or above. `body_size` and the CRC both cover everything after the header.
//! Encoding is all-or-nothing: the byte buffer is only returned once it is
//! fully assembled and checksummed.

use crate::error::{IgtlError, Result};
use crate::protocol::crc::Crc64;
use crate::protocol::extended_header::ExtendedHeader;
use crate::protocol::header::{Header, MessageKind, Timestamp};
use crate::protocol::metadata::{decode_metadata, encode_metadata, Metadata};

/// Common interface for the message content types
pub trait Message: Sized {
    /// Kind this content is sent as
    fn kind() -> MessageKind;

    /// Wire type tag, e.g. "TRANSFORM"
    fn message_type() -> &'static str {
        Self::kind().type_name()
    }

    /// Encode the content section (no header, no metadata)
    fn encode_content(&self) -> Result<Vec<u8>>;

    /// Decode the content section
    ///
    /// `data` is exactly the content window; implementations reject both short
    /// and over-long input.
    fn decode_content(data: &[u8]) -> Result<Self>;
}

/// Complete OpenIGTLink message
///
/// # Type Parameters
/// * `T` - Content type implementing [`Message`]
#[derive(Debug, Clone, PartialEq)]
pub struct IgtlMessage<T: Message> {
    /// Message header; `body_size` and `crc` are recomputed on encode
    pub header: Header,
    /// Present for version 3 messages
    pub extended_header: Option<ExtendedHeader>,
    pub content: T,
    /// Empty unless an extended header is present
    pub metadata: Metadata,
}

impl<T: Message> IgtlMessage<T> {
    /// Version 2 message from `device_name`, timestamped now
    pub fn new(content: T, device_name: &str) -> Result<Self> {
        Ok(IgtlMessage {
            header: Header::for_kind(T::kind(), device_name)?,
            extended_header: None,
            content,
            metadata: Metadata::new(),
        })
    }

    /// Attach an extended header, upgrading the message to version 3
    pub fn set_extended_header(&mut self, extended_header: ExtendedHeader) {
        self.extended_header = Some(extended_header);
        if self.header.version < Header::EXTENDED_VERSION {
            self.header.version = Header::EXTENDED_VERSION;
        }
    }

    /// Attach metadata; adds an extended header if there is none
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        if self.extended_header.is_none() {
            self.set_extended_header(ExtendedHeader::new());
        }
        self.metadata = metadata;
        self
    }

    /// Set the extended header's message id; adds one if there is none
    pub fn with_message_id(mut self, message_id: u32) -> Self {
        let mut ext = self.extended_header.take().unwrap_or_default();
        ext.message_id = message_id;
        self.set_extended_header(ext);
        self
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.header.timestamp = timestamp;
        self
    }

    /// Encode with the ECMA-182 CRC
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_message(self, Crc64::ecma182())
    }

    /// Decode with the ECMA-182 CRC, verifying the checksum
    pub fn decode(data: &[u8]) -> Result<Self> {
        decode_message(data, Crc64::ecma182(), true)
    }
}

/// Encode `message` into a complete frame
///
/// The header's `body_size` and `crc` are computed here; the extended header's
/// metadata sizes are taken from the metadata being written.
pub fn encode_message<T: Message>(message: &IgtlMessage<T>, crc: &Crc64) -> Result<Vec<u8>> {
    let content = message.content.encode_content()?;

    let mut header = message.header.clone();
    let mut body = Vec::with_capacity(ExtendedHeader::SIZE + content.len());

    // A version 3 header always announces an extended header
    let extended_header = message
        .extended_header
        .clone()
        .or_else(|| header.has_extended_header().then(ExtendedHeader::new));

    match extended_header {
        Some(mut ext) if header.has_extended_header() => {
            let (index, data) = encode_metadata(&message.metadata)?;
            ext.metadata_header_size = u16::try_from(index.len()).map_err(|_| {
                IgtlError::MalformedMetadata(format!("index region of {} bytes", index.len()))
            })?;
            ext.metadata_size = u32::try_from(data.len()).map_err(|_| {
                IgtlError::MalformedMetadata(format!("data region of {} bytes", data.len()))
            })?;

            body.extend_from_slice(&ext.encode());
            body.extend_from_slice(&content);
            body.extend_from_slice(&index);
            body.extend_from_slice(&data);
        }
        Some(_) => {
            return Err(IgtlError::InvalidHeader(format!(
                "extended header requires version {}, header has {}",
                Header::EXTENDED_VERSION,
                header.version
            )))
        }
        None if !message.metadata.is_empty() => {
            return Err(IgtlError::MalformedMetadata(
                "metadata requires an extended header".to_string(),
            ))
        }
        None => body.extend_from_slice(&content),
    }

    header.body_size = body.len() as u64;
    header.crc = crc.checksum(&body);

    let mut frame = Vec::with_capacity(Header::SIZE + body.len());
    frame.extend_from_slice(&header.encode());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Body of one frame split into its sections
#[derive(Debug)]
pub(crate) struct BodySections<'a> {
    pub extended_header: Option<ExtendedHeader>,
    pub content: &'a [u8],
    pub metadata: Metadata,
}

/// Split a body into extended header, content window and metadata
///
/// Content starts at the extended header's declared size and ends where the
/// metadata regions begin.
pub(crate) fn split_body<'a>(header: &Header, body: &'a [u8]) -> Result<BodySections<'a>> {
    if !header.has_extended_header() {
        return Ok(BodySections {
            extended_header: None,
            content: body,
            metadata: Metadata::new(),
        });
    }

    let ext = ExtendedHeader::decode(body)?;
    let count = ext.metadata_count()?;
    let metadata_len = ext.metadata_len();
    let content_end = body
        .len()
        .checked_sub(metadata_len)
        .filter(|&end| end >= ext.size())
        .ok_or(IgtlError::TruncatedBody {
            expected: ext.size() + metadata_len,
            actual: body.len(),
        })?;

    let (metadata, consumed) = if ext.has_metadata() {
        decode_metadata(body, content_end, count)?
    } else {
        (Metadata::new(), 0)
    };
    if consumed != metadata_len {
        return Err(IgtlError::MalformedMetadata(format!(
            "extended header declares {} metadata bytes, entries use {}",
            metadata_len, consumed
        )));
    }

    Ok(BodySections {
        content: &body[ext.size()..content_end],
        extended_header: Some(ext),
        metadata,
    })
}

/// Parse the header and check that `data` holds exactly one frame
///
/// Returns the header and the body slice after CRC verification.
pub(crate) fn checked_frame<'a>(
    data: &'a [u8],
    crc: &Crc64,
    verify_crc: bool,
) -> Result<(Header, &'a [u8])> {
    let header = Header::decode(data)?;
    let available = data.len() - Header::SIZE;
    let body_size = usize::try_from(header.body_size).map_err(|_| IgtlError::TruncatedBody {
        expected: usize::MAX,
        actual: available,
    })?;
    if available < body_size {
        return Err(IgtlError::TruncatedBody {
            expected: body_size,
            actual: available,
        });
    }
    if available > body_size {
        return Err(IgtlError::InvalidSize {
            expected: Header::SIZE + body_size,
            actual: data.len(),
        });
    }

    let body = &data[Header::SIZE..];
    if verify_crc {
        let actual = crc.checksum(body);
        if actual != header.crc {
            return Err(IgtlError::CorruptMessage {
                expected: header.crc,
                actual,
            });
        }
    }
    Ok((header, body))
}

/// Decode one complete frame as content type `T`
///
/// # Errors
/// - `TruncatedHeader` / `TruncatedBody` if `data` is short
/// - `CorruptMessage` if `verify_crc` is set and the checksum differs
/// - `UnknownMessageType` if the type tag is not one this codec knows
/// - `InvalidHeader` if the tag names a different known kind than `T`
/// - any content decode error of `T`
pub fn decode_message<T: Message>(
    data: &[u8],
    crc: &Crc64,
    verify_crc: bool,
) -> Result<IgtlMessage<T>> {
    let (header, body) = checked_frame(data, crc, verify_crc)?;
    let kind = header.kind()?;
    if kind != T::kind() {
        return Err(IgtlError::InvalidHeader(format!(
            "expected {} message, got {}",
            T::kind(),
            kind
        )));
    }

    let sections = split_body(&header, body)?;
    let content = T::decode_content(sections.content)?;
    Ok(IgtlMessage {
        header,
        extended_header: sections.extended_header,
        content,
        metadata: sections.metadata,
    })
}
