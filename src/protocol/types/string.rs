//! STRING message type implementation
//!
//! The STRING message type carries a single character string tagged with its
//! IANA MIBenum encoding. Only US-ASCII and UTF-8 are understood; the same
//! rules apply to metadata values.

use crate::error::{IgtlError, Result};
use crate::protocol::cursor::ByteCursor;
use crate::protocol::header::MessageKind;
use crate::protocol::message::Message;
use bytes::BufMut;

/// MIBenum for US-ASCII (ANSI_X3.4-1968)
pub const ENCODING_US_ASCII: u16 = 3;

/// Alternate US-ASCII code some senders emit
pub const ENCODING_ASCII_LEGACY: u16 = 1;

/// MIBenum for UTF-8
pub const ENCODING_UTF8: u16 = 106;

/// Decode `bytes` according to a MIBenum `encoding`
///
/// # Errors
/// - `UnsupportedStringEncoding` for anything but 1, 3 or 106
/// - `InvalidText` if the bytes are not valid in that encoding
pub fn decode_text(encoding: u16, bytes: &[u8]) -> Result<String> {
    match encoding {
        ENCODING_US_ASCII | ENCODING_ASCII_LEGACY => {
            if let Some(pos) = bytes.iter().position(|b| !b.is_ascii()) {
                return Err(IgtlError::InvalidText(format!(
                    "non-ASCII byte {:#04x} at {}",
                    bytes[pos], pos
                )));
            }
            // ASCII is a subset of UTF-8
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
        ENCODING_UTF8 => String::from_utf8(bytes.to_vec())
            .map_err(|e| IgtlError::InvalidText(e.to_string())),
        other => Err(IgtlError::UnsupportedStringEncoding(other)),
    }
}

/// Check that `text` can be sent under `encoding`
pub fn validate_text(encoding: u16, text: &str) -> Result<()> {
    match encoding {
        ENCODING_US_ASCII | ENCODING_ASCII_LEGACY if !text.is_ascii() => Err(
            IgtlError::InvalidText(format!("{text:?} is not US-ASCII")),
        ),
        ENCODING_US_ASCII | ENCODING_ASCII_LEGACY | ENCODING_UTF8 => Ok(()),
        other => Err(IgtlError::UnsupportedStringEncoding(other)),
    }
}

/// STRING message content
///
/// # Wire layout
/// - ENCODING (uint16) - MIBenum
/// - LENGTH (uint16) - byte length of the text
/// - STRING (uint8[LENGTH])
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringBody {
    pub encoding: u16,
    pub text: String,
}

impl StringBody {
    /// US-ASCII string
    pub fn new(text: impl Into<String>) -> Self {
        StringBody {
            encoding: ENCODING_US_ASCII,
            text: text.into(),
        }
    }

    /// UTF-8 string
    pub fn utf8(text: impl Into<String>) -> Self {
        StringBody {
            encoding: ENCODING_UTF8,
            text: text.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl Message for StringBody {
    fn kind() -> MessageKind {
        MessageKind::String
    }

    fn encode_content(&self) -> Result<Vec<u8>> {
        validate_text(self.encoding, &self.text)?;
        let bytes = self.text.as_bytes();
        if bytes.len() > u16::MAX as usize {
            return Err(IgtlError::InvalidSize {
                expected: u16::MAX as usize,
                actual: bytes.len(),
            });
        }

        let mut buf = Vec::with_capacity(4 + bytes.len());
        buf.put_u16(self.encoding);
        buf.put_u16(bytes.len() as u16);
        buf.extend_from_slice(bytes);
        Ok(buf)
    }

    fn decode_content(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(IgtlError::TruncatedBody {
                expected: 4,
                actual: data.len(),
            });
        }

        let mut cursor = ByteCursor::new(data);
        let encoding = cursor.read_u16()?;
        let length = cursor.read_u16()? as usize;

        if cursor.remaining() < length {
            return Err(IgtlError::TruncatedBody {
                expected: 4 + length,
                actual: data.len(),
            });
        }
        if cursor.remaining() > length {
            return Err(IgtlError::InvalidSize {
                expected: 4 + length,
                actual: data.len(),
            });
        }

        let text = decode_text(encoding, cursor.read_bytes(length)?)?;
        Ok(StringBody { encoding, text })
    }
}

impl From<&str> for StringBody {
    fn from(s: &str) -> Self {
        StringBody::new(s)
    }
}
