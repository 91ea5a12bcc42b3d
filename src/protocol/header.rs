//! OpenIGTLink message header
//!
//! The header is a fixed 58-byte structure that precedes every message:
//!
//! ```text
//! u16 version | 12B type | 20B device | u64 timestamp | u64 body size | u64 crc64
//! ```
//!
//! Text fields are NUL-padded on encode; trailing NUL and space bytes are
//! trimmed on decode.

use crate::error::{IgtlError, Result};
use crate::protocol::cursor::ByteCursor;
use bytes::BufMut;

/// Fixed-width, NUL-padded ASCII field
macro_rules! padded_name {
    ($(#[$meta:meta])* $name:ident, $width:expr, $label:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name([u8; $width]);

        impl $name {
            /// Field width on the wire
            pub const WIDTH: usize = $width;

            /// Create from a string, rejecting non-ASCII values and values
            /// wider than the field
            pub fn new(name: &str) -> Result<Self> {
                if !name.is_ascii() {
                    return Err(IgtlError::InvalidHeader(format!(
                        "{} must be ASCII: {:?}",
                        $label, name
                    )));
                }
                if name.len() > $width {
                    return Err(IgtlError::InvalidHeader(format!(
                        "{} too long: {} bytes (max: {})",
                        $label,
                        name.len(),
                        $width
                    )));
                }
                let mut bytes = [0u8; $width];
                bytes[..name.len()].copy_from_slice(name.as_bytes());
                Ok($name(bytes))
            }

            /// The value with trailing NUL and space padding removed
            pub fn as_str(&self) -> Result<&str> {
                let len = self
                    .0
                    .iter()
                    .rposition(|&b| b != 0 && b != b' ')
                    .map_or(0, |last| last + 1);
                std::str::from_utf8(&self.0[..len]).map_err(|_| {
                    IgtlError::InvalidHeader(format!("Invalid UTF-8 in {}", $label))
                })
            }

            /// Raw padded bytes
            pub fn as_bytes(&self) -> &[u8; $width] {
                &self.0
            }
        }

        impl From<[u8; $width]> for $name {
            fn from(bytes: [u8; $width]) -> Self {
                $name(bytes)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str().unwrap_or("<invalid>"))
            }
        }
    };
}

padded_name!(
    /// Message type tag (12 bytes)
    TypeName,
    12,
    "type name"
);

padded_name!(
    /// Sending device name (20 bytes)
    DeviceName,
    20,
    "device name"
);

/// Message kinds this codec understands
///
/// Dispatch is by exact tag comparison; a tag that merely contains one of
/// these names (say `IMAGE2`) is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Transform,
    Image,
    PolyData,
    String,
}

impl MessageKind {
    /// All supported kinds
    pub const ALL: [MessageKind; 4] = [
        MessageKind::Transform,
        MessageKind::Image,
        MessageKind::PolyData,
        MessageKind::String,
    ];

    /// Wire tag for this kind
    pub fn type_name(self) -> &'static str {
        match self {
            MessageKind::Transform => "TRANSFORM",
            MessageKind::Image => "IMAGE",
            MessageKind::PolyData => "POLYDATA",
            MessageKind::String => "STRING",
        }
    }

    /// Resolve a trimmed wire tag
    ///
    /// # Examples
    ///
    /// ```
    /// use openigtlink_codec::protocol::header::MessageKind;
    ///
    /// assert_eq!(MessageKind::from_type_name("IMAGE").unwrap(), MessageKind::Image);
    /// assert!(MessageKind::from_type_name("IMAGE2").is_err());
    /// ```
    pub fn from_type_name(name: &str) -> Result<Self> {
        MessageKind::ALL
            .into_iter()
            .find(|kind| kind.type_name() == name)
            .ok_or_else(|| IgtlError::UnknownMessageType(name.to_string()))
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name())
    }
}

/// OpenIGTLink timestamp
///
/// Upper 32 bits are seconds since the Unix epoch, lower 32 bits a binary
/// fraction of a second. The codec carries it opaquely; the helpers exist for
/// callers that want wall-clock values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamp {
    pub seconds: u32,
    pub fraction: u32,
}

impl Timestamp {
    pub fn new(seconds: u32, fraction: u32) -> Self {
        Timestamp { seconds, fraction }
    }

    /// Zero timestamp, which peers read as "not set"
    pub fn zero() -> Self {
        Timestamp::default()
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        let fraction = (u64::from(now.subsec_nanos()) << 32) / 1_000_000_000;
        Timestamp {
            seconds: now.as_secs() as u32,
            fraction: fraction as u32,
        }
    }

    /// Packed wire value
    pub fn to_u64(self) -> u64 {
        (u64::from(self.seconds) << 32) | u64::from(self.fraction)
    }

    /// Unpack a wire value
    pub fn from_u64(value: u64) -> Self {
        Timestamp {
            seconds: (value >> 32) as u32,
            fraction: value as u32,
        }
    }

    /// Seconds as a float
    pub fn to_f64(self) -> f64 {
        f64::from(self.seconds) + f64::from(self.fraction) / (f64::from(u32::MAX) + 1.0)
    }
}

/// OpenIGTLink message header (58 bytes, big-endian)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Protocol version; 3 and above carry an extended header
    pub version: u16,
    pub type_name: TypeName,
    pub device_name: DeviceName,
    pub timestamp: Timestamp,
    /// Bytes after the header: extended header + content + metadata
    pub body_size: u64,
    /// CRC-64 over the `body_size` bytes that follow
    pub crc: u64,
}

impl Header {
    /// Header size in bytes
    pub const SIZE: usize = 58;

    /// First version whose body starts with an extended header
    pub const EXTENDED_VERSION: u16 = 3;

    /// Header for `kind` from `device_name`, sizes and CRC left at zero
    pub fn for_kind(kind: MessageKind, device_name: &str) -> Result<Self> {
        Ok(Header {
            version: 2,
            type_name: TypeName::new(kind.type_name())?,
            device_name: DeviceName::new(device_name)?,
            timestamp: Timestamp::now(),
            body_size: 0,
            crc: 0,
        })
    }

    /// Decode from the first 58 bytes of `buf`
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(IgtlError::TruncatedHeader { actual: buf.len() });
        }

        let mut cursor = ByteCursor::new(&buf[..Self::SIZE]);
        let version = cursor.read_u16()?;
        let type_name = TypeName::from(cursor.read_array::<12>()?);
        let device_name = DeviceName::from(cursor.read_array::<20>()?);
        let timestamp = Timestamp::from_u64(cursor.read_u64()?);
        let body_size = cursor.read_u64()?;
        let crc = cursor.read_u64()?;

        Ok(Header {
            version,
            type_name,
            device_name,
            timestamp,
            body_size,
            crc,
        })
    }

    /// Encode into exactly 58 bytes
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        let mut buf = &mut out[..];
        buf.put_u16(self.version);
        buf.put_slice(self.type_name.as_bytes());
        buf.put_slice(self.device_name.as_bytes());
        buf.put_u64(self.timestamp.to_u64());
        buf.put_u64(self.body_size);
        buf.put_u64(self.crc);
        out
    }

    /// Whether the body begins with an extended header
    pub fn has_extended_header(&self) -> bool {
        self.version >= Self::EXTENDED_VERSION
    }

    /// Resolve the message kind by exact tag match
    pub fn kind(&self) -> Result<MessageKind> {
        MessageKind::from_type_name(self.type_name.as_str()?)
    }
}
