//! Error types for OpenIGTLink codec and session operations
//!
//! Every decode failure is scoped to a single frame. The session pump reports
//! those errors and keeps going; transport and configuration failures end the
//! session. See [`IgtlError::is_frame_local`].

use thiserror::Error;

/// OpenIGTLink codec error types
///
/// All operations in this library return `Result<T, IgtlError>`.
#[derive(Error, Debug)]
pub enum IgtlError {
    /// Fewer than 58 bytes were available for the message header
    ///
    /// # Example
    /// ```
    /// # use openigtlink_codec::error::IgtlError;
    /// let err = IgtlError::TruncatedHeader { actual: 30 };
    /// assert_eq!(err.to_string(), "Truncated header: need 58 bytes, got 30");
    /// ```
    #[error("Truncated header: need 58 bytes, got {actual}")]
    TruncatedHeader {
        /// Number of bytes that were available
        actual: usize,
    },

    /// The body (extended header, content or metadata) ended early
    ///
    /// This error occurs when:
    /// - The frame holds fewer bytes than the header's body size declares
    /// - A body section declares more bytes than the frame still holds
    /// - A fixed-size content (TRANSFORM, IMAGE header) is cut short
    #[error("Truncated body: need {expected} bytes, got {actual}")]
    TruncatedBody {
        /// Bytes required by the declared layout
        expected: usize,
        /// Bytes actually present
        actual: usize,
    },

    /// CRC-64 mismatch between the header and the received body
    ///
    /// The frame is dropped. Retransmission, if any, is the transport's job.
    ///
    /// # Example
    /// ```
    /// # use openigtlink_codec::error::IgtlError;
    /// let err = IgtlError::CorruptMessage {
    ///     expected: 0x1234567890abcdef,
    ///     actual: 0x1234567890abcdee,
    /// };
    /// assert!(err.is_frame_local());
    /// ```
    #[error("Corrupt message: CRC expected {expected:#018x}, computed {actual:#018x}")]
    CorruptMessage {
        /// CRC carried in the message header
        expected: u64,
        /// CRC computed over the received body
        actual: u64,
    },

    /// IMAGE scalar type code outside the 8-value table
    #[error("Unsupported scalar type code: {0}")]
    UnsupportedScalarType(u8),

    /// STRING (or metadata value) encoding other than US-ASCII or UTF-8
    #[error("Unsupported string encoding (MIBenum {0})")]
    UnsupportedStringEncoding(u16),

    /// POLYDATA structure does not match its declared counts and sizes
    ///
    /// This error occurs when:
    /// - A cell list does not end exactly at its declared byte size
    /// - The number of cells differs from the declared count
    /// - An attribute's component count contradicts its semantic type
    /// - A point index refers past the end of the point list
    #[error("Malformed POLYDATA: {0}")]
    MalformedPolyData(String),

    /// An attribute name is missing its NUL terminator
    #[error("Malformed attribute names: name {index} is not NUL-terminated")]
    MalformedAttributeNames {
        /// Zero-based index of the offending name
        index: usize,
    },

    /// Message type tag is not one of TRANSFORM, IMAGE, POLYDATA, STRING
    ///
    /// Matching is exact: `IMAGE2` is not `IMAGE`.
    #[error("Unknown message type: {0:?}")]
    UnknownMessageType(String),

    /// A fixed-width read or write fell outside the buffer
    #[error("Out of range: {width} bytes at offset {offset} exceed buffer of {len}")]
    OutOfRange {
        /// Requested offset
        offset: usize,
        /// Width of the value in bytes
        width: usize,
        /// Buffer length
        len: usize,
    },

    /// Metadata block contradicts the extended header
    #[error("Malformed metadata: {0}")]
    MalformedMetadata(String),

    /// Invalid header field content (over-long names, bad extended header size)
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// A section holds more or fewer bytes than its layout requires
    #[error("Invalid size: expected {expected} bytes, got {actual}")]
    InvalidSize {
        /// Expected size in bytes
        expected: usize,
        /// Actual size in bytes
        actual: usize,
    },

    /// Text bytes are not valid for their declared encoding
    #[error("Invalid text: {0}")]
    InvalidText(String),

    /// CRC polynomial literal could not be parsed into 64 bits
    #[error("Invalid CRC polynomial: {0}")]
    InvalidPolynomial(String),

    /// Outbound image source uses a pixel format with no IMAGE equivalent
    ///
    /// Raised synchronously on the encode path; nothing is sent.
    #[error("Unsupported pixel format: {0}")]
    UnsupportedPixelFormat(String),

    /// Declared or encoded body exceeds the configured limit
    ///
    /// On receive this is terminal: the length field cannot be trusted, so the
    /// stream position is lost.
    #[error("Message body too large: {size} bytes (max: {max})")]
    BodyTooLarge {
        /// Body size in bytes
        size: u64,
        /// Maximum allowed size in bytes
        max: u64,
    },

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// The peer closed the connection
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// I/O error reported by the transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IgtlError {
    /// Whether the error only invalidates the current frame
    ///
    /// Frame-local errors are logged and the pump resumes at the next header.
    /// Anything else (I/O, closed connection, runaway body size, bad config)
    /// ends the session.
    pub fn is_frame_local(&self) -> bool {
        !matches!(
            self,
            IgtlError::Io(_)
                | IgtlError::ConnectionClosed
                | IgtlError::BodyTooLarge { .. }
                | IgtlError::Config(_)
                | IgtlError::InvalidPolynomial(_)
        )
    }
}

/// Result type alias for OpenIGTLink operations
pub type Result<T> = std::result::Result<T, IgtlError>;
