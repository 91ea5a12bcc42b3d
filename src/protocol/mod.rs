//! OpenIGTLink wire format
//!
//! Everything here is pure: functions take byte slices and return owned
//! values, with no I/O and no state shared between calls.

pub mod any_message;
pub mod crc;
pub mod cursor;
pub mod extended_header;
pub mod header;
pub mod message;
pub mod metadata;
pub mod types;

pub use any_message::{decode_any, AnyMessage};
pub use crc::{calculate_crc, verify_crc, Crc64};
pub use extended_header::ExtendedHeader;
pub use header::{DeviceName, Header, MessageKind, Timestamp, TypeName};
pub use message::{decode_message, encode_message, IgtlMessage, Message};
pub use metadata::{decode_metadata, encode_metadata, Metadata, MetadataEntry};
