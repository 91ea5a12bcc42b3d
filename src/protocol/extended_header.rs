//! Version 3 extended header
//!
//! When the header version is 3 or above, the body opens with this block. It
//! declares how much of the body tail is metadata, so the content window is
//! `body[size..body_size - metadata_header_size - metadata_size]`.

use crate::error::{IgtlError, Result};
use crate::protocol::cursor::ByteCursor;
use bytes::BufMut;

/// Extended header (12 bytes, big-endian)
///
/// # Structure
/// - extended_header_size (2 bytes) - Size of this block, 12 for the standard layout
/// - metadata_header_size (2 bytes) - Bytes in the metadata index region,
///   including its 2-byte entry count
/// - metadata_size (4 bytes) - Bytes in the metadata key/value region
/// - message_id (4 bytes) - Sender-assigned identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedHeader {
    pub extended_header_size: u16,
    pub metadata_header_size: u16,
    pub metadata_size: u32,
    pub message_id: u32,
    /// Bytes past the standard 12, kept opaque
    pub additional_fields: Vec<u8>,
}

impl ExtendedHeader {
    /// Standard extended header size
    pub const SIZE: usize = 12;

    pub fn new() -> Self {
        ExtendedHeader {
            extended_header_size: Self::SIZE as u16,
            metadata_header_size: 0,
            metadata_size: 0,
            message_id: 0,
            additional_fields: Vec::new(),
        }
    }

    /// Extended header describing a metadata block of the given region sizes
    pub fn with_metadata(metadata_header_size: u16, metadata_size: u32) -> Self {
        ExtendedHeader {
            metadata_header_size,
            metadata_size,
            ..Self::new()
        }
    }

    /// Decode from the start of a message body
    ///
    /// # Errors
    /// - `TruncatedBody` if fewer than 12 bytes (or fewer than the declared
    ///   size) are available
    /// - `InvalidHeader` if the declared size is below 12
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(IgtlError::TruncatedBody {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }

        let mut cursor = ByteCursor::new(data);
        let extended_header_size = cursor.read_u16()?;
        let declared = extended_header_size as usize;
        if declared < Self::SIZE {
            return Err(IgtlError::InvalidHeader(format!(
                "extended header size {} is below {}",
                declared,
                Self::SIZE
            )));
        }
        if declared > data.len() {
            return Err(IgtlError::TruncatedBody {
                expected: declared,
                actual: data.len(),
            });
        }

        let metadata_header_size = cursor.read_u16()?;
        let metadata_size = cursor.read_u32()?;
        let message_id = cursor.read_u32()?;
        let additional_fields = cursor.read_bytes(declared - Self::SIZE)?.to_vec();

        Ok(ExtendedHeader {
            extended_header_size,
            metadata_header_size,
            metadata_size,
            message_id,
            additional_fields,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size());
        buf.put_u16(self.extended_header_size);
        buf.put_u16(self.metadata_header_size);
        buf.put_u32(self.metadata_size);
        buf.put_u32(self.message_id);
        buf.extend_from_slice(&self.additional_fields);
        buf
    }

    /// Declared size in bytes; content starts at this body offset
    pub fn size(&self) -> usize {
        self.extended_header_size as usize
    }

    /// Total bytes of metadata at the end of the body
    pub fn metadata_len(&self) -> usize {
        self.metadata_header_size as usize + self.metadata_size as usize
    }

    /// Whether an index region follows the content, possibly with no entries
    pub fn has_metadata(&self) -> bool {
        self.metadata_header_size > 0
    }

    /// Number of metadata entries implied by `metadata_header_size`
    ///
    /// The index region is a 2-byte count followed by 8 bytes per entry, so
    /// any other length is malformed.
    pub fn metadata_count(&self) -> Result<usize> {
        let header_size = self.metadata_header_size as usize;
        if header_size == 0 {
            return if self.metadata_size == 0 {
                Ok(0)
            } else {
                Err(IgtlError::MalformedMetadata(format!(
                    "{} data bytes without an index region",
                    self.metadata_size
                )))
            };
        }
        if header_size < 2 || (header_size - 2) % 8 != 0 {
            return Err(IgtlError::MalformedMetadata(format!(
                "index region of {} bytes is not 2 + 8*n",
                header_size
            )));
        }
        Ok((header_size - 2) / 8)
    }
}

impl Default for ExtendedHeader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let ext = ExtendedHeader {
            extended_header_size: 12,
            metadata_header_size: 0x000A,
            metadata_size: 0x0000_000F,
            message_id: 0x1122_3344,
            additional_fields: Vec::new(),
        };
        assert_eq!(
            ext.encode(),
            vec![0x00, 0x0C, 0x00, 0x0A, 0x00, 0x00, 0x00, 0x0F, 0x11, 0x22, 0x33, 0x44]
        );
    }

    #[test]
    fn test_decode_metadata_fields() {
        let data = [
            0x00, 0x0C, // size
            0x00, 0x0A, // one entry: 2 + 8
            0x00, 0x00, 0x00, 0x0F, // "ModelName" + "Probe1"
            0x00, 0x00, 0x00, 0x07, // message id
        ];
        let ext = ExtendedHeader::decode(&data).unwrap();
        assert_eq!(ext.size(), 12);
        assert_eq!(ext.metadata_count().unwrap(), 1);
        assert_eq!(ext.metadata_len(), 25);
        assert_eq!(ext.message_id, 7);
    }

    #[test]
    fn test_additional_fields_preserved() {
        let mut data = ExtendedHeader::new().encode();
        data[1] = 16;
        data.extend_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD]);

        let ext = ExtendedHeader::decode(&data).unwrap();
        assert_eq!(ext.size(), 16);
        assert_eq!(ext.additional_fields, vec![0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(ext.encode(), data);
    }

    #[test]
    fn test_decode_short() {
        let result = ExtendedHeader::decode(&[0u8; 10]);
        assert!(matches!(result, Err(IgtlError::TruncatedBody { expected: 12, actual: 10 })));

        let mut data = ExtendedHeader::new().encode();
        data[1] = 20;
        assert!(matches!(
            ExtendedHeader::decode(&data),
            Err(IgtlError::TruncatedBody { expected: 20, .. })
        ));
    }

    #[test]
    fn test_decode_undersized_declaration() {
        let mut data = ExtendedHeader::new().encode();
        data[1] = 8;
        assert!(matches!(ExtendedHeader::decode(&data), Err(IgtlError::InvalidHeader(_))));
    }

    #[test]
    fn test_metadata_count_validation() {
        assert_eq!(ExtendedHeader::new().metadata_count().unwrap(), 0);
        assert_eq!(ExtendedHeader::with_metadata(26, 40).metadata_count().unwrap(), 3);
        assert!(ExtendedHeader::with_metadata(9, 4).metadata_count().is_err());
        assert!(ExtendedHeader::with_metadata(0, 4).metadata_count().is_err());
    }
}
