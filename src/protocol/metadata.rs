//! Version 3 metadata block
//!
//! Metadata sits at the end of the body, after the content:
//!
//! ```text
//! u16 index_count
//! index_count x (u16 key_size, u16 value_encoding, u32 value_size)
//! index_count x (key bytes, value bytes)
//! ```
//!
//! The first two parts form the "metadata header" region whose byte length
//! the extended header records; the key/value bytes form the data region.
//! Entries keep their wire order.

use crate::error::{IgtlError, Result};
use crate::protocol::cursor::ByteCursor;
use crate::protocol::types::string::{decode_text, validate_text, ENCODING_US_ASCII};
use bytes::BufMut;

/// Bytes per entry in the index region
pub const INDEX_ENTRY_SIZE: usize = 8;

/// One metadata key/value pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
    /// ASCII key
    pub key: String,
    /// MIBenum of the value bytes
    pub encoding: u16,
    pub value: Vec<u8>,
}

impl MetadataEntry {
    /// US-ASCII text entry
    pub fn ascii(key: impl Into<String>, value: &str) -> Self {
        MetadataEntry {
            key: key.into(),
            encoding: ENCODING_US_ASCII,
            value: value.as_bytes().to_vec(),
        }
    }

    /// Value decoded according to its encoding
    pub fn value_str(&self) -> Result<String> {
        decode_text(self.encoding, &self.value)
    }
}

/// Ordered metadata entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<MetadataEntry>,
}

impl Metadata {
    pub fn new() -> Self {
        Metadata::default()
    }

    /// Append an entry, replacing the value of an existing key in place
    pub fn insert(&mut self, entry: MetadataEntry) {
        match self.entries.iter_mut().find(|e| e.key == entry.key) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Builder-style [`Metadata::insert`] of a US-ASCII value
    pub fn with_ascii(mut self, key: impl Into<String>, value: &str) -> Self {
        self.insert(MetadataEntry::ascii(key, value));
        self
    }

    pub fn get(&self, key: &str) -> Option<&MetadataEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MetadataEntry> {
        self.entries.iter()
    }

    /// Byte length of the index region, 0 when there are no entries
    pub fn header_size(&self) -> usize {
        if self.entries.is_empty() {
            0
        } else {
            2 + INDEX_ENTRY_SIZE * self.entries.len()
        }
    }

    /// Byte length of the key/value region
    pub fn data_size(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.key.len() + e.value.len())
            .sum()
    }
}

impl<'a> IntoIterator for &'a Metadata {
    type Item = &'a MetadataEntry;
    type IntoIter = std::slice::Iter<'a, MetadataEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<MetadataEntry> for Metadata {
    fn from_iter<I: IntoIterator<Item = MetadataEntry>>(iter: I) -> Self {
        let mut metadata = Metadata::new();
        for entry in iter {
            metadata.insert(entry);
        }
        metadata
    }
}

/// Decode `declared_count` entries starting at `offset`
///
/// `declared_count` comes from the extended header and must agree with the
/// index count stored on the wire, which is read even when it is zero. With
/// `offset` at the end of `bytes` there is no index region and nothing is
/// decoded. Returns the entries and the number of bytes consumed from
/// `offset`. Any read past the end of `bytes` is an error.
pub fn decode_metadata(
    bytes: &[u8],
    offset: usize,
    declared_count: usize,
) -> Result<(Metadata, usize)> {
    if declared_count == 0 && offset == bytes.len() {
        return Ok((Metadata::new(), 0));
    }

    let mut cursor = ByteCursor::new(bytes);
    cursor.seek(offset)?;

    let index_count = cursor.read_u16()? as usize;
    if index_count != declared_count {
        return Err(IgtlError::MalformedMetadata(format!(
            "index count {} does not match declared {}",
            index_count, declared_count
        )));
    }

    let mut sizes = Vec::with_capacity(index_count);
    for _ in 0..index_count {
        let key_size = cursor.read_u16()? as usize;
        let encoding = cursor.read_u16()?;
        let value_size = cursor.read_u32()? as usize;
        sizes.push((key_size, encoding, value_size));
    }

    let mut metadata = Metadata {
        entries: Vec::with_capacity(index_count),
    };
    for (i, (key_size, encoding, value_size)) in sizes.into_iter().enumerate() {
        let key_bytes = cursor.read_bytes(key_size)?;
        if !key_bytes.is_ascii() {
            return Err(IgtlError::MalformedMetadata(format!(
                "key {} is not ASCII",
                i
            )));
        }
        let key = String::from_utf8_lossy(key_bytes).into_owned();
        let value = cursor.read_bytes(value_size)?.to_vec();
        metadata.entries.push(MetadataEntry {
            key,
            encoding,
            value,
        });
    }

    Ok((metadata, cursor.position() - offset))
}

/// Encode into `(index region, key/value region)`
///
/// The index region includes the leading entry count. An empty set encodes
/// to two empty regions.
pub fn encode_metadata(metadata: &Metadata) -> Result<(Vec<u8>, Vec<u8>)> {
    if metadata.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }
    if metadata.len() > u16::MAX as usize {
        return Err(IgtlError::MalformedMetadata(format!(
            "{} entries (max: {})",
            metadata.len(),
            u16::MAX
        )));
    }

    let mut header = Vec::with_capacity(metadata.header_size());
    let mut data = Vec::with_capacity(metadata.data_size());
    header.put_u16(metadata.len() as u16);

    for entry in metadata {
        if !entry.key.is_ascii() || entry.key.len() > u16::MAX as usize {
            return Err(IgtlError::MalformedMetadata(format!(
                "key {:?} must be ASCII and at most {} bytes",
                entry.key,
                u16::MAX
            )));
        }
        if entry.value.len() > u32::MAX as usize {
            return Err(IgtlError::MalformedMetadata(format!(
                "value of {:?} is too large",
                entry.key
            )));
        }
        if let Ok(text) = std::str::from_utf8(&entry.value) {
            validate_text(entry.encoding, text)?;
        }

        header.put_u16(entry.key.len() as u16);
        header.put_u16(entry.encoding);
        header.put_u32(entry.value.len() as u32);
        data.extend_from_slice(entry.key.as_bytes());
        data.extend_from_slice(&entry.value);
    }

    Ok((header, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_name() -> Metadata {
        Metadata::new().with_ascii("ModelName", "Probe1")
    }

    #[test]
    fn test_encode_layout() {
        let (header, data) = encode_metadata(&model_name()).unwrap();
        assert_eq!(
            header,
            vec![
                0x00, 0x01, // index count
                0x00, 0x09, // key size
                0x00, 0x03, // US-ASCII
                0x00, 0x00, 0x00, 0x06, // value size
            ]
        );
        assert_eq!(data, b"ModelNameProbe1".to_vec());
    }

    #[test]
    fn test_model_name_roundtrip() {
        let (header, data) = encode_metadata(&model_name()).unwrap();
        let mut block = header.clone();
        block.extend_from_slice(&data);

        let (decoded, consumed) = decode_metadata(&block, 0, 1).unwrap();
        assert_eq!(consumed, block.len());
        assert_eq!(decoded.len(), 1);
        let entry = decoded.get("ModelName").unwrap();
        assert_eq!(entry.encoding, 3);
        assert_eq!(entry.value_str().unwrap(), "Probe1");
    }

    #[test]
    fn test_decode_at_offset_keeps_order() {
        let metadata: Metadata = vec![
            MetadataEntry::ascii("b", "2"),
            MetadataEntry::ascii("a", "1"),
            MetadataEntry {
                key: "unit".into(),
                encoding: 106,
                value: "µm".as_bytes().to_vec(),
            },
        ]
        .into_iter()
        .collect();
        let (header, data) = encode_metadata(&metadata).unwrap();
        assert_eq!(header.len(), metadata.header_size());
        assert_eq!(data.len(), metadata.data_size());

        let mut buf = vec![0xEE; 5];
        buf.extend_from_slice(&header);
        buf.extend_from_slice(&data);

        let (decoded, consumed) = decode_metadata(&buf, 5, 3).unwrap();
        assert_eq!(consumed, buf.len() - 5);
        let keys: Vec<&str> = decoded.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["b", "a", "unit"]);
        assert_eq!(decoded.get("unit").unwrap().value_str().unwrap(), "µm");
    }

    #[test]
    fn test_count_mismatch() {
        let (mut block, data) = encode_metadata(&model_name()).unwrap();
        block.extend_from_slice(&data);
        assert!(matches!(
            decode_metadata(&block, 0, 2),
            Err(IgtlError::MalformedMetadata(_))
        ));
    }

    #[test]
    fn test_truncated_block() {
        let (mut block, data) = encode_metadata(&model_name()).unwrap();
        block.extend_from_slice(&data[..data.len() - 1]);
        assert!(matches!(
            decode_metadata(&block, 0, 1),
            Err(IgtlError::OutOfRange { .. })
        ));
        assert!(decode_metadata(&block, block.len() + 1, 1).is_err());
    }

    #[test]
    fn test_empty() {
        assert_eq!(encode_metadata(&Metadata::new()).unwrap(), (vec![], vec![]));
        let (decoded, consumed) = decode_metadata(&[], 0, 0).unwrap();
        assert!(decoded.is_empty());
        assert_eq!(consumed, 0);
    }

    #[test]
    fn test_zero_entry_index() {
        let (decoded, consumed) = decode_metadata(&[0xAB, 0x00, 0x00], 1, 0).unwrap();
        assert!(decoded.is_empty());
        assert_eq!(consumed, 2);

        assert!(matches!(
            decode_metadata(&[0x00, 0x01], 0, 0),
            Err(IgtlError::MalformedMetadata(_))
        ));
    }

    #[test]
    fn test_insert_replaces_existing_key() {
        let metadata = model_name().with_ascii("ModelName", "Probe2");
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata.get("ModelName").unwrap().value, b"Probe2");
    }

    #[test]
    fn test_encode_rejects_non_ascii_key() {
        let metadata = Metadata::new().with_ascii("Modèle", "x");
        assert!(encode_metadata(&metadata).is_err());
    }
}
