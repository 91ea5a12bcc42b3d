//! Wire Compatibility Tests
//!
//! Byte-level checks of the frames this library produces, so that peers such
//! as 3D Slicer's OpenIGTLinkIF module read exactly what they expect.

use crc::{Crc, CRC_64_ECMA_182};
use openigtlink_codec::protocol::crc::Crc64;
use openigtlink_codec::protocol::header::{Header, Timestamp};
use openigtlink_codec::protocol::message::{IgtlMessage, Message};
use openigtlink_codec::protocol::types::{
    Attribute, AttributeKind, AttributeType, ImageBody, PolyDataBody, ScalarType, StringBody,
    TransformBody,
};
use openigtlink_codec::protocol::{decode_any, AnyMessage, Metadata};
use openigtlink_codec::IgtlError;

fn be_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

fn be_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes(bytes[at..at + 4].try_into().unwrap())
}

fn be_u64(bytes: &[u8], at: usize) -> u64 {
    u64::from_be_bytes(bytes[at..at + 8].try_into().unwrap())
}

fn be_f32(bytes: &[u8], at: usize) -> f32 {
    f32::from_be_bytes(bytes[at..at + 4].try_into().unwrap())
}

/// Header fields at their fixed offsets
#[test]
fn test_header_layout() {
    let frame = IgtlMessage::new(TransformBody::identity(), "Tracker")
        .unwrap()
        .with_timestamp(Timestamp::new(0x01020304, 0x05060708))
        .encode()
        .unwrap();

    assert_eq!(be_u16(&frame, 0), 2);
    assert_eq!(&frame[2..11], b"TRANSFORM");
    assert!(frame[11..14].iter().all(|&b| b == 0));
    assert_eq!(&frame[14..21], b"Tracker");
    assert!(frame[21..34].iter().all(|&b| b == 0));
    assert_eq!(be_u64(&frame, 34), 0x0102030405060708);
    assert_eq!(be_u64(&frame, 42), 48);
    assert_eq!(frame.len(), Header::SIZE + 48);
}

/// The header CRC agrees with an independent CRC-64/ECMA-182 implementation
#[test]
fn test_crc_matches_reference() {
    let frame = IgtlMessage::new(StringBody::new("checksum me"), "Console")
        .unwrap()
        .encode()
        .unwrap();
    let reference = Crc::<u64>::new(&CRC_64_ECMA_182);
    assert_eq!(be_u64(&frame, 50), reference.checksum(&frame[Header::SIZE..]));
    assert_eq!(
        Crc64::ecma182().checksum(b"123456789"),
        reference.checksum(b"123456789")
    );
}

/// TRANSFORM content is row-major: R11 R12 R13 TX ... R31 R32 R33 TZ
#[test]
fn test_transform_row_major() {
    let mut transform = TransformBody::translation(10.0, 20.0, 30.0);
    transform.matrix[0][1] = 0.5;
    let body = transform.encode_content().unwrap();

    assert_eq!(body.len(), 48);
    assert_eq!(be_f32(&body, 0), 1.0);
    assert_eq!(be_f32(&body, 4), 0.5);
    assert_eq!(be_f32(&body, 12), 10.0);
    assert_eq!(be_f32(&body, 28), 20.0);
    assert_eq!(be_f32(&body, 44), 30.0);
}

/// IMAGE content header is 72 bytes followed by the payload
#[test]
fn test_image_layout() {
    let image = ImageBody::new(ScalarType::Uint16, 1, [2, 1, 1], vec![0x01, 0x02, 0x03, 0x04])
        .unwrap();
    let body = image.encode_content().unwrap();

    assert_eq!(body.len(), 72 + 4);
    assert_eq!(be_u16(&body, 0), 1); // version
    assert_eq!(body[2], 1); // components
    assert_eq!(body[3], 5); // uint16
    assert_eq!(body[4], 1); // big endian
    assert_eq!(body[5], 1); // RAS
    assert_eq!(be_u16(&body, 6), 2);
    assert_eq!(be_u16(&body, 8), 1);
    assert_eq!(be_u16(&body, 10), 1);
    assert_eq!(be_f32(&body, 12), 1.0);
    assert_eq!(be_u16(&body, 66), 2); // sub-volume size x
    assert_eq!(&body[72..], &[0x01, 0x02, 0x03, 0x04]);
}

/// POLYDATA counts, cells, attribute header and padded names
#[test]
fn test_polydata_layout() {
    let mut polydata = PolyDataBody::new(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]])
        .with_polygons(vec![vec![0, 1, 2]]);
    polydata.add_attribute(Attribute::new(
        AttributeType::point(AttributeKind::Scalars),
        1,
        "ab",
        vec![0.0, 0.5, 1.0],
    ));
    let body = polydata.encode_content().unwrap();

    assert_eq!(be_u32(&body, 0), 3); // points
    assert_eq!(be_u32(&body, 4), 0); // vertices
    assert_eq!(be_u32(&body, 20), 1); // polygons
    assert_eq!(be_u32(&body, 24), 16); // polygon section bytes
    assert_eq!(be_u32(&body, 36), 1); // attributes

    let cells = 40 + 36;
    assert_eq!(be_u32(&body, cells), 3);
    assert_eq!(be_u32(&body, cells + 12), 2);

    let attribute_header = cells + 16;
    assert_eq!(be_u16(&body, attribute_header), 0x0100); // 1 component, point scalars
    assert_eq!(be_u32(&body, attribute_header + 2), 3);

    let names = attribute_header + 6;
    assert_eq!(&body[names..names + 4], b"ab\0\0");
    assert_eq!(be_f32(&body, names + 4 + 4), 0.5);
    assert_eq!(body.len(), names + 4 + 12);
}

/// STRING content: encoding, length, bytes
#[test]
fn test_string_layout() {
    let body = StringBody::new("Hi").encode_content().unwrap();
    assert_eq!(body, vec![0x00, 0x03, 0x00, 0x02, b'H', b'i']);
}

/// Version 3 frame with `ModelName` metadata
#[test]
fn test_model_name_metadata_layout() {
    let frame = IgtlMessage::new(StringBody::new("x"), "Probe1")
        .unwrap()
        .with_metadata(Metadata::new().with_ascii("ModelName", "Probe1"))
        .encode()
        .unwrap();

    assert_eq!(be_u16(&frame, 0), 3);
    let body = &frame[Header::SIZE..];
    assert_eq!(be_u16(body, 0), 12); // extended header size
    assert_eq!(be_u16(body, 2), 2 + 8); // metadata header size
    assert_eq!(be_u32(body, 4), 9 + 6); // metadata size

    let index = 12 + 5;
    assert_eq!(be_u16(body, index), 1);
    assert_eq!(be_u16(body, index + 2), 9);
    assert_eq!(be_u16(body, index + 4), 3);
    assert_eq!(be_u32(body, index + 6), 6);
    assert_eq!(&body[index + 10..], b"ModelNameProbe1");

    match decode_any(&frame, Crc64::ecma182(), true).unwrap() {
        AnyMessage::String(msg) => {
            assert_eq!(msg.metadata.len(), 1);
            let entry = msg.metadata.get("ModelName").unwrap();
            assert_eq!(entry.encoding, 3);
            assert_eq!(entry.value_str().unwrap(), "Probe1");
        }
        other => panic!("unexpected {}", other.message_type()),
    }
}

/// A single flipped bit anywhere in the body is caught
#[test]
fn test_single_bit_flip_detected() {
    let frame = IgtlMessage::new(
        ImageBody::new(ScalarType::Uint8, 1, [4, 4, 1], (0..16).collect()).unwrap(),
        "Scanner",
    )
    .unwrap()
    .encode()
    .unwrap();

    for at in Header::SIZE..frame.len() {
        for bit in 0..8 {
            let mut corrupted = frame.clone();
            corrupted[at] ^= 1 << bit;
            assert!(matches!(
                decode_any(&corrupted, Crc64::ecma182(), true),
                Err(IgtlError::CorruptMessage { .. })
            ));
        }
    }
}
