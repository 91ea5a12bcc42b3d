//! Runtime dispatch over the supported message kinds
//!
//! [`decode_any`] resolves the content type from the header's type tag by
//! exact comparison and decodes the frame into the matching [`AnyMessage`]
//! variant.

use crate::error::Result;
use crate::protocol::crc::Crc64;
use crate::protocol::header::{Header, MessageKind};
use crate::protocol::message::{checked_frame, split_body, IgtlMessage, Message};
use crate::protocol::metadata::Metadata;
use crate::protocol::types::{ImageBody, PolyDataBody, StringBody, TransformBody};

/// Any decoded OpenIGTLink message
///
/// # Examples
///
/// ```
/// use openigtlink_codec::protocol::{decode_any, AnyMessage, IgtlMessage};
/// use openigtlink_codec::protocol::crc::Crc64;
/// use openigtlink_codec::protocol::types::StringBody;
///
/// let frame = IgtlMessage::new(StringBody::new("ping"), "Console")?.encode()?;
/// match decode_any(&frame, Crc64::ecma182(), true)? {
///     AnyMessage::String(msg) => assert_eq!(msg.content.as_str(), "ping"),
///     other => panic!("unexpected {}", other.message_type()),
/// }
/// # Ok::<(), openigtlink_codec::IgtlError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum AnyMessage {
    Transform(IgtlMessage<TransformBody>),
    Image(IgtlMessage<ImageBody>),
    PolyData(IgtlMessage<PolyDataBody>),
    String(IgtlMessage<StringBody>),
}

impl AnyMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            AnyMessage::Transform(_) => MessageKind::Transform,
            AnyMessage::Image(_) => MessageKind::Image,
            AnyMessage::PolyData(_) => MessageKind::PolyData,
            AnyMessage::String(_) => MessageKind::String,
        }
    }

    /// Wire type tag
    pub fn message_type(&self) -> &'static str {
        self.kind().type_name()
    }

    pub fn header(&self) -> &Header {
        match self {
            AnyMessage::Transform(m) => &m.header,
            AnyMessage::Image(m) => &m.header,
            AnyMessage::PolyData(m) => &m.header,
            AnyMessage::String(m) => &m.header,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            AnyMessage::Transform(m) => &m.metadata,
            AnyMessage::Image(m) => &m.metadata,
            AnyMessage::PolyData(m) => &m.metadata,
            AnyMessage::String(m) => &m.metadata,
        }
    }

    /// Sending device name
    pub fn device_name(&self) -> Result<&str> {
        self.header().device_name.as_str()
    }

    /// Encode back into a frame
    pub fn encode_with(&self, crc: &Crc64) -> Result<Vec<u8>> {
        use crate::protocol::message::encode_message;
        match self {
            AnyMessage::Transform(m) => encode_message(m, crc),
            AnyMessage::Image(m) => encode_message(m, crc),
            AnyMessage::PolyData(m) => encode_message(m, crc),
            AnyMessage::String(m) => encode_message(m, crc),
        }
    }
}

fn assemble<T: Message>(header: Header, body: &[u8]) -> Result<IgtlMessage<T>> {
    let sections = split_body(&header, body)?;
    let content = T::decode_content(sections.content)?;
    Ok(IgtlMessage {
        header,
        extended_header: sections.extended_header,
        content,
        metadata: sections.metadata,
    })
}

/// Decode one complete frame of any supported kind
///
/// The CRC is checked before the type tag, so a corrupted frame reports
/// `CorruptMessage` even when its tag is also damaged.
pub fn decode_any(data: &[u8], crc: &Crc64, verify_crc: bool) -> Result<AnyMessage> {
    let (header, body) = checked_frame(data, crc, verify_crc)?;
    Ok(match header.kind()? {
        MessageKind::Transform => AnyMessage::Transform(assemble(header, body)?),
        MessageKind::Image => AnyMessage::Image(assemble(header, body)?),
        MessageKind::PolyData => AnyMessage::PolyData(assemble(header, body)?),
        MessageKind::String => AnyMessage::String(assemble(header, body)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IgtlError;
    use crate::protocol::header::TypeName;
    use crate::protocol::types::ScalarType;

    #[test]
    fn test_dispatch_each_kind() {
        let crc = Crc64::ecma182();
        let frames = vec![
            IgtlMessage::new(TransformBody::identity(), "T").unwrap().encode().unwrap(),
            IgtlMessage::new(
                ImageBody::new(ScalarType::Uint8, 1, [1, 1, 1], vec![5]).unwrap(),
                "I",
            )
            .unwrap()
            .encode()
            .unwrap(),
            IgtlMessage::new(PolyDataBody::new(vec![[0.0; 3]]), "P").unwrap().encode().unwrap(),
            IgtlMessage::new(StringBody::new("s"), "S").unwrap().encode().unwrap(),
        ];
        let kinds: Vec<MessageKind> = frames
            .iter()
            .map(|f| decode_any(f, crc, true).unwrap().kind())
            .collect();
        assert_eq!(kinds, MessageKind::ALL.to_vec());
    }

    #[test]
    fn test_unknown_type() {
        let mut msg = IgtlMessage::new(StringBody::new("x"), "Dev").unwrap();
        msg.header.type_name = TypeName::new("FOOBAR").unwrap();
        let frame = msg.encode().unwrap();
        assert!(matches!(
            decode_any(&frame, Crc64::ecma182(), true),
            Err(IgtlError::UnknownMessageType(name)) if name == "FOOBAR"
        ));
    }

    #[test]
    fn test_prefix_tag_is_not_a_match() {
        let mut msg = IgtlMessage::new(TransformBody::identity(), "Dev").unwrap();
        msg.header.type_name = TypeName::new("IMAGE2").unwrap();
        let frame = msg.encode().unwrap();
        assert!(matches!(
            decode_any(&frame, Crc64::ecma182(), true),
            Err(IgtlError::UnknownMessageType(_))
        ));
    }

    #[test]
    fn test_reencode_is_identical() {
        let frame = IgtlMessage::new(StringBody::utf8("ok"), "Dev")
            .unwrap()
            .with_metadata(Metadata::new().with_ascii("ModelName", "Dev"))
            .encode()
            .unwrap();
        let any = decode_any(&frame, Crc64::ecma182(), true).unwrap();
        assert_eq!(any.device_name().unwrap(), "Dev");
        assert_eq!(any.metadata().len(), 1);
        assert_eq!(any.encode_with(Crc64::ecma182()).unwrap(), frame);
    }
}
