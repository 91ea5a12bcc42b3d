//! Message content types
//!
//! One module per supported message kind. Each content type implements
//! [`Message`](crate::protocol::message::Message).

pub mod image;
pub mod polydata;
pub mod string;
pub mod transform;

pub use image::{CoordinateSystem, Endian, ImageBody, PixelFormat, ScalarData, ScalarType};
pub use polydata::{Attribute, AttributeAssociation, AttributeKind, AttributeType, PolyDataBody};
pub use string::StringBody;
pub use transform::TransformBody;
