//! OpenIGTLink codec and session pump
//!
//! This library implements the wire format used by 3D Slicer and other
//! image-guided therapy tools to stream poses, volumes, surface meshes and
//! text over TCP, together with a framer that reassembles messages from a
//! fragmented byte stream.
//!
//! # Features
//!
//! - **Four message kinds** - TRANSFORM, IMAGE, POLYDATA and STRING
//! - **Protocol versions 2 and 3** - extended header and key/value metadata
//! - **Configurable CRC-64** - ECMA-182 by default, any 64-bit polynomial
//! - **Fragmentation safe** - frames are only decoded once every byte arrived
//! - **Blocking and async sessions** - the same sans-IO framer under both
//! - **Mesh reconstruction** - POLYDATA polygons and strips to triangle lists
//!
//! # Quick Start
//!
//! ## Encoding and decoding
//!
//! ```
//! use openigtlink_codec::protocol::{decode_any, AnyMessage, IgtlMessage, Metadata};
//! use openigtlink_codec::protocol::crc::Crc64;
//! use openigtlink_codec::protocol::types::TransformBody;
//!
//! let msg = IgtlMessage::new(TransformBody::translation(10.0, 0.0, -5.0), "Needle")?
//!     .with_metadata(Metadata::new().with_ascii("ModelName", "Needle"));
//! let frame = msg.encode()?;
//!
//! match decode_any(&frame, Crc64::ecma182(), true)? {
//!     AnyMessage::Transform(decoded) => {
//!         assert_eq!(decoded.content.position(), [10.0, 0.0, -5.0]);
//!         assert_eq!(decoded.metadata.get("ModelName").unwrap().value_str()?, "Needle");
//!     }
//!     other => panic!("unexpected {}", other.message_type()),
//! }
//! # Ok::<(), openigtlink_codec::IgtlError>(())
//! ```
//!
//! ## Receiving from Slicer
//!
//! ```no_run
//! use openigtlink_codec::config::SessionConfig;
//! use openigtlink_codec::io::{Session, SessionEvent};
//! use openigtlink_codec::mesh::TriangleMesh;
//! use openigtlink_codec::protocol::AnyMessage;
//! use std::sync::atomic::AtomicBool;
//!
//! let config = SessionConfig::from_env()?;
//! let mut session = Session::connect(&config)?;
//! let cancel = AtomicBool::new(false);
//!
//! session.run(&cancel, |event| match event {
//!     SessionEvent::Message(AnyMessage::PolyData(msg)) => {
//!         if let Ok(mesh) = TriangleMesh::from_polydata(&msg.content) {
//!             println!("{} triangles", mesh.triangle_count());
//!         }
//!     }
//!     SessionEvent::Message(other) => println!("{}", other.message_type()),
//!     SessionEvent::Dropped(err) => eprintln!("dropped frame: {err}"),
//!     SessionEvent::Stalled { buffered, .. } => eprintln!("{buffered} bytes stalled"),
//! })?;
//! # Ok::<(), openigtlink_codec::IgtlError>(())
//! ```
//!
//! ## Sending an image
//!
//! ```no_run
//! use openigtlink_codec::config::SessionConfig;
//! use openigtlink_codec::io::Session;
//! use openigtlink_codec::protocol::IgtlMessage;
//! use openigtlink_codec::protocol::types::{ImageBody, ScalarType};
//!
//! let mut session = Session::connect(&SessionConfig::default())?;
//! let image = ImageBody::new(ScalarType::Uint8, 1, [256, 256, 1], vec![0u8; 256 * 256])?;
//! session.send(&IgtlMessage::new(image, "Camera")?)?;
//! # Ok::<(), openigtlink_codec::IgtlError>(())
//! ```
//!
//! # Architecture
//!
//! - **`protocol`** - pure wire format
//!   - `header` / `extended_header` / `metadata` - framing sections
//!   - `types` - the four content codecs
//!   - `crc` - table-driven CRC-64
//!   - `any_message` - dispatch by exact type tag
//! - **`io`** - framer, change tracking, blocking and tokio sessions
//! - **`mesh`** - triangle lists from POLYDATA
//! - **`config`** - `SessionConfig` with serde and environment overrides
//! - **`error`** - `IgtlError` and `Result<T>`
//!
//! # Error Handling
//!
//! Decode errors only ever concern one frame. The session pumps report them
//! as [`io::SessionEvent::Dropped`] and carry on with the next header; only
//! transport failures, a closed connection or an untrustworthy body length
//! end a session.
//!
//! ```
//! use openigtlink_codec::IgtlError;
//!
//! let err = IgtlError::UnknownMessageType("FOOBAR".into());
//! assert!(err.is_frame_local());
//! assert!(!IgtlError::ConnectionClosed.is_frame_local());
//! ```

pub mod config;
pub mod error;
pub mod io;
pub mod mesh;
pub mod protocol;

pub use error::{IgtlError, Result};
