//! Session I/O for OpenIGTLink connections
//!
//! The [`FrameAssembler`] turns a fragmented byte stream into complete frames
//! without doing any I/O itself. [`Session`] drives it over a blocking
//! [`Transport`], [`AsyncSession`] over a tokio stream.

pub mod async_session;
pub mod framer;
pub mod outbound;
pub mod session;
pub mod transport;

pub use async_session::AsyncSession;
pub use framer::{Frame, FrameAssembler, Stall};
pub use outbound::{with_model_name, ChangeTracker, MODEL_NAME_KEY};
pub use session::{Session, SessionEvent, IDLE_READ_TIMEOUT};
pub use transport::{TcpTransport, Transport};
