//! Asynchronous session pump
//!
//! [`AsyncSession`] runs the same framing and dispatch as
//! [`Session`](crate::io::Session) over any tokio `AsyncRead + AsyncWrite`
//! stream. Reads are cancellation safe: dropping a pending [`AsyncSession::recv`]
//! loses no buffered bytes.

use crate::config::SessionConfig;
use crate::error::{IgtlError, Result};
use crate::io::framer::FrameAssembler;
use crate::io::outbound::{ChangeTracker, OutboundEncoder};
use crate::io::session::{frame_event, stall_event, SessionEvent};
use crate::protocol::crc::Crc64;
use crate::protocol::message::{IgtlMessage, Message};
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

/// Asynchronous OpenIGTLink session
///
/// # Examples
///
/// ```no_run
/// use openigtlink_codec::config::SessionConfig;
/// use openigtlink_codec::io::{AsyncSession, SessionEvent};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut session = AsyncSession::connect(&SessionConfig::default()).await?;
///     session
///         .run_until(tokio::signal::ctrl_c(), |event| {
///             if let SessionEvent::Message(msg) = event {
///                 println!("{}", msg.message_type());
///             }
///         })
///         .await?;
///     Ok(())
/// }
/// ```
pub struct AsyncSession<S> {
    stream: S,
    assembler: FrameAssembler,
    crc: Crc64,
    verify_crc: bool,
    stall_timeout: Option<Duration>,
    read_buf: Vec<u8>,
    outbound: OutboundEncoder,
}

impl AsyncSession<TcpStream> {
    /// Connect over TCP to the configured host and port
    pub async fn connect(config: &SessionConfig) -> Result<Self> {
        config.validate()?;
        info!(addr = %config.address(), "Connecting to OpenIGTLink peer (async)");
        let stream = TcpStream::connect((config.host.as_str(), config.port)).await?;
        stream.set_nodelay(true)?;
        info!(
            local_addr = ?stream.local_addr().ok(),
            "Connected to OpenIGTLink peer (async)"
        );
        AsyncSession::new(stream, config)
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncSession<S> {
    /// Session over an already connected stream
    pub fn new(stream: S, config: &SessionConfig) -> Result<Self> {
        config.validate()?;
        let crc = config.crc_engine()?;
        if !config.verify_crc {
            warn!("CRC verification disabled - use only in trusted environments");
        }
        Ok(AsyncSession {
            stream,
            assembler: FrameAssembler::new(config.max_body_size),
            outbound: OutboundEncoder::new(
                crc.clone(),
                config.max_body_size,
                config.model_name_metadata,
            ),
            crc,
            verify_crc: config.verify_crc,
            stall_timeout: config.stall_timeout(),
            read_buf: vec![0u8; config.read_chunk_size],
        })
    }

    /// Wait for the next event
    ///
    /// # Errors
    /// Only terminal errors, as for [`Session::poll`](crate::io::Session::poll).
    pub async fn recv(&mut self) -> Result<SessionEvent> {
        loop {
            if let Some(frame) = self.assembler.next_frame()? {
                return frame_event(&frame, &self.crc, self.verify_crc);
            }
            if let Some(event) = stall_event(&mut self.assembler, self.stall_timeout) {
                return Ok(event);
            }

            let wait = self
                .stall_timeout
                .and_then(|timeout| self.assembler.until_stall(timeout));
            let read = self.stream.read(&mut self.read_buf);
            let n = match wait {
                Some(wait) => match tokio::time::timeout(wait, read).await {
                    Ok(result) => result?,
                    // the stall is reported on the next pass
                    Err(_) => continue,
                },
                None => read.await?,
            };

            if n == 0 {
                if self.assembler.buffered() > 0 {
                    warn!(
                        buffered = self.assembler.buffered(),
                        "Connection closed mid-frame"
                    );
                }
                return Err(IgtlError::ConnectionClosed);
            }
            self.assembler.push(&self.read_buf[..n]);
        }
    }

    /// Receive until `shutdown` completes or the connection ends
    ///
    /// `shutdown` is only observed while waiting for bytes, so a frame is
    /// never abandoned half-decoded. A peer that closes on a frame boundary
    /// ends the run cleanly.
    pub async fn run_until<F, T, H>(&mut self, shutdown: F, mut handler: H) -> Result<()>
    where
        F: Future<Output = T>,
        H: FnMut(SessionEvent),
    {
        info!("Session pump started (async)");
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    debug!("Session pump cancelled");
                    return Ok(());
                }
                event = self.recv() => match event {
                    Ok(event) => handler(event),
                    Err(IgtlError::ConnectionClosed) if self.assembler.buffered() == 0 => {
                        info!("Peer closed the connection");
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                },
            }
        }
    }

    /// Encode and send `message`
    ///
    /// Returns `false` when the content is unchanged since the last send for
    /// the same device and kind.
    pub async fn send<M: Message + Clone>(&mut self, message: &IgtlMessage<M>) -> Result<bool> {
        let frame = match self.outbound.prepare(message)? {
            Some(frame) => frame,
            None => return Ok(false),
        };
        let written = match self.stream.write_all(&frame.bytes).await {
            Ok(()) => self.stream.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            self.outbound.sent_failed(frame);
            return Err(e.into());
        }
        trace!(bytes = frame.bytes.len(), "Message sent (async)");
        Ok(true)
    }

    /// Outbound change records, e.g. to force a resend
    pub fn change_tracker(&mut self) -> &mut ChangeTracker {
        self.outbound.tracker_mut()
    }

    /// Bytes received but not yet part of a complete frame
    pub fn buffered(&self) -> usize {
        self.assembler.buffered()
    }

    /// Shut down the write half
    pub async fn close(mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
