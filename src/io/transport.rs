//! Blocking byte-stream transports

use crate::error::Result;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;
use tracing::{debug, info};

/// Byte stream a [`Session`](crate::io::Session) runs over
///
/// `read` may return fewer bytes than requested; `Ok(0)` means the peer
/// closed the stream. Read timeouts surface as `Io` errors of kind
/// `WouldBlock` or `TimedOut` and are not fatal to a session.
pub trait Transport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write all of `data`
    fn write(&mut self, data: &[u8]) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// TCP transport
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Connect to `host:port`
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use openigtlink_codec::io::TcpTransport;
    ///
    /// let transport = TcpTransport::connect("127.0.0.1", 18944)?;
    /// # Ok::<(), openigtlink_codec::IgtlError>(())
    /// ```
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        info!(host = host, port = port, "Connecting to OpenIGTLink peer");
        let stream = TcpStream::connect((host, port))?;
        stream.set_nodelay(true)?;
        info!(
            local_addr = ?stream.local_addr().ok(),
            "Connected to OpenIGTLink peer"
        );
        Ok(TcpTransport { stream })
    }

    /// Wrap an already connected stream
    pub fn from_stream(stream: TcpStream) -> Self {
        TcpTransport { stream }
    }

    /// Bound each blocking read; `None` blocks indefinitely
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.stream.set_read_timeout(timeout)?;
        debug!(timeout_ms = ?timeout.map(|d| d.as_millis()), "Read timeout configured");
        Ok(())
    }
}

impl Transport for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.stream.read(buf)?)
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data)?;
        self.stream.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        debug!("Closing TCP transport");
        self.stream.shutdown(Shutdown::Both)?;
        Ok(())
    }
}
