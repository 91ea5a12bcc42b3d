//! Session configuration
//!
//! [`SessionConfig`] gathers everything a session needs to know about its peer
//! and its limits. It deserializes with serde (missing fields take their
//! defaults) and can be overridden from `IGTL_*` environment variables.

use crate::error::{IgtlError, Result};
use crate::protocol::crc::{Crc64, ECMA_182_BINARY_LITERAL};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default OpenIGTLink port
pub const DEFAULT_PORT: u16 = 18944;

/// Session settings
///
/// # Examples
///
/// ```
/// use openigtlink_codec::config::SessionConfig;
///
/// let config = SessionConfig::default()
///     .with_host("192.168.1.20")
///     .with_verify_crc(false);
/// assert_eq!(config.port, 18944);
/// assert!(config.crc_engine().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Peer host name or address
    pub host: String,
    pub port: u16,
    /// CRC-64 polynomial as a binary literal
    pub crc_polynomial: String,
    /// Check the CRC of every received frame
    pub verify_crc: bool,
    /// Largest body accepted or sent, in bytes
    pub max_body_size: u64,
    /// Bytes requested from the transport per read
    pub read_chunk_size: usize,
    /// Seconds a partial frame may sit in the buffer before it is reported;
    /// 0 disables the report
    pub stall_timeout: u64,
    /// Attach `ModelName` metadata to outbound messages
    pub model_name_metadata: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            crc_polynomial: ECMA_182_BINARY_LITERAL.to_string(),
            verify_crc: true,
            max_body_size: 256 * 1024 * 1024,
            read_chunk_size: 64 * 1024,
            stall_timeout: 5,
            model_name_metadata: true,
        }
    }
}

impl SessionConfig {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_verify_crc(mut self, verify: bool) -> Self {
        self.verify_crc = verify;
        self
    }

    pub fn with_max_body_size(mut self, max: u64) -> Self {
        self.max_body_size = max;
        self
    }

    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size;
        self
    }

    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout.as_secs();
        self
    }

    pub fn with_model_name_metadata(mut self, enabled: bool) -> Self {
        self.model_name_metadata = enabled;
        self
    }

    /// `host:port` for connecting
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Stall report threshold, `None` when disabled
    pub fn stall_timeout(&self) -> Option<Duration> {
        (self.stall_timeout > 0).then(|| Duration::from_secs(self.stall_timeout))
    }

    /// Parse the configured polynomial into a CRC engine
    pub fn crc_engine(&self) -> Result<Crc64> {
        Crc64::from_binary_literal(&self.crc_polynomial)
    }

    /// Reject settings a session cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(IgtlError::Config("host must not be empty".to_string()));
        }
        if self.max_body_size == 0 {
            return Err(IgtlError::Config("max_body_size must be positive".to_string()));
        }
        if self.read_chunk_size == 0 {
            return Err(IgtlError::Config(
                "read_chunk_size must be positive".to_string(),
            ));
        }
        self.crc_engine()?;
        Ok(())
    }

    /// Defaults overridden by `IGTL_HOST`, `IGTL_PORT`, `IGTL_VERIFY_CRC` and
    /// `IGTL_STALL_TIMEOUT`
    pub fn from_env() -> Result<Self> {
        Self::default().apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `IGTL_*` overrides from an arbitrary lookup
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("IGTL_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("IGTL_PORT") {
            self.port = parse_var("IGTL_PORT", &port)?;
        }
        if let Some(verify) = lookup("IGTL_VERIFY_CRC") {
            self.verify_crc = parse_bool("IGTL_VERIFY_CRC", &verify)?;
        }
        if let Some(timeout) = lookup("IGTL_STALL_TIMEOUT") {
            self.stall_timeout = parse_var("IGTL_STALL_TIMEOUT", &timeout)?;
        }
        self.validate()?;
        Ok(self)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| IgtlError::Config(format!("{key}={value:?}: {e}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(IgtlError::Config(format!(
            "{key}={value:?}: expected a boolean"
        ))),
    }
}
