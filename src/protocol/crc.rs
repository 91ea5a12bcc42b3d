//! CRC-64 checksum engine
//!
//! OpenIGTLink protects everything after the 58-byte header (extended header,
//! content and metadata) with a non-reflected CRC-64, initial value 0, no
//! final XOR. The stock polynomial is ECMA-182 (`0x42F0E1EBA9EA3693`).
//!
//! The engine is table driven and built once per polynomial; it is read-only
//! afterwards and can be shared freely between the receive and send paths.

use crate::error::{IgtlError, Result};
use std::sync::OnceLock;

/// ECMA-182 polynomial used by OpenIGTLink
pub const ECMA_182_POLYNOMIAL: u64 = 0x42F0_E1EB_A9EA_3693;

/// The polynomial as the binary literal found in host configuration files
pub const ECMA_182_BINARY_LITERAL: &str =
    "0100001011110000111000011110101110101001111010100011011010010011";

/// Table-driven CRC-64 engine for one polynomial
#[derive(Clone)]
pub struct Crc64 {
    polynomial: u64,
    table: [u64; 256],
}

impl std::fmt::Debug for Crc64 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crc64")
            .field("polynomial", &format_args!("{:#018x}", self.polynomial))
            .finish()
    }
}

impl Crc64 {
    /// Build the lookup table for `polynomial`
    pub fn new(polynomial: u64) -> Self {
        let mut table = [0u64; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            let mut crc = (i as u64) << 56;
            for _ in 0..8 {
                crc = if crc & (1 << 63) != 0 {
                    (crc << 1) ^ polynomial
                } else {
                    crc << 1
                };
            }
            *slot = crc;
        }
        Crc64 { polynomial, table }
    }

    /// Shared ECMA-182 engine
    pub fn ecma182() -> &'static Crc64 {
        static ENGINE: OnceLock<Crc64> = OnceLock::new();
        ENGINE.get_or_init(|| Crc64::new(ECMA_182_POLYNOMIAL))
    }

    /// Parse a polynomial written as a string of `0`/`1` digits
    ///
    /// Leading zeros are allowed, but the value must fit in 64 bits; a wider
    /// literal is rejected rather than silently truncated.
    ///
    /// # Examples
    ///
    /// ```
    /// use openigtlink_codec::protocol::crc::{Crc64, ECMA_182_BINARY_LITERAL, ECMA_182_POLYNOMIAL};
    ///
    /// let crc = Crc64::from_binary_literal(ECMA_182_BINARY_LITERAL).unwrap();
    /// assert_eq!(crc.polynomial(), ECMA_182_POLYNOMIAL);
    /// assert!(Crc64::from_binary_literal("10000000000000000000000000000000000000000000000000000000000000000").is_err());
    /// ```
    pub fn from_binary_literal(literal: &str) -> Result<Self> {
        let digits = literal.trim();
        if digits.is_empty() {
            return Err(IgtlError::InvalidPolynomial("empty literal".to_string()));
        }
        if let Some(bad) = digits.chars().find(|c| *c != '0' && *c != '1') {
            return Err(IgtlError::InvalidPolynomial(format!(
                "unexpected character {bad:?}"
            )));
        }
        let significant = digits.trim_start_matches('0');
        if significant.len() > 64 {
            return Err(IgtlError::InvalidPolynomial(format!(
                "{} significant bits (max: 64)",
                significant.len()
            )));
        }
        let polynomial = if significant.is_empty() {
            0
        } else {
            u64::from_str_radix(significant, 2)
                .map_err(|e| IgtlError::InvalidPolynomial(e.to_string()))?
        };
        if polynomial == 0 {
            return Err(IgtlError::InvalidPolynomial("zero polynomial".to_string()));
        }
        Ok(Crc64::new(polynomial))
    }

    /// The configured polynomial
    pub fn polynomial(&self) -> u64 {
        self.polynomial
    }

    /// Initial register state
    pub fn init(&self) -> u64 {
        0
    }

    /// Fold `data` into `state`
    pub fn update(&self, mut state: u64, data: &[u8]) -> u64 {
        for &byte in data {
            let index = ((state >> 56) as u8 ^ byte) as usize;
            state = self.table[index] ^ (state << 8);
        }
        state
    }

    /// Final checksum for `state`
    pub fn finalize(&self, state: u64) -> u64 {
        state
    }

    /// One-shot checksum of `data`
    pub fn checksum(&self, data: &[u8]) -> u64 {
        self.finalize(self.update(self.init(), data))
    }

    /// Incremental digest, for bodies assembled from several sections
    pub fn digest(&self) -> Crc64Digest<'_> {
        Crc64Digest {
            engine: self,
            state: self.init(),
        }
    }
}

impl Default for Crc64 {
    fn default() -> Self {
        Crc64::ecma182().clone()
    }
}

/// Running CRC over several byte ranges
#[derive(Debug, Clone)]
pub struct Crc64Digest<'a> {
    engine: &'a Crc64,
    state: u64,
}

impl Crc64Digest<'_> {
    /// Feed more bytes
    pub fn update(&mut self, data: &[u8]) {
        self.state = self.engine.update(self.state, data);
    }

    /// Finish and return the checksum
    pub fn finalize(self) -> u64 {
        self.engine.finalize(self.state)
    }
}

/// Checksum `data` with the ECMA-182 engine
pub fn calculate_crc(data: &[u8]) -> u64 {
    Crc64::ecma182().checksum(data)
}

/// Compare `data` against an expected ECMA-182 checksum
pub fn verify_crc(data: &[u8], expected: u64) -> bool {
    calculate_crc(data) == expected
}
