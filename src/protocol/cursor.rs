//! Bounds-checked byte cursor
//!
//! Every read copies the requested bytes into a fixed-size scratch array and
//! converts from there, so the source buffer is never mutated and can be
//! re-scanned. Every read and write is checked against the buffer length and
//! fails with [`IgtlError::OutOfRange`] instead of clamping.

use crate::error::{IgtlError, Result};

/// Byte order of multi-byte values
///
/// The OpenIGTLink wire format is big-endian everywhere except IMAGE scalar
/// payloads, whose order is declared by the image's `endian` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    Big,
    Little,
}

macro_rules! read_fns {
    ($($at:ident, $seq:ident, $at_ord:ident => $ty:ty;)*) => {
        $(
            #[doc = concat!("Read a big-endian `", stringify!($ty), "` at `offset`")]
            pub fn $at(&self, offset: usize) -> Result<$ty> {
                self.$at_ord(offset, ByteOrder::Big)
            }

            #[doc = concat!("Read a `", stringify!($ty), "` at `offset` in the given byte order")]
            pub fn $at_ord(&self, offset: usize, order: ByteOrder) -> Result<$ty> {
                let scratch = self.scratch::<{ std::mem::size_of::<$ty>() }>(offset)?;
                Ok(match order {
                    ByteOrder::Big => <$ty>::from_be_bytes(scratch),
                    ByteOrder::Little => <$ty>::from_le_bytes(scratch),
                })
            }

            #[doc = concat!("Read a big-endian `", stringify!($ty), "` at the cursor and advance")]
            pub fn $seq(&mut self) -> Result<$ty> {
                let value = self.$at(self.pos)?;
                self.pos += std::mem::size_of::<$ty>();
                Ok(value)
            }
        )*
    };
}

macro_rules! write_fns {
    ($($at:ident, $at_ord:ident => $ty:ty;)*) => {
        $(
            #[doc = concat!("Write a big-endian `", stringify!($ty), "` at `offset`")]
            pub fn $at(&mut self, offset: usize, value: $ty) -> Result<()> {
                self.$at_ord(offset, value, ByteOrder::Big)
            }

            #[doc = concat!("Write a `", stringify!($ty), "` at `offset` in the given byte order")]
            pub fn $at_ord(&mut self, offset: usize, value: $ty, order: ByteOrder) -> Result<()> {
                let bytes = match order {
                    ByteOrder::Big => value.to_be_bytes(),
                    ByteOrder::Little => value.to_le_bytes(),
                };
                self.put(offset, &bytes)
            }
        )*
    };
}

/// Read-only cursor over a borrowed byte window
///
/// Supports both random access (`read_*_at`) and sequential reads that
/// advance an internal position.
///
/// # Examples
///
/// ```
/// use openigtlink_codec::protocol::cursor::ByteCursor;
///
/// let data = [0x00, 0x03, 0x00, 0x00, 0x00, 0x2A];
/// let mut cursor = ByteCursor::new(&data);
/// assert_eq!(cursor.read_u16().unwrap(), 3);
/// assert_eq!(cursor.read_u32().unwrap(), 42);
/// assert!(cursor.read_u8().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    /// Create a cursor positioned at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        ByteCursor { data, pos: 0 }
    }

    /// Current read position
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left after the current position
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Total length of the underlying window
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the underlying window is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Move the read position; the target may equal the length but not exceed it
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(IgtlError::OutOfRange {
                offset: pos,
                width: 0,
                len: self.data.len(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    fn check(&self, offset: usize, width: usize) -> Result<()> {
        match offset.checked_add(width) {
            Some(end) if end <= self.data.len() => Ok(()),
            _ => Err(IgtlError::OutOfRange {
                offset,
                width,
                len: self.data.len(),
            }),
        }
    }

    fn scratch<const N: usize>(&self, offset: usize) -> Result<[u8; N]> {
        self.check(offset, N)?;
        let mut scratch = [0u8; N];
        scratch.copy_from_slice(&self.data[offset..offset + N]);
        Ok(scratch)
    }

    /// Read a single byte at `offset`
    pub fn read_u8_at(&self, offset: usize) -> Result<u8> {
        self.check(offset, 1)?;
        Ok(self.data[offset])
    }

    /// Read a single byte at the cursor and advance
    pub fn read_u8(&mut self) -> Result<u8> {
        let value = self.read_u8_at(self.pos)?;
        self.pos += 1;
        Ok(value)
    }

    read_fns! {
        read_u16_at, read_u16, read_u16_at_order => u16;
        read_u32_at, read_u32, read_u32_at_order => u32;
        read_u64_at, read_u64, read_u64_at_order => u64;
        read_i16_at, read_i16, read_i16_at_order => i16;
        read_i32_at, read_i32, read_i32_at_order => i32;
        read_f32_at, read_f32, read_f32_at_order => f32;
        read_f64_at, read_f64, read_f64_at_order => f64;
    }

    /// Borrow `len` bytes at `offset`
    pub fn bytes_at(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        self.check(offset, len)?;
        Ok(&self.data[offset..offset + len])
    }

    /// Borrow `len` bytes at the cursor and advance
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let bytes = self.bytes_at(self.pos, len)?;
        self.pos += len;
        Ok(bytes)
    }

    /// Copy a fixed-width field at the cursor and advance
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let scratch = self.scratch::<N>(self.pos)?;
        self.pos += N;
        Ok(scratch)
    }

    /// Advance without reading
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.check(self.pos, len)?;
        self.pos += len;
        Ok(())
    }

    /// Everything after the current position
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }
}

/// Writable cursor over a pre-sized buffer
///
/// Used where the final length is known up front (IMAGE payloads) and values
/// are placed at computed offsets.
#[derive(Debug)]
pub struct ByteCursorMut<'a> {
    data: &'a mut [u8],
}

impl<'a> ByteCursorMut<'a> {
    /// Wrap a mutable buffer
    pub fn new(data: &'a mut [u8]) -> Self {
        ByteCursorMut { data }
    }

    fn put(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let len = self.data.len();
        match offset.checked_add(bytes.len()) {
            Some(end) if end <= len => {
                self.data[offset..end].copy_from_slice(bytes);
                Ok(())
            }
            _ => Err(IgtlError::OutOfRange {
                offset,
                width: bytes.len(),
                len,
            }),
        }
    }

    /// Write a single byte at `offset`
    pub fn write_u8_at(&mut self, offset: usize, value: u8) -> Result<()> {
        self.put(offset, &[value])
    }

    /// Write a single signed byte at `offset`
    pub fn write_i8_at(&mut self, offset: usize, value: i8) -> Result<()> {
        self.put(offset, &value.to_be_bytes())
    }

    write_fns! {
        write_u16_at, write_u16_at_order => u16;
        write_u32_at, write_u32_at_order => u32;
        write_u64_at, write_u64_at_order => u64;
        write_i16_at, write_i16_at_order => i16;
        write_i32_at, write_i32_at_order => i32;
        write_f32_at, write_f32_at_order => f32;
        write_f64_at, write_f64_at_order => f64;
    }

    /// Copy raw bytes at `offset`
    pub fn write_bytes_at(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        self.put(offset, bytes)
    }
}
