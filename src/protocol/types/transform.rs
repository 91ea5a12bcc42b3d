//! TRANSFORM message type implementation
//!
//! A TRANSFORM carries the upper 3x4 part of a 4x4 homogeneous matrix as 12
//! big-endian floats; the bottom row is always `[0, 0, 0, 1]` and never sent.

use crate::error::{IgtlError, Result};
use crate::protocol::cursor::ByteCursor;
use crate::protocol::header::MessageKind;
use crate::protocol::message::Message;
use bytes::BufMut;

/// TRANSFORM message content
///
/// # Wire layout
/// - 48 bytes, row-major: `R11 R12 R13 TX R21 R22 R23 TY R31 R32 R33 TZ`
/// - Translation is in the sender's physical units; any rescaling is up to
///   the consumer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformBody {
    /// Rows 0..3 of the homogeneous matrix
    pub matrix: [[f32; 4]; 3],
}

impl TransformBody {
    /// Encoded content size
    pub const SIZE: usize = 48;

    pub fn identity() -> Self {
        TransformBody {
            matrix: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
            ],
        }
    }

    /// Pure translation
    pub fn translation(x: f32, y: f32, z: f32) -> Self {
        let mut transform = Self::identity();
        transform.matrix[0][3] = x;
        transform.matrix[1][3] = y;
        transform.matrix[2][3] = z;
        transform
    }

    /// Translation column
    pub fn position(&self) -> [f32; 3] {
        [self.matrix[0][3], self.matrix[1][3], self.matrix[2][3]]
    }

    /// Full 4x4 matrix with the implicit bottom row restored
    pub fn to_homogeneous(&self) -> [[f32; 4]; 4] {
        [
            self.matrix[0],
            self.matrix[1],
            self.matrix[2],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }
}

impl Default for TransformBody {
    fn default() -> Self {
        Self::identity()
    }
}

impl Message for TransformBody {
    fn kind() -> MessageKind {
        MessageKind::Transform
    }

    fn encode_content(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        for row in &self.matrix {
            for &value in row {
                buf.put_f32(value);
            }
        }
        Ok(buf)
    }

    fn decode_content(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(IgtlError::TruncatedBody {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        if data.len() > Self::SIZE {
            return Err(IgtlError::InvalidSize {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }

        let mut cursor = ByteCursor::new(data);
        let mut matrix = [[0.0f32; 4]; 3];
        for row in matrix.iter_mut() {
            for value in row.iter_mut() {
                *value = cursor.read_f32()?;
            }
        }

        Ok(TransformBody { matrix })
    }
}
