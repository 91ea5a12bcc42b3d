//! IMAGE message type implementation
//!
//! An IMAGE carries a 72-byte content header followed by the raw scalars of a
//! sub-volume. The payload length is fully determined by the header: sub-volume
//! extents x components x bytes per scalar.
//!
//! # Content header (72 bytes, big-endian)
//!
//! | Offset | Field |
//! |--------|-------|
//! | 0  | version (u16) |
//! | 2  | components (u8) |
//! | 3  | scalar type (u8) |
//! | 4  | endian (u8, 1 = big, 2 = little) |
//! | 5  | coordinate system (u8, 1 = RAS, 2 = LPS) |
//! | 6  | volume size (3 x u16) |
//! | 12 | i, j, k direction vectors (9 x f32) |
//! | 48 | center position (3 x f32) |
//! | 60 | sub-volume start index (3 x u16) |
//! | 66 | sub-volume size (3 x u16) |
//!
//! The `endian` field governs only the scalar payload; the header itself is
//! always big-endian.

use crate::error::{IgtlError, Result};
use crate::protocol::cursor::{ByteCursor, ByteCursorMut, ByteOrder};
use crate::protocol::header::MessageKind;
use crate::protocol::message::Message;
use bytes::BufMut;

/// Voxel scalar type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Int8 = 2,
    Uint8 = 3,
    Int16 = 4,
    Uint16 = 5,
    Int32 = 6,
    Uint32 = 7,
    Float32 = 10,
    Float64 = 11,
}

impl ScalarType {
    /// Resolve a wire code; there is no fallback for unknown codes
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            2 => Ok(ScalarType::Int8),
            3 => Ok(ScalarType::Uint8),
            4 => Ok(ScalarType::Int16),
            5 => Ok(ScalarType::Uint16),
            6 => Ok(ScalarType::Int32),
            7 => Ok(ScalarType::Uint32),
            10 => Ok(ScalarType::Float32),
            11 => Ok(ScalarType::Float64),
            other => Err(IgtlError::UnsupportedScalarType(other)),
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Bytes per scalar
    pub fn size(self) -> usize {
        match self {
            ScalarType::Int8 | ScalarType::Uint8 => 1,
            ScalarType::Int16 | ScalarType::Uint16 => 2,
            ScalarType::Int32 | ScalarType::Uint32 | ScalarType::Float32 => 4,
            ScalarType::Float64 => 8,
        }
    }
}

/// Byte order of the scalar payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Big = 1,
    Little = 2,
}

impl Endian {
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            1 => Ok(Endian::Big),
            2 => Ok(Endian::Little),
            other => Err(IgtlError::InvalidHeader(format!(
                "unknown image endian code {other}"
            ))),
        }
    }

    pub fn byte_order(self) -> ByteOrder {
        match self {
            Endian::Big => ByteOrder::Big,
            Endian::Little => ByteOrder::Little,
        }
    }
}

/// Patient coordinate convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordinateSystem {
    /// Right-Anterior-Superior
    #[default]
    Ras = 1,
    /// Left-Posterior-Superior
    Lps = 2,
}

impl CoordinateSystem {
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            1 => Ok(CoordinateSystem::Ras),
            2 => Ok(CoordinateSystem::Lps),
            other => Err(IgtlError::InvalidHeader(format!(
                "unknown coordinate system code {other}"
            ))),
        }
    }
}

/// Typed view of an IMAGE payload
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarData {
    Int8(Vec<i8>),
    Uint8(Vec<u8>),
    Int16(Vec<i16>),
    Uint16(Vec<u16>),
    Int32(Vec<i32>),
    Uint32(Vec<u32>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

macro_rules! read_scalars {
    ($cursor:expr, $count:expr, $width:expr, $read:ident, $order:expr) => {
        (0..$count)
            .map(|i| $cursor.$read(i * $width, $order))
            .collect::<Result<Vec<_>>>()?
    };
}

macro_rules! write_scalars {
    ($cursor:expr, $values:expr, $width:expr, $write:ident, $order:expr) => {
        for (i, &value) in $values.iter().enumerate() {
            $cursor.$write(i * $width, value, $order)?;
        }
    };
}

impl ScalarData {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            ScalarData::Int8(_) => ScalarType::Int8,
            ScalarData::Uint8(_) => ScalarType::Uint8,
            ScalarData::Int16(_) => ScalarType::Int16,
            ScalarData::Uint16(_) => ScalarType::Uint16,
            ScalarData::Int32(_) => ScalarType::Int32,
            ScalarData::Uint32(_) => ScalarType::Uint32,
            ScalarData::Float32(_) => ScalarType::Float32,
            ScalarData::Float64(_) => ScalarType::Float64,
        }
    }

    /// Number of scalars
    pub fn len(&self) -> usize {
        match self {
            ScalarData::Int8(v) => v.len(),
            ScalarData::Uint8(v) => v.len(),
            ScalarData::Int16(v) => v.len(),
            ScalarData::Uint16(v) => v.len(),
            ScalarData::Int32(v) => v.len(),
            ScalarData::Uint32(v) => v.len(),
            ScalarData::Float32(v) => v.len(),
            ScalarData::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Interpret `bytes` as scalars of `scalar_type` in `order`
    ///
    /// The length must be a whole number of scalars.
    pub fn from_bytes(scalar_type: ScalarType, bytes: &[u8], order: ByteOrder) -> Result<Self> {
        let width = scalar_type.size();
        if bytes.len() % width != 0 {
            return Err(IgtlError::InvalidSize {
                expected: bytes.len() / width * width,
                actual: bytes.len(),
            });
        }
        let count = bytes.len() / width;
        let cursor = ByteCursor::new(bytes);

        Ok(match scalar_type {
            ScalarType::Int8 => ScalarData::Int8(bytes.iter().map(|&b| b as i8).collect()),
            ScalarType::Uint8 => ScalarData::Uint8(bytes.to_vec()),
            ScalarType::Int16 => {
                ScalarData::Int16(read_scalars!(cursor, count, width, read_i16_at_order, order))
            }
            ScalarType::Uint16 => {
                ScalarData::Uint16(read_scalars!(cursor, count, width, read_u16_at_order, order))
            }
            ScalarType::Int32 => {
                ScalarData::Int32(read_scalars!(cursor, count, width, read_i32_at_order, order))
            }
            ScalarType::Uint32 => {
                ScalarData::Uint32(read_scalars!(cursor, count, width, read_u32_at_order, order))
            }
            ScalarType::Float32 => {
                ScalarData::Float32(read_scalars!(cursor, count, width, read_f32_at_order, order))
            }
            ScalarType::Float64 => {
                ScalarData::Float64(read_scalars!(cursor, count, width, read_f64_at_order, order))
            }
        })
    }

    /// Serialize in `order`
    pub fn to_bytes(&self, order: ByteOrder) -> Result<Vec<u8>> {
        let width = self.scalar_type().size();
        let mut out = vec![0u8; self.len() * width];
        let mut cursor = ByteCursorMut::new(&mut out);

        match self {
            ScalarData::Int8(values) => {
                for (i, &value) in values.iter().enumerate() {
                    cursor.write_i8_at(i, value)?;
                }
            }
            ScalarData::Uint8(values) => cursor.write_bytes_at(0, values)?,
            ScalarData::Int16(values) => {
                write_scalars!(cursor, values, width, write_i16_at_order, order)
            }
            ScalarData::Uint16(values) => {
                write_scalars!(cursor, values, width, write_u16_at_order, order)
            }
            ScalarData::Int32(values) => {
                write_scalars!(cursor, values, width, write_i32_at_order, order)
            }
            ScalarData::Uint32(values) => {
                write_scalars!(cursor, values, width, write_u32_at_order, order)
            }
            ScalarData::Float32(values) => {
                write_scalars!(cursor, values, width, write_f32_at_order, order)
            }
            ScalarData::Float64(values) => {
                write_scalars!(cursor, values, width, write_f64_at_order, order)
            }
        }

        Ok(out)
    }

    /// Scalars scaled to display range
    ///
    /// int8 is divided by 127, uint8 and the wider integer types by 255;
    /// floating point values pass through.
    pub fn normalized(&self) -> Vec<f32> {
        match self {
            ScalarData::Int8(v) => v.iter().map(|&x| f32::from(x) / 127.0).collect(),
            ScalarData::Uint8(v) => v.iter().map(|&x| f32::from(x) / 255.0).collect(),
            ScalarData::Int16(v) => v.iter().map(|&x| f32::from(x) / 255.0).collect(),
            ScalarData::Uint16(v) => v.iter().map(|&x| f32::from(x) / 255.0).collect(),
            ScalarData::Int32(v) => v.iter().map(|&x| x as f32 / 255.0).collect(),
            ScalarData::Uint32(v) => v.iter().map(|&x| x as f32 / 255.0).collect(),
            ScalarData::Float32(v) => v.clone(),
            ScalarData::Float64(v) => v.iter().map(|&x| x as f32).collect(),
        }
    }
}

/// Pixel layouts an outbound texture may have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Alpha8,
    R8,
    Rgb24,
    Rgba32,
    Argb32,
    R16,
    Rg16,
    RFloat,
    RgbaFloat,
    RHalf,
    RgHalf,
    RgbaHalf,
    Rgb565,
    Dxt1,
    Dxt5,
}

impl PixelFormat {
    /// IMAGE `(scalar type, components)` for this format
    ///
    /// Half-float, packed and block-compressed formats have no IMAGE scalar
    /// equivalent and are rejected.
    pub fn image_format(self) -> Result<(ScalarType, u8)> {
        match self {
            PixelFormat::Alpha8 | PixelFormat::R8 => Ok((ScalarType::Uint8, 1)),
            PixelFormat::Rg16 => Ok((ScalarType::Uint8, 2)),
            PixelFormat::Rgb24 => Ok((ScalarType::Uint8, 3)),
            PixelFormat::Rgba32 | PixelFormat::Argb32 => Ok((ScalarType::Uint8, 4)),
            PixelFormat::R16 => Ok((ScalarType::Uint16, 1)),
            PixelFormat::RFloat => Ok((ScalarType::Float32, 1)),
            PixelFormat::RgbaFloat => Ok((ScalarType::Float32, 4)),
            other => Err(IgtlError::UnsupportedPixelFormat(format!("{other:?}"))),
        }
    }
}

/// IMAGE message content
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBody {
    /// Content header version (1 for the standard layout)
    pub version: u16,
    pub num_components: u8,
    pub scalar_type: ScalarType,
    pub endian: Endian,
    pub coordinate: CoordinateSystem,
    /// Full volume extents
    pub size: [u16; 3],
    /// i, j, k direction vectors
    pub directions: [[f32; 3]; 3],
    /// Volume center position
    pub center: [f32; 3],
    /// First transmitted voxel
    pub subvolume_offset: [u16; 3],
    /// Extents of the transmitted sub-volume
    pub subvolume_size: [u16; 3],
    /// Raw scalar payload in `endian` byte order
    pub data: Vec<u8>,
}

impl ImageBody {
    /// Content header size
    pub const HEADER_SIZE: usize = 72;

    const IDENTITY: [[f32; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

    /// Full volume image with identity orientation
    ///
    /// `data` must hold exactly `x * y * z * num_components` scalars in
    /// big-endian order.
    pub fn new(
        scalar_type: ScalarType,
        num_components: u8,
        size: [u16; 3],
        data: Vec<u8>,
    ) -> Result<Self> {
        let image = ImageBody {
            version: 1,
            num_components,
            scalar_type,
            endian: Endian::Big,
            coordinate: CoordinateSystem::Ras,
            size,
            directions: Self::IDENTITY,
            center: [0.0; 3],
            subvolume_offset: [0; 3],
            subvolume_size: size,
            data,
        };
        image.check_payload_len()?;
        Ok(image)
    }

    /// Full volume image from typed scalars
    pub fn from_scalars(size: [u16; 3], num_components: u8, scalars: &ScalarData) -> Result<Self> {
        let data = scalars.to_bytes(ByteOrder::Big)?;
        Self::new(scalars.scalar_type(), num_components, size, data)
    }

    /// 2-D image (depth 1) from raw texture pixels
    ///
    /// `pixels` are in the texture's memory layout with multi-byte channels in
    /// `order`; they are re-encoded big-endian one scalar at a time.
    pub fn from_pixels(
        format: PixelFormat,
        width: u16,
        height: u16,
        pixels: &[u8],
        order: ByteOrder,
    ) -> Result<Self> {
        let (scalar_type, num_components) = format.image_format()?;
        let expected = width as usize * height as usize * num_components as usize * scalar_type.size();
        if pixels.len() != expected {
            return Err(IgtlError::InvalidSize {
                expected,
                actual: pixels.len(),
            });
        }
        let scalars = ScalarData::from_bytes(scalar_type, pixels, order)?;
        Self::from_scalars([width, height, 1], num_components, &scalars)
    }

    pub fn with_coordinate(mut self, coordinate: CoordinateSystem) -> Self {
        self.coordinate = coordinate;
        self
    }

    /// Place the image in space
    pub fn with_orientation(mut self, directions: [[f32; 3]; 3], center: [f32; 3]) -> Self {
        self.directions = directions;
        self.center = center;
        self
    }

    /// Voxels in the transmitted sub-volume
    pub fn voxel_count(&self) -> usize {
        self.subvolume_size.iter().map(|&n| n as usize).product()
    }

    /// Payload length implied by the header fields
    pub fn expected_data_len(&self) -> usize {
        self.voxel_count() * self.num_components as usize * self.scalar_type.size()
    }

    fn check_payload_len(&self) -> Result<()> {
        let expected = self.expected_data_len();
        if self.data.len() != expected {
            return Err(IgtlError::InvalidSize {
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    /// Payload decoded to typed scalars
    pub fn scalars(&self) -> Result<ScalarData> {
        ScalarData::from_bytes(self.scalar_type, &self.data, self.endian.byte_order())
    }

    /// Sub-volume as RGBA colors
    ///
    /// Components map to r, g, b, a in order (missing channels are 0, alpha
    /// defaults to 1). Rows are flipped along Y so row 0 of the output is the
    /// last row of each slice.
    pub fn voxel_colors(&self) -> Result<Vec<[f32; 4]>> {
        self.check_payload_len()?;
        let [width, height, depth] = self.subvolume_size.map(usize::from);
        let components = self.num_components as usize;
        let values = self.scalars()?.normalized();

        let mut colors = vec![[0.0, 0.0, 0.0, 1.0]; width * height * depth];
        let mut voxel = 0;
        for z in 0..depth {
            for y in 0..height {
                for x in 0..width {
                    let base = voxel * components;
                    let mut rgba = [0.0, 0.0, 0.0, 1.0];
                    for (c, channel) in rgba.iter_mut().enumerate().take(components) {
                        *channel = values[base + c];
                    }
                    colors[x + (height - 1 - y) * width + z * width * height] = rgba;
                    voxel += 1;
                }
            }
        }
        Ok(colors)
    }
}

impl Message for ImageBody {
    fn kind() -> MessageKind {
        MessageKind::Image
    }

    fn encode_content(&self) -> Result<Vec<u8>> {
        self.check_payload_len()?;

        let mut buf = Vec::with_capacity(Self::HEADER_SIZE + self.data.len());
        buf.put_u16(self.version);
        buf.put_u8(self.num_components);
        buf.put_u8(self.scalar_type.code());
        buf.put_u8(self.endian as u8);
        buf.put_u8(self.coordinate as u8);
        for &n in &self.size {
            buf.put_u16(n);
        }
        for &value in self.directions.iter().flatten() {
            buf.put_f32(value);
        }
        for &value in &self.center {
            buf.put_f32(value);
        }
        for &n in &self.subvolume_offset {
            buf.put_u16(n);
        }
        for &n in &self.subvolume_size {
            buf.put_u16(n);
        }
        buf.extend_from_slice(&self.data);
        Ok(buf)
    }

    fn decode_content(data: &[u8]) -> Result<Self> {
        if data.len() < Self::HEADER_SIZE {
            return Err(IgtlError::TruncatedBody {
                expected: Self::HEADER_SIZE,
                actual: data.len(),
            });
        }

        let mut cursor = ByteCursor::new(data);
        let version = cursor.read_u16()?;
        let num_components = cursor.read_u8()?;
        let scalar_type = ScalarType::from_code(cursor.read_u8()?)?;
        let endian = Endian::from_code(cursor.read_u8()?)?;
        let coordinate = CoordinateSystem::from_code(cursor.read_u8()?)?;

        let mut size = [0u16; 3];
        for n in size.iter_mut() {
            *n = cursor.read_u16()?;
        }
        let mut directions = [[0.0f32; 3]; 3];
        for value in directions.iter_mut().flatten() {
            *value = cursor.read_f32()?;
        }
        let mut center = [0.0f32; 3];
        for value in center.iter_mut() {
            *value = cursor.read_f32()?;
        }
        let mut subvolume_offset = [0u16; 3];
        for n in subvolume_offset.iter_mut() {
            *n = cursor.read_u16()?;
        }
        let mut subvolume_size = [0u16; 3];
        for n in subvolume_size.iter_mut() {
            *n = cursor.read_u16()?;
        }

        let mut image = ImageBody {
            version,
            num_components,
            scalar_type,
            endian,
            coordinate,
            size,
            directions,
            center,
            subvolume_offset,
            subvolume_size,
            data: Vec::new(),
        };

        let expected = Self::HEADER_SIZE + image.expected_data_len();
        if data.len() < expected {
            return Err(IgtlError::TruncatedBody {
                expected,
                actual: data.len(),
            });
        }
        if data.len() > expected {
            return Err(IgtlError::InvalidSize {
                expected,
                actual: data.len(),
            });
        }

        image.data = cursor.rest().to_vec();
        Ok(image)
    }
}
