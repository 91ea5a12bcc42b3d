//! POLYDATA message type implementation
//!
//! POLYDATA carries a surface mesh: points, four cell sections (vertices,
//! lines, polygons, triangle strips) and per-point or per-cell attributes.
//!
//! # Layout (big-endian)
//!
//! ```text
//! u32 x 10   counts: points, vertices, size_vertices, lines, size_lines,
//!            polygons, size_polygons, strips, size_strips, attributes
//! f32 x 3    per point
//! cells      per section: u32 n, then n x u32 point index
//! u16 + u32  per attribute: type/components, element count
//! names      NUL-terminated, padded as a group to an even length
//! f32        per attribute: element count x components values
//! ```
//!
//! Each `size_*` field is the byte length of its section and must agree with
//! the cells actually found there.

use crate::error::{IgtlError, Result};
use crate::protocol::cursor::ByteCursor;
use crate::protocol::header::MessageKind;
use crate::protocol::message::Message;
use bytes::BufMut;

/// Size of the ten leading counts
const COUNTS_SIZE: usize = 40;

/// What an attribute is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeAssociation {
    Point,
    Cell,
}

/// Semantic kind of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Scalars,
    Vectors,
    Normals,
    Tensors,
    Rgba,
}

impl AttributeKind {
    /// Component count the kind requires, if fixed
    pub fn required_components(self) -> Option<u8> {
        match self {
            AttributeKind::Scalars => None,
            AttributeKind::Vectors | AttributeKind::Normals => Some(3),
            AttributeKind::Tensors => Some(9),
            AttributeKind::Rgba => Some(4),
        }
    }
}

/// Attribute type byte: `0x0k` for point data, `0x1k` for cell data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeType {
    pub association: AttributeAssociation,
    pub kind: AttributeKind,
}

impl AttributeType {
    pub const fn point(kind: AttributeKind) -> Self {
        AttributeType {
            association: AttributeAssociation::Point,
            kind,
        }
    }

    pub const fn cell(kind: AttributeKind) -> Self {
        AttributeType {
            association: AttributeAssociation::Cell,
            kind,
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        let association = match code & 0xF0 {
            0x00 => AttributeAssociation::Point,
            0x10 => AttributeAssociation::Cell,
            _ => return Err(unknown_attribute_type(code)),
        };
        let kind = match code & 0x0F {
            0 => AttributeKind::Scalars,
            1 => AttributeKind::Vectors,
            2 => AttributeKind::Normals,
            3 => AttributeKind::Tensors,
            4 => AttributeKind::Rgba,
            _ => return Err(unknown_attribute_type(code)),
        };
        Ok(AttributeType { association, kind })
    }

    pub fn code(self) -> u8 {
        let base = match self.association {
            AttributeAssociation::Point => 0x00,
            AttributeAssociation::Cell => 0x10,
        };
        base | match self.kind {
            AttributeKind::Scalars => 0,
            AttributeKind::Vectors => 1,
            AttributeKind::Normals => 2,
            AttributeKind::Tensors => 3,
            AttributeKind::Rgba => 4,
        }
    }
}

fn unknown_attribute_type(code: u8) -> IgtlError {
    IgtlError::MalformedPolyData(format!("unknown attribute type {code:#04x}"))
}

/// Point or cell attribute
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub attribute_type: AttributeType,
    pub num_components: u8,
    pub name: String,
    /// `element_count * num_components` values
    pub data: Vec<f32>,
}

impl Attribute {
    pub fn new(
        attribute_type: AttributeType,
        num_components: u8,
        name: impl Into<String>,
        data: Vec<f32>,
    ) -> Self {
        Attribute {
            attribute_type,
            num_components,
            name: name.into(),
            data,
        }
    }

    /// Number of points or cells the attribute covers
    pub fn element_count(&self) -> usize {
        match self.num_components {
            0 => 0,
            n => self.data.len() / n as usize,
        }
    }

    /// Values of one element
    pub fn element(&self, index: usize) -> Option<&[f32]> {
        let n = self.num_components as usize;
        self.data.get(index * n..(index + 1) * n)
    }

    fn validate(&self) -> Result<()> {
        check_components(self.attribute_type, self.num_components)?;
        if self.data.len() % self.num_components as usize != 0 {
            return Err(IgtlError::MalformedPolyData(format!(
                "attribute {:?} holds {} values, not a multiple of {} components",
                self.name,
                self.data.len(),
                self.num_components
            )));
        }
        if self.name.as_bytes().contains(&0) {
            return Err(IgtlError::MalformedPolyData(format!(
                "attribute name {:?} contains NUL",
                self.name
            )));
        }
        Ok(())
    }
}

fn check_components(attribute_type: AttributeType, components: u8) -> Result<()> {
    if components == 0 {
        return Err(IgtlError::MalformedPolyData(
            "attribute with zero components".to_string(),
        ));
    }
    match attribute_type.kind.required_components() {
        Some(required) if required != components => Err(IgtlError::MalformedPolyData(format!(
            "{:?} attribute needs {} components, got {}",
            attribute_type.kind, required, components
        ))),
        _ => Ok(()),
    }
}

/// POLYDATA message content
///
/// Each cell is the list of point indices it connects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolyDataBody {
    pub points: Vec<[f32; 3]>,
    pub vertices: Vec<Vec<u32>>,
    pub lines: Vec<Vec<u32>>,
    pub polygons: Vec<Vec<u32>>,
    pub triangle_strips: Vec<Vec<u32>>,
    pub attributes: Vec<Attribute>,
}

impl PolyDataBody {
    pub fn new(points: Vec<[f32; 3]>) -> Self {
        PolyDataBody {
            points,
            ..Default::default()
        }
    }

    pub fn with_vertices(mut self, vertices: Vec<Vec<u32>>) -> Self {
        self.vertices = vertices;
        self
    }

    pub fn with_lines(mut self, lines: Vec<Vec<u32>>) -> Self {
        self.lines = lines;
        self
    }

    pub fn with_polygons(mut self, polygons: Vec<Vec<u32>>) -> Self {
        self.polygons = polygons;
        self
    }

    pub fn with_triangle_strips(mut self, strips: Vec<Vec<u32>>) -> Self {
        self.triangle_strips = strips;
        self
    }

    pub fn add_attribute(&mut self, attribute: Attribute) {
        self.attributes.push(attribute);
    }

    /// First point attribute of the given kind
    pub fn point_attribute(&self, kind: AttributeKind) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|a| a.attribute_type == AttributeType::point(kind))
    }

    fn sections(&self) -> [&Vec<Vec<u32>>; 4] {
        [
            &self.vertices,
            &self.lines,
            &self.polygons,
            &self.triangle_strips,
        ]
    }
}

/// Byte length of a cell section
fn section_size(cells: &[Vec<u32>]) -> usize {
    cells.iter().map(|cell| (1 + cell.len()) * 4).sum()
}

fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| IgtlError::MalformedPolyData(format!("{what} {value} exceeds u32")))
}

fn truncated(cursor: &ByteCursor<'_>, needed: usize) -> IgtlError {
    IgtlError::TruncatedBody {
        expected: cursor.position().saturating_add(needed),
        actual: cursor.len(),
    }
}

/// Read `num_cells` cells that must fill exactly `size` bytes
fn read_cells(
    cursor: &mut ByteCursor<'_>,
    section: &str,
    num_cells: usize,
    size: usize,
) -> Result<Vec<Vec<u32>>> {
    if cursor.remaining() < size {
        return Err(truncated(cursor, size));
    }
    let end = cursor.position() + size;

    let mut cells = Vec::with_capacity(num_cells.min(size / 4));
    while cursor.position() < end {
        if end - cursor.position() < 4 {
            return Err(IgtlError::MalformedPolyData(format!(
                "{section}: partial cell header at end of section"
            )));
        }
        let count = cursor.read_u32()? as usize;
        let cell_bytes = count.checked_mul(4).unwrap_or(usize::MAX);
        if cell_bytes > end - cursor.position() {
            return Err(IgtlError::MalformedPolyData(format!(
                "{section}: cell {} with {} indices overruns the declared {} bytes",
                cells.len(),
                count,
                size
            )));
        }
        let mut cell = Vec::with_capacity(count);
        for _ in 0..count {
            cell.push(cursor.read_u32()?);
        }
        cells.push(cell);
    }

    if cells.len() != num_cells {
        return Err(IgtlError::MalformedPolyData(format!(
            "{section}: declared {} cells, found {}",
            num_cells,
            cells.len()
        )));
    }
    Ok(cells)
}

/// Read `count` NUL-terminated names and the group's even-length padding
fn read_names(cursor: &mut ByteCursor<'_>, count: usize) -> Result<Vec<String>> {
    let start = cursor.position();
    let mut names = Vec::with_capacity(count);
    for index in 0..count {
        let rest = cursor.rest();
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(IgtlError::MalformedAttributeNames { index })?;
        let name = std::str::from_utf8(&rest[..len])
            .map_err(|e| IgtlError::InvalidText(format!("attribute name {index}: {e}")))?
            .to_string();
        cursor.skip(len + 1)?;
        names.push(name);
    }
    if (cursor.position() - start) % 2 == 1 {
        cursor.skip(1).map_err(|_| {
            IgtlError::MalformedPolyData("missing attribute name padding".to_string())
        })?;
    }
    Ok(names)
}

impl Message for PolyDataBody {
    fn kind() -> MessageKind {
        MessageKind::PolyData
    }

    fn encode_content(&self) -> Result<Vec<u8>> {
        for attribute in &self.attributes {
            attribute.validate()?;
        }

        let sections = self.sections();
        let mut buf = Vec::new();

        buf.put_u32(to_u32(self.points.len(), "point count")?);
        for cells in sections {
            buf.put_u32(to_u32(cells.len(), "cell count")?);
            buf.put_u32(to_u32(section_size(cells), "section size")?);
        }
        buf.put_u32(to_u32(self.attributes.len(), "attribute count")?);

        for point in &self.points {
            for &coord in point {
                buf.put_f32(coord);
            }
        }

        for cells in sections {
            for cell in cells.iter() {
                buf.put_u32(to_u32(cell.len(), "cell length")?);
                for &index in cell {
                    buf.put_u32(index);
                }
            }
        }

        for attribute in &self.attributes {
            let type_and_components =
                u16::from(attribute.num_components) << 8 | u16::from(attribute.attribute_type.code());
            buf.put_u16(type_and_components);
            buf.put_u32(to_u32(attribute.element_count(), "element count")?);
        }

        let names_start = buf.len();
        for attribute in &self.attributes {
            buf.extend_from_slice(attribute.name.as_bytes());
            buf.put_u8(0);
        }
        if (buf.len() - names_start) % 2 == 1 {
            buf.put_u8(0);
        }

        for attribute in &self.attributes {
            for &value in &attribute.data {
                buf.put_f32(value);
            }
        }

        Ok(buf)
    }

    fn decode_content(data: &[u8]) -> Result<Self> {
        if data.len() < COUNTS_SIZE {
            return Err(IgtlError::TruncatedBody {
                expected: COUNTS_SIZE,
                actual: data.len(),
            });
        }

        let mut cursor = ByteCursor::new(data);
        let num_points = cursor.read_u32()? as usize;
        let mut section_counts = [(0usize, 0usize); 4];
        for counts in section_counts.iter_mut() {
            *counts = (cursor.read_u32()? as usize, cursor.read_u32()? as usize);
        }
        let num_attributes = cursor.read_u32()? as usize;

        let points_size = num_points.checked_mul(12).unwrap_or(usize::MAX);
        if cursor.remaining() < points_size {
            return Err(truncated(&cursor, points_size));
        }
        let mut points = Vec::with_capacity(num_points);
        for _ in 0..num_points {
            points.push([cursor.read_f32()?, cursor.read_f32()?, cursor.read_f32()?]);
        }

        let [(nv, sv), (nl, sl), (np, sp), (ns, ss)] = section_counts;
        let vertices = read_cells(&mut cursor, "vertices", nv, sv)?;
        let lines = read_cells(&mut cursor, "lines", nl, sl)?;
        let polygons = read_cells(&mut cursor, "polygons", np, sp)?;
        let triangle_strips = read_cells(&mut cursor, "triangle strips", ns, ss)?;

        let headers_size = num_attributes.checked_mul(6).unwrap_or(usize::MAX);
        if cursor.remaining() < headers_size {
            return Err(truncated(&cursor, headers_size));
        }
        let mut headers = Vec::with_capacity(num_attributes);
        for _ in 0..num_attributes {
            let type_and_components = cursor.read_u16()?;
            let attribute_type = AttributeType::from_code((type_and_components & 0x00FF) as u8)?;
            let num_components = (type_and_components >> 8) as u8;
            check_components(attribute_type, num_components)?;
            let element_count = cursor.read_u32()? as usize;
            headers.push((attribute_type, num_components, element_count));
        }

        let names = read_names(&mut cursor, num_attributes)?;

        let mut attributes = Vec::with_capacity(num_attributes);
        for ((attribute_type, num_components, element_count), name) in
            headers.into_iter().zip(names)
        {
            let values = element_count
                .checked_mul(num_components as usize)
                .unwrap_or(usize::MAX);
            if cursor.remaining() / 4 < values {
                return Err(truncated(&cursor, values.saturating_mul(4)));
            }
            let mut data = Vec::with_capacity(values);
            for _ in 0..values {
                data.push(cursor.read_f32()?);
            }
            attributes.push(Attribute {
                attribute_type,
                num_components,
                name,
                data,
            });
        }

        if cursor.remaining() > 0 {
            return Err(IgtlError::InvalidSize {
                expected: cursor.position(),
                actual: data.len(),
            });
        }

        Ok(PolyDataBody {
            points,
            vertices,
            lines,
            polygons,
            triangle_strips,
            attributes,
        })
    }
}
