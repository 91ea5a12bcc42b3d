//! Triangle mesh reconstruction from POLYDATA
//!
//! Polygons are fan-triangulated around their first vertex and triangle
//! strips are unrolled with alternating winding, so every triangle of the
//! output faces the same way. Both functions are pure over index lists.

use crate::error::{IgtlError, Result};
use crate::protocol::types::{AttributeKind, PolyDataBody};

/// Fan-triangulate polygons
///
/// An n-vertex polygon yields `n - 2` triangles `(v0, vi, vi+1)`. Cells with
/// fewer than three vertices contribute nothing.
///
/// # Examples
///
/// ```
/// use openigtlink_codec::mesh::triangulate_polygons;
///
/// let triangles = triangulate_polygons(&[vec![0, 1, 2, 3]]);
/// assert_eq!(triangles, vec![[0, 1, 2], [0, 2, 3]]);
/// ```
pub fn triangulate_polygons(polygons: &[Vec<u32>]) -> Vec<[u32; 3]> {
    let mut triangles = Vec::new();
    for polygon in polygons {
        if let Some((&first, rest)) = polygon.split_first() {
            for pair in rest.windows(2) {
                triangles.push([first, pair[0], pair[1]]);
            }
        }
    }
    triangles
}

/// Unroll triangle strips
///
/// Triangle `i` of a strip is `(v[i], v[i+1], v[i+2])` for even `i` and
/// `(v[i], v[i+2], v[i+1])` for odd `i`; a strip of n indices yields `n - 2`
/// triangles.
///
/// # Examples
///
/// ```
/// use openigtlink_codec::mesh::strips_to_triangles;
///
/// let triangles = strips_to_triangles(&[vec![0, 1, 2, 3, 4]]);
/// assert_eq!(triangles, vec![[0, 1, 2], [1, 3, 2], [2, 3, 4]]);
/// ```
pub fn strips_to_triangles(strips: &[Vec<u32>]) -> Vec<[u32; 3]> {
    let mut triangles = Vec::new();
    for strip in strips {
        for (i, w) in strip.windows(3).enumerate() {
            if i % 2 == 0 {
                triangles.push([w[0], w[1], w[2]]);
            } else {
                triangles.push([w[0], w[2], w[1]]);
            }
        }
    }
    triangles
}

/// Renderable triangle list
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleMesh {
    pub positions: Vec<[f32; 3]>,
    pub triangles: Vec<[u32; 3]>,
    /// Per-vertex RGBA, when the POLYDATA carries point colors
    pub colors: Option<Vec<[f32; 4]>>,
}

impl TriangleMesh {
    /// Build from decoded POLYDATA
    ///
    /// Triangles come from the polygon fans followed by the strips; vertex and
    /// line cells are not part of a surface and are ignored. Vertex colors are
    /// taken from a point RGBA attribute, or from 3-component point scalars
    /// with alpha 1.
    ///
    /// # Errors
    /// `MalformedPolyData` if a cell refers to a point that does not exist or
    /// the color attribute does not cover every point.
    pub fn from_polydata(polydata: &PolyDataBody) -> Result<Self> {
        let mut triangles = triangulate_polygons(&polydata.polygons);
        triangles.extend(strips_to_triangles(&polydata.triangle_strips));

        let num_points = polydata.points.len();
        if let Some(bad) = triangles
            .iter()
            .flatten()
            .find(|&&index| index as usize >= num_points)
        {
            return Err(IgtlError::MalformedPolyData(format!(
                "point index {} out of range for {} points",
                bad, num_points
            )));
        }

        Ok(TriangleMesh {
            positions: polydata.points.clone(),
            triangles,
            colors: vertex_colors(polydata)?,
        })
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Triangle indices as one flat list
    pub fn indices(&self) -> Vec<u32> {
        self.triangles.iter().flatten().copied().collect()
    }
}

fn vertex_colors(polydata: &PolyDataBody) -> Result<Option<Vec<[f32; 4]>>> {
    let attribute = match polydata.point_attribute(AttributeKind::Rgba) {
        Some(rgba) => rgba,
        None => match polydata.point_attribute(AttributeKind::Scalars) {
            Some(scalars) if scalars.num_components == 3 => scalars,
            _ => return Ok(None),
        },
    };

    if attribute.element_count() != polydata.points.len() {
        return Err(IgtlError::MalformedPolyData(format!(
            "color attribute {:?} covers {} of {} points",
            attribute.name,
            attribute.element_count(),
            polydata.points.len()
        )));
    }

    let colors = attribute
        .data
        .chunks_exact(attribute.num_components as usize)
        .map(|c| match c {
            [r, g, b, a] => [*r, *g, *b, *a],
            [r, g, b] => [*r, *g, *b, 1.0],
            _ => [0.0, 0.0, 0.0, 1.0],
        })
        .collect();
    Ok(Some(colors))
}
