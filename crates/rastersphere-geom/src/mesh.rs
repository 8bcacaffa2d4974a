//! Tile tessellation.
//!
//! A tile is drawn as a regular grid of vertices laid over its pixel
//! footprint. Edge vertices sit exactly on the footprint's integer pixel
//! boundary, and the grid resolution along an axis depends only on the
//! texel extent along that axis, so two tiles sharing an edge evaluate the
//! mapper at identical coordinates along it.

use glam::DVec3;

use crate::error::GeoResult;
use crate::fixed::TexelsPerVertex;
use crate::georeference::Georeferencing;

/// Per-vertex attributes a raster kind needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexLayout {
    /// Position and texture coordinate.
    Textured,
    /// Position, texture coordinate and a full tangent frame.
    TangentSpace,
}

impl VertexLayout {
    /// Size of one vertex in bytes.
    #[must_use]
    pub const fn stride(self) -> usize {
        match self {
            Self::Textured => size_of::<TexturedVertex>(),
            Self::TangentSpace => size_of::<TangentSpaceVertex>(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(C)]
pub struct TexturedVertex {
    pub position: [f32; 3],
    pub tex_coord: [f32; 2],
}

const _: () = assert!(size_of::<TexturedVertex>() == 20);

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(C)]
pub struct TangentSpaceVertex {
    pub position: [f32; 3],
    pub tex_coord: [f32; 2],
    /// Direction of increasing `u`.
    pub tangent: [f32; 3],
    /// Direction of increasing `v`.
    pub binormal: [f32; 3],
    pub normal: [f32; 3],
}

const _: () = assert!(size_of::<TangentSpaceVertex>() == 56);

/// Vertices of one tile, row-major from the tile's first scanline.
#[derive(Debug, Clone, PartialEq)]
pub enum TileVertices {
    Textured(Vec<TexturedVertex>),
    TangentSpace(Vec<TangentSpaceVertex>),
}

impl TileVertices {
    #[must_use]
    pub fn layout(&self) -> VertexLayout {
        match self {
            Self::Textured(_) => VertexLayout::Textured,
            Self::TangentSpace(_) => VertexLayout::TangentSpace,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Textured(v) => v.len(),
            Self::TangentSpace(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn position(&self, index: usize) -> Option<[f32; 3]> {
        match self {
            Self::Textured(v) => v.get(index).map(|v| v.position),
            Self::TangentSpace(v) => v.get(index).map(|v| v.position),
        }
    }

    #[must_use]
    pub fn tex_coord(&self, index: usize) -> Option<[f32; 2]> {
        match self {
            Self::Textured(v) => v.get(index).map(|v| v.tex_coord),
            Self::TangentSpace(v) => v.get(index).map(|v| v.tex_coord),
        }
    }
}

/// Where a tile sits in the raster, in texels of its own level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileFootprint {
    pub level: u32,
    pub texel_x: u32,
    pub texel_y: u32,
    pub texel_width: u32,
    pub texel_height: u32,
    pub tile_texel_dimension: u32,
    pub raster_width: u32,
    pub raster_height: u32,
}

impl TileFootprint {
    /// Level-0 pixels covered by one texel of this level.
    #[must_use]
    pub fn texel_size(&self) -> u64 {
        1u64 << self.level
    }

    /// Level-0 pixels spanned by a full tile texture along either axis.
    #[must_use]
    pub fn texture_span(&self) -> u64 {
        self.texel_size() * u64::from(self.tile_texel_dimension)
    }

    /// `(x0, x1, y0, y1)` in level-0 pixels, clipped to the raster.
    #[must_use]
    pub fn pixel_bounds(&self) -> (u32, u32, u32, u32) {
        let scale = self.texel_size();
        let clip = |texel: u32, texels: u32, limit: u32| -> (u32, u32) {
            let start = (u64::from(texel) * scale).min(u64::from(limit));
            let end = ((u64::from(texel) + u64::from(texels)) * scale).min(u64::from(limit));
            (to_u32(start), to_u32(end))
        };
        let (x0, x1) = clip(self.texel_x, self.texel_width, self.raster_width);
        let (y0, y1) = clip(self.texel_y, self.texel_height, self.raster_height);
        (x0, x1, y0, y1)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_u32(value: u64) -> u32 {
    value.min(u64::from(u32::MAX)) as u32
}

#[allow(clippy::cast_precision_loss)]
fn u64_to_f64(value: u64) -> f64 {
    value as f64
}

/// Vertex grid laid over a tile footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexGrid {
    pub x0: u32,
    pub x1: u32,
    pub y0: u32,
    pub y1: u32,
    pub columns: u32,
    pub rows: u32,
    /// Level-0 pixels per texel at the tile's level.
    pub texel_size: u64,
    /// Level-0 pixels spanned by the full tile texture.
    pub texture_span: u64,
    pub raster_width: u32,
    pub raster_height: u32,
}

impl VertexGrid {
    /// Grid for `footprint` at the level-0 mesh density `density`.
    #[must_use]
    pub fn for_tile(
        footprint: &TileFootprint,
        density: TexelsPerVertex,
        max_vertices: u32,
    ) -> Self {
        let (x0, x1, y0, y1) = footprint.pixel_bounds();
        let level_density = density.at_level(footprint.level);
        Self {
            x0,
            x1,
            y0,
            y1,
            columns: level_density.vertices_for_texels(footprint.texel_width, max_vertices),
            rows: level_density.vertices_for_texels(footprint.texel_height, max_vertices),
            texel_size: footprint.texel_size(),
            texture_span: footprint.texture_span(),
            raster_width: footprint.raster_width,
            raster_height: footprint.raster_height,
        }
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    /// Level-0 pixel x of vertex column `column`.
    #[must_use]
    pub fn pixel_x(&self, column: u32) -> f64 {
        interpolate(self.x0, self.x1, column, self.columns)
    }

    /// Level-0 pixel y of vertex row `row`.
    #[must_use]
    pub fn pixel_y(&self, row: u32) -> f64 {
        interpolate(self.y0, self.y1, row, self.rows)
    }

    /// Fraction of the tile texture covered by the footprint, per axis.
    /// Below 1 for tiles clipped by the raster's right or bottom edge.
    #[must_use]
    pub fn texture_extent(&self) -> (f64, f64) {
        let span = u64_to_f64(self.texture_span);
        (
            f64::from(self.x1 - self.x0) / span,
            f64::from(self.y1 - self.y0) / span,
        )
    }

    /// Pixel coordinates of every vertex on the grid's outer ring.
    #[must_use]
    pub fn boundary_samples(&self) -> Vec<(f64, f64)> {
        let last_column = self.columns - 1;
        let last_row = self.rows - 1;
        let mut samples = Vec::with_capacity(2 * (self.columns + self.rows) as usize);
        for column in 0..self.columns {
            samples.push((self.pixel_x(column), self.pixel_y(0)));
            samples.push((self.pixel_x(column), self.pixel_y(last_row)));
        }
        for row in 1..last_row {
            samples.push((self.pixel_x(0), self.pixel_y(row)));
            samples.push((self.pixel_x(last_column), self.pixel_y(row)));
        }
        samples
    }

    /// Pixel coordinates of every vertex, row-major.
    #[must_use]
    pub fn all_samples(&self) -> Vec<(f64, f64)> {
        (0..self.rows)
            .flat_map(|row| (0..self.columns).map(move |column| (column, row)))
            .map(|(column, row)| (self.pixel_x(column), self.pixel_y(row)))
            .collect()
    }

    /// Centre of the footprint in level-0 pixels.
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (
            (f64::from(self.x0) + f64::from(self.x1)) * 0.5,
            (f64::from(self.y0) + f64::from(self.y1)) * 0.5,
        )
    }

    /// Evaluate the mapper at every vertex.
    pub fn generate(
        &self,
        georef: &Georeferencing,
        layout: VertexLayout,
    ) -> GeoResult<TileVertices> {
        let span = u64_to_f64(self.texture_span);
        let x0 = f64::from(self.x0);
        let y0 = f64::from(self.y0);
        match layout {
            VertexLayout::Textured => {
                let mut vertices = Vec::with_capacity(self.vertex_count());
                for row in 0..self.rows {
                    let py = self.pixel_y(row);
                    for column in 0..self.columns {
                        let px = self.pixel_x(column);
                        let mapped = georef.map(px, py)?;
                        vertices.push(TexturedVertex {
                            position: mapped.position.as_vec3().to_array(),
                            tex_coord: tex_coord(px - x0, mapped.y - y0, span),
                        });
                    }
                }
                Ok(TileVertices::Textured(vertices))
            }
            VertexLayout::TangentSpace => {
                let mut vertices = Vec::with_capacity(self.vertex_count());
                for row in 0..self.rows {
                    let py = self.pixel_y(row);
                    for column in 0..self.columns {
                        let px = self.pixel_x(column);
                        let mapped = georef.map(px, py)?;
                        let normal = mapped.position;
                        let (tangent, binormal) = self.tangent_frame(georef, px, py, normal)?;
                        vertices.push(TangentSpaceVertex {
                            position: normal.as_vec3().to_array(),
                            tex_coord: tex_coord(px - x0, mapped.y - y0, span),
                            tangent: tangent.as_vec3().to_array(),
                            binormal: binormal.as_vec3().to_array(),
                            normal: normal.as_vec3().to_array(),
                        });
                    }
                }
                Ok(TileVertices::TangentSpace(vertices))
            }
        }
    }

    /// Central differences one level texel either side of the vertex, then
    /// orthonormalised against `normal`. At the raster edge the outer sample
    /// is extrapolated past the edge, falling back to the edge itself when
    /// the mapper rejects it.
    fn tangent_frame(
        &self,
        georef: &Georeferencing,
        px: f64,
        py: f64,
        normal: DVec3,
    ) -> GeoResult<(DVec3, DVec3)> {
        let step = u64_to_f64(self.texel_size);
        let width = f64::from(self.raster_width);
        let height = f64::from(self.raster_height);
        let neighbour = |x: f64, y: f64| {
            georef
                .to_sphere_point(x, y)
                .or_else(|_| georef.to_sphere_point(x.clamp(0.0, width), y.clamp(0.0, height)))
        };

        let east = neighbour(px + step, py)?;
        let west = neighbour(px - step, py)?;
        let south = neighbour(px, py + step)?;
        let north = neighbour(px, py - step)?;

        let tangent = direction((east - west) - normal * normal.dot(east - west));
        let binormal = (south - north) - normal * normal.dot(south - north);
        let binormal = match tangent {
            Some(t) => direction(binormal - t * t.dot(binormal)),
            None => direction(binormal),
        };

        Ok(match (tangent, binormal) {
            (Some(t), Some(b)) => (t, b),
            (Some(t), None) => (t, t.cross(normal)),
            (None, Some(b)) => (normal.cross(b), b),
            (None, None) => normal.any_orthonormal_pair(),
        })
    }
}

/// Unit vector along `v`, or `None` when `v` is too short to have a
/// meaningful direction (differences collapsing at a pole).
fn direction(v: DVec3) -> Option<DVec3> {
    if v.length_squared() > 1e-24 {
        v.try_normalize()
    } else {
        None
    }
}

#[allow(clippy::cast_possible_truncation)]
fn tex_coord(dx: f64, dy: f64, span: f64) -> [f32; 2] {
    [(dx / span) as f32, (dy / span) as f32]
}

fn interpolate(start: u32, end: u32, index: u32, count: u32) -> f64 {
    let last = count - 1;
    if index == 0 {
        f64::from(start)
    } else if index >= last {
        f64::from(end)
    } else {
        f64::from(start) + f64::from(end - start) * f64::from(index) / f64::from(last)
    }
}

/// Triangle-list indices for a `columns x rows` vertex grid, counter-clockwise
/// when viewed from outside the sphere for a north-up raster.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn grid_indices(columns: u32, rows: u32) -> Vec<u16> {
    debug_assert!(columns as usize * rows as usize <= usize::from(u16::MAX) + 1);
    if columns < 2 || rows < 2 {
        return Vec::new();
    }
    let mut indices = Vec::with_capacity(((columns - 1) * (rows - 1) * 6) as usize);
    for row in 0..rows - 1 {
        for column in 0..columns - 1 {
            let top_left = row * columns + column;
            let top_right = top_left + 1;
            let bottom_left = top_left + columns;
            let bottom_right = bottom_left + 1;
            indices.extend(
                [top_left, bottom_left, top_right, top_right, bottom_left, bottom_right]
                    .map(|i| i as u16),
            );
        }
    }
    indices
}
