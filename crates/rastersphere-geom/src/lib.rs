//! Geometry for draping georeferenced rasters on the unit sphere.
//!
//! This crate provides the pure synchronous building blocks of the tiled
//! raster engine: mapping raster pixels onto the globe, bounding that geometry
//! with oriented boxes, culling boxes against a view frustum and tessellating
//! tiles into vertex grids. Nothing here touches a graphics device or caches
//! anything - the engine crate decides when and how often to call in.
//!
//! # Design principles
//!
//! - **Deterministic**: identical inputs produce bit-identical outputs, so
//!   adjacent tiles that generate their shared edge independently agree exactly
//! - **Synchronous**: no async, no threading primitives
//! - **Fixed-point where it matters**: vertex densities are integer ratios
//!
//! # Key items
//!
//! - [`Georeferencing`]: pixel coordinate to unit-sphere position
//! - [`TexelsPerVertex`]: fixed-point mesh density
//! - [`ObbBuilder`] / [`OrientedBoundingBox`]: bounding volumes for culling
//! - [`Frustum`] / [`PlaneMask`]: hierarchical frustum culling
//! - [`VertexGrid`]: per-tile mesh generation

mod error;

pub mod fixed;
pub mod frustum;
pub mod georeference;
pub mod mesh;
pub mod obb;

pub use error::{GeoError, GeoResult};
pub use fixed::TexelsPerVertex;
pub use frustum::{Containment, Frustum, Plane, PlaneMask};
pub use georeference::{
    AffineTransform, CoordinateTransform, GeoPoint, GeoreferenceTolerances, Georeferencing,
    MappedPoint, ScanlineOrder, WebMercator,
};
pub use mesh::{
    TangentSpaceVertex, TexturedVertex, TileFootprint, TileVertices, VertexGrid, VertexLayout,
    grid_indices,
};
pub use obb::{ObbBuilder, OrientedBoundingBox};

/// Largest number of vertices along one side of a tile mesh.
///
/// Tile meshes are indexed with `u16`, so a square grid can hold at most
/// `256 * 256 = 65536` vertices.
pub const MAX_VERTICES_PER_AXIS: u32 = 256;

const _: () = assert!(MAX_VERTICES_PER_AXIS * MAX_VERTICES_PER_AXIS <= u16::MAX as u32 + 1);
