//! Tile descriptors.

use std::fmt;

use rastersphere_geom::{
    GeoResult, Georeferencing, TexelsPerVertex, TileFootprint, TileVertices, VertexGrid,
    VertexLayout,
};

use crate::error::SourceResult;
use crate::source::{PixelBlock, RasterSource};

/// Index of a tile within its pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId(pub u32);

impl TileId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One tile of one level. Immutable once the pyramid is built.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    id: TileId,
    tile_x: u32,
    tile_y: u32,
    footprint: TileFootprint,
    grid: VertexGrid,
}

impl Tile {
    #[must_use]
    pub fn new(
        id: TileId,
        tile_x: u32,
        tile_y: u32,
        footprint: TileFootprint,
        density: TexelsPerVertex,
        max_vertices_per_axis: u32,
    ) -> Self {
        Self {
            id,
            tile_x,
            tile_y,
            grid: VertexGrid::for_tile(&footprint, density, max_vertices_per_axis),
            footprint,
        }
    }

    #[must_use]
    pub fn id(&self) -> TileId {
        self.id
    }

    #[must_use]
    pub fn level(&self) -> u32 {
        self.footprint.level
    }

    /// Column and row of the tile within its level's tile grid.
    #[must_use]
    pub fn position(&self) -> (u32, u32) {
        (self.tile_x, self.tile_y)
    }

    #[must_use]
    pub fn footprint(&self) -> &TileFootprint {
        &self.footprint
    }

    #[must_use]
    pub fn grid(&self) -> &VertexGrid {
        &self.grid
    }

    /// First texel covered, in texels of the tile's level.
    #[must_use]
    pub fn texel_offset(&self) -> (u32, u32) {
        (self.footprint.texel_x, self.footprint.texel_y)
    }

    #[must_use]
    pub fn texel_extent(&self) -> (u32, u32) {
        (self.footprint.texel_width, self.footprint.texel_height)
    }

    /// `(x0, x1, y0, y1)` in level-0 pixels.
    #[must_use]
    pub fn pixel_bounds(&self) -> (u32, u32, u32, u32) {
        (self.grid.x0, self.grid.x1, self.grid.y0, self.grid.y1)
    }

    /// Largest texture coordinate along each axis.
    #[must_use]
    pub fn texture_coordinate_range(&self) -> (f64, f64) {
        self.grid.texture_extent()
    }

    #[must_use]
    pub fn vertex_grid_dimensions(&self) -> (u32, u32) {
        (self.grid.columns, self.grid.rows)
    }

    pub fn load_block<S: RasterSource + ?Sized>(&self, source: &S) -> SourceResult<PixelBlock> {
        let (x, y) = self.texel_offset();
        let (width, height) = self.texel_extent();
        source.load_block(self.level(), x, y, width, height)
    }

    pub fn generate_vertices(
        &self,
        georef: &Georeferencing,
        layout: VertexLayout,
    ) -> GeoResult<TileVertices> {
        self.grid.generate(georef, layout)
    }
}
