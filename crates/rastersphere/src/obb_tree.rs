//! Per-level bounding volume hierarchy over the tile grid.
//!
//! Each level's tiles are bound by a balanced binary tree of oriented boxes
//! held in an arena. Splits always fall on tile boundaries, so every leaf
//! covers exactly one tile.

use glam::DVec3;
use rastersphere_geom::{
    Containment, Frustum, Georeferencing, ObbBuilder, OrientedBoundingBox, PlaneMask,
    TexelsPerVertex, TileFootprint,
};
use tracing::trace;

use crate::config::EngineConfig;
use crate::error::{BuildError, BuildResult};
use crate::tile::{Tile, TileId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Leaf(TileId),
    /// Indices of the two children in the level's node arena.
    Internal([u32; 2]),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObbTreeNode {
    pub obb: OrientedBoundingBox,
    pub kind: NodeKind,
}

/// One pyramid level: its size, tile grid and bounding tree.
#[derive(Debug, Clone)]
pub struct LevelOfDetail {
    level: u32,
    width: u32,
    height: u32,
    tiles_x: u32,
    tiles_y: u32,
    root: u32,
    nodes: Vec<ObbTreeNode>,
    /// Row-major tile ids.
    tile_grid: Vec<TileId>,
}

impl LevelOfDetail {
    #[must_use]
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Size in texels of this level.
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of tile columns and rows.
    #[must_use]
    pub fn tile_counts(&self) -> (u32, u32) {
        (self.tiles_x, self.tiles_y)
    }

    #[must_use]
    pub fn root(&self) -> u32 {
        self.root
    }

    #[must_use]
    pub fn nodes(&self) -> &[ObbTreeNode] {
        &self.nodes
    }

    #[must_use]
    pub fn tile_at(&self, tile_x: u32, tile_y: u32) -> Option<TileId> {
        if tile_x >= self.tiles_x || tile_y >= self.tiles_y {
            return None;
        }
        self.tile_grid
            .get(tile_y as usize * self.tiles_x as usize + tile_x as usize)
            .copied()
    }

    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node.kind, NodeKind::Leaf(_)))
            .count()
    }

    /// Append every tile whose box is not entirely outside `frustum`, in
    /// depth-first order with the first child first. Returns the number of
    /// nodes visited.
    pub fn cull(&self, frustum: &Frustum, visible: &mut Vec<TileId>) -> usize {
        let mut stack = vec![(self.root, PlaneMask::ALL)];
        let mut visited = 0;
        while let Some((index, mask)) = stack.pop() {
            visited += 1;
            let node = &self.nodes[index as usize];
            let mask = match frustum.classify_obb(&node.obb, mask) {
                Containment::Outside => {
                    trace!(level = self.level, node = index, "Culled");
                    continue;
                }
                Containment::Inside => PlaneMask::NONE,
                Containment::Intersecting(mask) => mask,
            };
            match node.kind {
                NodeKind::Leaf(tile) => visible.push(tile),
                NodeKind::Internal([first, second]) => {
                    stack.push((second, mask));
                    stack.push((first, mask));
                }
            }
        }
        visited
    }
}

/// Builds one level's tiles and tree.
pub(crate) struct LevelBuilder<'a> {
    pub georef: &'a Georeferencing,
    pub config: &'a EngineConfig,
    pub density: TexelsPerVertex,
    pub level: u32,
    pub num_levels: u32,
    pub level_width: u32,
    pub level_height: u32,
    pub raster_width: u32,
    pub raster_height: u32,
}

struct LevelState<'t> {
    tiles: &'t mut Vec<Tile>,
    nodes: Vec<ObbTreeNode>,
    tile_grid: Vec<TileId>,
}

impl LevelBuilder<'_> {
    fn tile_dimension(&self) -> u32 {
        self.config.tile_texel_dimension
    }

    fn tile_counts(&self) -> (u32, u32) {
        (
            self.level_width.div_ceil(self.tile_dimension()),
            self.level_height.div_ceil(self.tile_dimension()),
        )
    }

    /// Build the level, appending its tiles to `tiles`.
    pub fn build(&self, tiles: &mut Vec<Tile>) -> BuildResult<LevelOfDetail> {
        let (tiles_x, tiles_y) = self.tile_counts();
        let mut state = LevelState {
            tiles,
            nodes: Vec::with_capacity(2 * (tiles_x * tiles_y) as usize),
            tile_grid: vec![TileId(0); (tiles_x * tiles_y) as usize],
        };
        let root = self.build_region(&mut state, 0, tiles_x, 0, tiles_y)?;
        Ok(LevelOfDetail {
            level: self.level,
            width: self.level_width,
            height: self.level_height,
            tiles_x,
            tiles_y,
            root,
            nodes: state.nodes,
            tile_grid: state.tile_grid,
        })
    }

    fn build_region(
        &self,
        state: &mut LevelState<'_>,
        tx0: u32,
        tx1: u32,
        ty0: u32,
        ty1: u32,
    ) -> BuildResult<u32> {
        let across = tx1 - tx0;
        let down = ty1 - ty0;
        if across == 1 && down == 1 {
            return self.build_leaf(state, tx0, ty0);
        }

        let (first, second) = if across >= down {
            let split = tx0 + across.div_ceil(2);
            (
                self.build_region(state, tx0, split, ty0, ty1)?,
                self.build_region(state, split, tx1, ty0, ty1)?,
            )
        } else {
            let split = ty0 + down.div_ceil(2);
            (
                self.build_region(state, tx0, tx1, ty0, split)?,
                self.build_region(state, tx0, tx1, split, ty1)?,
            )
        };

        let first_obb = state.nodes[first as usize].obb;
        let second_obb = state.nodes[second as usize].obb;
        let (x0, x1, y0, y1) = self.region_pixels(tx0, tx1, ty0, ty1);
        let cx = (f64::from(x0) + f64::from(x1)) * 0.5;
        let cy = (f64::from(y0) + f64::from(y1)) * 0.5;
        let z_axis = self
            .georef
            .to_sphere_point(cx, cy)
            .ok()
            .or_else(|| (first_obb.center + second_obb.center).try_normalize())
            .unwrap_or(DVec3::Z);
        let mut builder = ObbBuilder::new(z_axis, self.north_hint(cx, y0, y1));
        builder.add_obb(&first_obb);
        builder.add_obb(&second_obb);
        let obb = builder.build().unwrap_or(first_obb);

        Ok(push_node(state, ObbTreeNode {
            obb,
            kind: NodeKind::Internal([first, second]),
        }))
    }

    fn build_leaf(&self, state: &mut LevelState<'_>, tile_x: u32, tile_y: u32) -> BuildResult<u32> {
        let dimension = self.tile_dimension();
        let texel_x = tile_x * dimension;
        let texel_y = tile_y * dimension;
        let footprint = TileFootprint {
            level: self.level,
            texel_x,
            texel_y,
            texel_width: dimension.min(self.level_width - texel_x),
            texel_height: dimension.min(self.level_height - texel_y),
            tile_texel_dimension: dimension,
            raster_width: self.raster_width,
            raster_height: self.raster_height,
        };
        #[allow(clippy::cast_possible_truncation)]
        let id = TileId(state.tiles.len() as u32);
        let tile = Tile::new(
            id,
            tile_x,
            tile_y,
            footprint,
            self.density,
            self.config.effective_max_vertices_per_axis(),
        );
        let obb = self.leaf_obb(&tile)?;

        let (tiles_x, _) = self.tile_counts();
        state.tile_grid[(tile_y * tiles_x + tile_x) as usize] = id;
        state.tiles.push(tile);
        Ok(push_node(state, ObbTreeNode {
            obb,
            kind: NodeKind::Leaf(id),
        }))
    }

    /// Box around the tile's sampled sphere positions.
    ///
    /// Coarse tiles can wrap far enough around the globe that their edges no
    /// longer bound their interior, so the coarsest levels sample every
    /// vertex. Samples the mapper rejects are skipped.
    fn leaf_obb(&self, tile: &Tile) -> BuildResult<OrientedBoundingBox> {
        let grid = tile.grid();
        let sample_interior =
            self.level + self.config.coarse_interior_sample_levels >= self.num_levels;
        let mut samples = if sample_interior {
            grid.all_samples()
        } else {
            grid.boundary_samples()
        };
        let (cx, cy) = grid.center();
        samples.push((cx, cy));

        let positions: Vec<DVec3> = samples
            .iter()
            .filter_map(|&(x, y)| match self.georef.to_sphere_point(x, y) {
                Ok(position) => Some(position),
                Err(error) => {
                    trace!(level = self.level, x, y, %error, "Skipping unmappable sample");
                    None
                }
            })
            .collect();
        if positions.is_empty() {
            let (tile_x, tile_y) = tile.position();
            return Err(BuildError::NoValidSamples {
                level: self.level,
                x: tile_x,
                y: tile_y,
            });
        }

        let z_axis = self
            .georef
            .to_sphere_point(cx, cy)
            .ok()
            .or_else(|| positions.iter().sum::<DVec3>().try_normalize())
            .unwrap_or(DVec3::Z);
        let mut builder = ObbBuilder::new(z_axis, self.north_hint(cx, grid.y0, grid.y1));
        for position in positions {
            builder.add_point(position);
        }
        builder.build().ok_or(BuildError::NoValidSamples {
            level: self.level,
            x: tile.position().0,
            y: tile.position().1,
        })
    }

    /// Direction from the southern to the northern edge of a region, used to
    /// orient boxes along the raster's columns.
    fn north_hint(&self, x: f64, y0: u32, y1: u32) -> DVec3 {
        match (
            self.georef.to_sphere_point(x, f64::from(y0)),
            self.georef.to_sphere_point(x, f64::from(y1)),
        ) {
            (Ok(north), Ok(south)) => north - south,
            _ => DVec3::Z,
        }
    }

    /// Level-0 pixel bounds of a range of tiles.
    fn region_pixels(&self, tx0: u32, tx1: u32, ty0: u32, ty1: u32) -> (u32, u32, u32, u32) {
        let span = u64::from(self.tile_dimension()) << self.level;
        let to_pixels = |tile: u32, limit: u32| -> u32 {
            let pixels = (u64::from(tile) * span).min(u64::from(limit));
            u32::try_from(pixels).unwrap_or(limit)
        };
        (
            to_pixels(tx0, self.raster_width),
            to_pixels(tx1, self.raster_width),
            to_pixels(ty0, self.raster_height),
            to_pixels(ty1, self.raster_height),
        )
    }
}

#[allow(clippy::cast_possible_truncation)]
fn push_node(state: &mut LevelState<'_>, node: ObbTreeNode) -> u32 {
    let index = state.nodes.len() as u32;
    state.nodes.push(node);
    index
}
