//! Level-of-detail pyramid construction.
//!
//! Built once per raster. Level 0 is native resolution and every further
//! level halves each dimension, rounding up, until the whole level fits in a
//! single tile. Each level gets its own tile grid and bounding tree.

use rastersphere_geom::{GeoreferenceTolerances, Georeferencing, TexelsPerVertex};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{BuildError, BuildResult};
use crate::extent::RasterExtent;
use crate::obb_tree::{LevelBuilder, LevelOfDetail};
use crate::tile::{Tile, TileId};

/// Dimensions of every level, finest first.
///
/// # Panics
///
/// Panics if `tile_dimension` is zero.
#[must_use]
pub fn level_dimensions(width: u32, height: u32, tile_dimension: u32) -> Vec<(u32, u32)> {
    assert!(tile_dimension > 0, "tile dimension must be nonzero");
    let mut levels = vec![(width, height)];
    let (mut width, mut height) = (width, height);
    while width > tile_dimension || height > tile_dimension {
        width = width.div_ceil(2);
        height = height.div_ceil(2);
        levels.push((width, height));
    }
    levels
}

/// The immutable result of pyramid construction.
#[derive(Debug, Clone)]
pub struct RasterPyramid {
    extent: RasterExtent,
    tile_texel_dimension: u32,
    levels: Vec<LevelOfDetail>,
    tiles: Vec<Tile>,
    texels_per_vertex: TexelsPerVertex,
    level0_max_texel_size: f64,
}

impl RasterPyramid {
    /// # Panics
    ///
    /// Panics if the configured tile dimension is zero or not a power of two.
    pub fn build(extent: RasterExtent, config: &EngineConfig) -> BuildResult<Self> {
        let tile_dimension = config.tile_texel_dimension;
        assert!(
            tile_dimension.is_power_of_two(),
            "tile dimension must be a nonzero power of two, got {tile_dimension}"
        );

        let georef = extent.georeferencing();
        let level0_max_texel_size =
            max_texel_size_at_level_zero(&extent, tile_dimension, &config.tolerances)?;
        let texels_per_vertex = texels_per_vertex_for(level0_max_texel_size, config);
        debug!(
            level0_max_texel_size,
            texels_per_vertex = texels_per_vertex.to_f64(),
            "Derived mesh density"
        );

        let dimensions = level_dimensions(extent.width(), extent.height(), tile_dimension);
        #[allow(clippy::cast_possible_truncation)]
        let num_levels = dimensions.len() as u32;
        let mut tiles = Vec::new();
        let mut levels = Vec::with_capacity(dimensions.len());
        for (level, &(level_width, level_height)) in (0u32..).zip(&dimensions) {
            let builder = LevelBuilder {
                georef,
                config,
                density: texels_per_vertex,
                level,
                num_levels,
                level_width,
                level_height,
                raster_width: extent.width(),
                raster_height: extent.height(),
            };
            let lod = builder.build(&mut tiles)?;
            debug!(
                level,
                width = level_width,
                height = level_height,
                tiles = lod.leaf_count(),
                "Built level"
            );
            levels.push(lod);
        }

        info!(
            width = extent.width(),
            height = extent.height(),
            levels = levels.len(),
            tiles = tiles.len(),
            "Built raster pyramid"
        );

        Ok(Self {
            extent,
            tile_texel_dimension: tile_dimension,
            levels,
            tiles,
            texels_per_vertex,
            level0_max_texel_size,
        })
    }

    #[must_use]
    pub fn extent(&self) -> &RasterExtent {
        &self.extent
    }

    #[must_use]
    pub fn georeferencing(&self) -> &Georeferencing {
        self.extent.georeferencing()
    }

    #[must_use]
    pub fn tile_texel_dimension(&self) -> u32 {
        self.tile_texel_dimension
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn num_levels(&self) -> u32 {
        self.levels.len() as u32
    }

    #[must_use]
    pub fn levels(&self) -> &[LevelOfDetail] {
        &self.levels
    }

    #[must_use]
    pub fn level(&self, level: u32) -> Option<&LevelOfDetail> {
        self.levels.get(level as usize)
    }

    #[must_use]
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    #[must_use]
    pub fn tile(&self, id: TileId) -> Option<&Tile> {
        self.tiles.get(id.index())
    }

    #[must_use]
    pub fn texels_per_vertex(&self) -> TexelsPerVertex {
        self.texels_per_vertex
    }

    /// Largest chord, on the unit sphere, spanned by one level-0 texel.
    #[must_use]
    pub fn level0_max_texel_size(&self) -> f64 {
        self.level0_max_texel_size
    }

    /// Largest vertex count of any tile mesh.
    #[must_use]
    pub fn max_vertex_count(&self) -> usize {
        self.tiles
            .iter()
            .map(|tile| tile.grid().vertex_count())
            .max()
            .unwrap_or(0)
    }
}

/// Sample each level-0 tile near its centre and keep the largest distance
/// between neighbouring texel corners.
fn max_texel_size_at_level_zero(
    extent: &RasterExtent,
    tile_dimension: u32,
    tolerances: &GeoreferenceTolerances,
) -> BuildResult<f64> {
    let georef = extent.georeferencing();
    let width = extent.width();
    let height = extent.height();
    let inset = tolerances.edge_inset;
    let keep_inside = |centre: f64, size: u32| centre.min(f64::from(size) - 1.0 - inset).max(inset);

    let mut largest: Option<f64> = None;
    for tile_y in 0..height.div_ceil(tile_dimension) {
        for tile_x in 0..width.div_ceil(tile_dimension) {
            let x0 = u64::from(tile_x) * u64::from(tile_dimension);
            let y0 = u64::from(tile_y) * u64::from(tile_dimension);
            let x1 = (x0 + u64::from(tile_dimension)).min(u64::from(width));
            let y1 = (y0 + u64::from(tile_dimension)).min(u64::from(height));
            #[allow(clippy::cast_precision_loss)]
            let (x, y) = (
                keep_inside((x0 + x1) as f64 * 0.5, width),
                keep_inside((y0 + y1) as f64 * 0.5, height),
            );

            let Ok(origin) = georef.to_sphere_point(x, y) else {
                continue;
            };
            let neighbours = [
                georef.to_sphere_point(x + 1.0, y),
                georef.to_sphere_point(x, y + 1.0),
            ];
            for neighbour in neighbours.into_iter().flatten() {
                let size = origin.distance(neighbour);
                if size > 0.0 && size.is_finite() {
                    largest = Some(largest.map_or(size, |l| l.max(size)));
                }
            }
        }
    }
    largest.ok_or(BuildError::NoTexelSizeSamples)
}

/// Texels per mesh segment such that a segment spans at most
/// `max_degrees_per_vertex` of arc.
fn texels_per_vertex_for(level0_texel_size: f64, config: &EngineConfig) -> TexelsPerVertex {
    let texel_degrees = (2.0 * (level0_texel_size * 0.5).min(1.0).asin()).to_degrees();
    let ratio = config.max_degrees_per_vertex / texel_degrees;
    TexelsPerVertex::from_f64(
        ratio
            .max(config.min_texels_per_vertex)
            .min(config.max_texels_per_vertex),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obb_tree::NodeKind;
    use glam::DVec3;
    use proptest::prelude::*;
    use rastersphere_geom::{AffineTransform, CoordinateTransform, GeoError, GeoResult};
    use std::sync::Arc;

    fn config(tile_texel_dimension: u32) -> EngineConfig {
        EngineConfig {
            tile_texel_dimension,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn thousand_by_five_hundred_has_four_levels() {
        assert_eq!(
            level_dimensions(1000, 500, 256),
            vec![(1000, 500), (500, 250), (250, 125), (125, 63)]
        );

        let pyramid = RasterPyramid::build(RasterExtent::global(1000, 500), &config(256)).unwrap();
        assert_eq!(pyramid.num_levels(), 4);
        let level0 = &pyramid.levels()[0];
        assert_eq!(level0.tile_counts(), (4, 2));
        assert_eq!(level0.leaf_count(), 8);
        assert_eq!(pyramid.levels()[3].leaf_count(), 1);
        assert_eq!(pyramid.tiles().len(), 8 + 2 + 1 + 1);
    }

    #[test]
    fn partial_tiles_have_short_texture_ranges() {
        let pyramid = RasterPyramid::build(RasterExtent::global(1000, 500), &config(256)).unwrap();
        let level0 = &pyramid.levels()[0];
        let corner = pyramid.tile(level0.tile_at(3, 1).unwrap()).unwrap();
        assert_eq!(corner.texel_offset(), (768, 256));
        assert_eq!(corner.texel_extent(), (232, 244));
        let (u, v) = corner.texture_coordinate_range();
        assert!(u < 1.0 && v < 1.0);

        let interior = pyramid.tile(level0.tile_at(0, 0).unwrap()).unwrap();
        assert_eq!(interior.texture_coordinate_range(), (1.0, 1.0));
    }

    #[test]
    fn splits_give_the_first_child_the_larger_half() {
        let pyramid = RasterPyramid::build(RasterExtent::global(1000, 500), &config(128)).unwrap();
        // Level 0 is 8 x 4 tiles; the root splits along x into 4 + 4.
        let level0 = &pyramid.levels()[0];
        let NodeKind::Internal([first, _]) = level0.nodes()[level0.root() as usize].kind else {
            panic!("root should be internal");
        };
        let mut tiles = Vec::new();
        collect_tiles(level0, first, &mut tiles);
        assert_eq!(tiles.len(), 16);
        assert!(tiles.iter().all(|&(x, _)| x < 4));

        // Level 2 is 2 x 1 tiles of 250 x 125 texels.
        let level2 = &pyramid.levels()[2];
        assert_eq!(level2.tile_counts(), (2, 1));
    }

    fn collect_tiles(level: &LevelOfDetail, node: u32, out: &mut Vec<(u32, u32)>) {
        match level.nodes()[node as usize].kind {
            NodeKind::Leaf(_) => out.push(position_of(level, node)),
            NodeKind::Internal([a, b]) => {
                collect_tiles(level, a, out);
                collect_tiles(level, b, out);
            }
        }
    }

    fn position_of(level: &LevelOfDetail, node: u32) -> (u32, u32) {
        let NodeKind::Leaf(id) = level.nodes()[node as usize].kind else {
            unreachable!();
        };
        let (tiles_x, tiles_y) = level.tile_counts();
        (0..tiles_y)
            .flat_map(|y| (0..tiles_x).map(move |x| (x, y)))
            .find(|&(x, y)| level.tile_at(x, y) == Some(id))
            .unwrap()
    }

    #[test]
    fn level_zero_texel_size_matches_equatorial_spacing() {
        // 360 x 180 global raster: one degree per texel, largest at the equator.
        let pyramid = RasterPyramid::build(RasterExtent::global(360, 180), &config(64)).unwrap();
        let one_degree_chord = 2.0 * (0.5f64.to_radians()).sin();
        let size = pyramid.level0_max_texel_size();
        assert!(size <= one_degree_chord * (1.0 + 1e-9));
        assert!(size > one_degree_chord * 0.99);
        // One degree per texel and one degree per segment.
        assert!((pyramid.texels_per_vertex().to_f64() - 1.0).abs() < 0.02);
    }

    #[test]
    fn leaf_boxes_contain_their_vertices_at_coarse_levels() {
        let pyramid = RasterPyramid::build(RasterExtent::global(1000, 500), &config(256)).unwrap();
        let georef = pyramid.georeferencing();
        for level in pyramid.levels() {
            for node in level.nodes() {
                let NodeKind::Leaf(id) = node.kind else { continue };
                let tile = pyramid.tile(id).unwrap();
                for (x, y) in tile.grid().all_samples() {
                    let position = georef.to_sphere_point(x, y).unwrap();
                    assert!(
                        node.obb.contains_point(position, 1e-9),
                        "level {} tile {id}",
                        level.level()
                    );
                }
            }
        }
    }

    /// Plate carrée that rejects longitudes west of `limit`.
    #[derive(Debug)]
    struct WestUnmappable {
        limit: f64,
    }

    impl CoordinateTransform for WestUnmappable {
        fn to_geographic(&self, x: f64, y: f64) -> GeoResult<(f64, f64)> {
            if x < self.limit {
                return Err(GeoError::Projection {
                    x,
                    y,
                    reason: "west of limit".to_owned(),
                });
            }
            Ok((x, y))
        }

        fn from_geographic(&self, longitude: f64, latitude: f64) -> GeoResult<(f64, f64)> {
            Ok((longitude, latitude))
        }
    }

    fn unmappable_west_of(limit: f64) -> RasterExtent {
        let georef = Georeferencing::new(AffineTransform::global(1000, 500), 500)
            .with_transform(Arc::new(WestUnmappable { limit }));
        RasterExtent::new(1000, 500, georef)
    }

    #[test]
    fn unmappable_samples_are_skipped() {
        let pyramid = RasterPyramid::build(unmappable_west_of(-170.0), &config(256)).unwrap();
        assert_eq!(pyramid.num_levels(), 4);
        assert_eq!(pyramid.levels()[0].leaf_count(), 8);

        // The westernmost tile is bounded by the samples that did map.
        let level0 = &pyramid.levels()[0];
        let west = level0.tile_at(0, 0).unwrap();
        let leaf = level0
            .nodes()
            .iter()
            .find(|node| matches!(node.kind, NodeKind::Leaf(id) if id == west))
            .unwrap();
        let georef = pyramid.georeferencing();
        for (x, y) in pyramid.tile(west).unwrap().grid().boundary_samples() {
            if let Ok(position) = georef.to_sphere_point(x, y) {
                assert!(leaf.obb.contains_point(position, 1e-9));
            }
        }
    }

    #[test]
    fn a_tile_without_mappable_samples_fails_the_build() {
        let error = RasterPyramid::build(unmappable_west_of(-87.0), &config(256)).unwrap_err();
        assert!(matches!(error, BuildError::NoValidSamples { level: 0, x: 0, y: 0 }));
    }

    #[test]
    fn an_unmappable_raster_fails_the_build() {
        let error = RasterPyramid::build(unmappable_west_of(1000.0), &config(256)).unwrap_err();
        assert!(matches!(error, BuildError::NoTexelSizeSamples));
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn non_power_of_two_tiles_are_rejected() {
        let _ = RasterPyramid::build(RasterExtent::global(100, 100), &config(100));
    }

    proptest! {
        #[test]
        fn pyramid_terminates_within_bound(
            width in 1u32..200_000,
            height in 1u32..200_000,
            tile_shift in 0u32..11,
        ) {
            let tile = 1u32 << tile_shift;
            let levels = level_dimensions(width, height, tile);
            let largest = f64::from(width.max(height));
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let bound = (largest / f64::from(tile)).log2().ceil().max(0.0) as usize + 1;
            prop_assert!(levels.len() - 1 <= bound);
            let &(last_width, last_height) = levels.last().unwrap();
            prop_assert!(last_width <= tile && last_height <= tile);
            for &(w, h) in &levels[..levels.len() - 1] {
                prop_assert!(w > tile || h > tile);
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn parents_contain_children(
            width in 16u32..1500,
            height in 8u32..800,
            tile_shift in 4u32..8,
        ) {
            let pyramid = RasterPyramid::build(
                RasterExtent::global(width, height),
                &config(1 << tile_shift),
            ).unwrap();
            for level in pyramid.levels() {
                for node in level.nodes() {
                    let NodeKind::Internal(children) = node.kind else { continue };
                    for child in children {
                        let child = &level.nodes()[child as usize].obb;
                        let mut points: Vec<DVec3> = child.corners().to_vec();
                        points.push(child.center);
                        points.push(child.point_at(DVec3::new(0.5, -0.25, 0.75)));
                        points.push(child.point_at(DVec3::new(-0.9, 0.1, -0.3)));
                        for point in points {
                            prop_assert!(node.obb.contains_point(point, 1e-9));
                        }
                    }
                }
            }
        }
    }
}
