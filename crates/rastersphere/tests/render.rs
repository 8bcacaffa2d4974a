use std::sync::Arc;

use approx::assert_relative_eq;
use glam::DVec3;
use image::{Rgba, RgbaImage};
use rastersphere::geom::{
    AffineTransform, CoordinateTransform, GeoError, GeoResult, Georeferencing, VertexLayout,
};
use rastersphere::{
    BuildError, BuildResult, CacheConfig, CacheHandle, DeviceCapabilities, EngineConfig,
    FloatImage, HeadlessDevice, ImageRasterSource, MultiResolutionRaster, PixelBlock, Projection,
    RasterExtent, RasterKind, RenderContext, TileId, ViewState, Viewport,
};

type Engine = MultiResolutionRaster<ImageRasterSource, HeadlessDevice>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn checkerboard(width: u32, height: u32, dark: u8) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let value = if (x / 16 + y / 16) % 2 == 0 { 255 } else { dark };
        Rgba([value, value, value, 255])
    })
}

fn engine_over(
    extent: RasterExtent,
    kind: RasterKind,
    config: &EngineConfig,
) -> (Engine, HeadlessDevice) {
    init_tracing();
    let device = HeadlessDevice::default();
    let context = RenderContext::probe(&device);
    let source = ImageRasterSource::rgba(kind, checkerboard(extent.width(), extent.height(), 0));
    let raster = MultiResolutionRaster::new(&context, extent, source, config).unwrap();
    (raster, device)
}

/// The 1000 x 500 global raster with 256-texel tiles.
fn engine_with(config: &EngineConfig) -> (Engine, HeadlessDevice) {
    engine_over(RasterExtent::global(1000, 500), RasterKind::Visual, config)
}

fn engine() -> (Engine, HeadlessDevice) {
    engine_with(&EngineConfig::default())
}

fn perspective(eye: DVec3, target: DVec3) -> ViewState {
    ViewState::look_at(
        eye,
        target,
        DVec3::Z,
        Projection::Perspective {
            fov_y: 0.8,
            near: 0.01,
            far: 100.0,
        },
        Viewport {
            width: 800,
            height: 600,
        },
    )
}

fn facing_globe() -> ViewState {
    perspective(DVec3::new(3.0, 0.0, 0.0), DVec3::ZERO)
}

fn level0_tile(raster: &Engine, x: u32, y: u32) -> TileId {
    raster.pyramid().levels()[0].tile_at(x, y).unwrap()
}

fn mesh_positions(
    raster: &mut Engine,
    device: &mut HeadlessDevice,
    tile: TileId,
    handle: &mut CacheHandle,
) -> Vec<[f32; 3]> {
    let mesh = raster.tile_mesh(device, tile, handle).unwrap();
    let vertices = mesh.vertices.vertices.as_ref().unwrap();
    (0..vertices.len())
        .map(|index| vertices.position(index).unwrap())
        .collect()
}

#[test]
fn pyramid_of_a_thousand_by_five_hundred_raster() {
    let (raster, _) = engine();
    assert_eq!(raster.num_levels_of_detail(), 4);
    let dimensions: Vec<_> = raster
        .pyramid()
        .levels()
        .iter()
        .map(|level| level.dimensions())
        .collect();
    assert_eq!(dimensions, vec![(1000, 500), (500, 250), (250, 125), (125, 63)]);
    assert_eq!(raster.pyramid().levels()[0].leaf_count(), 8);
}

#[test]
fn pixel_matching_the_finest_texel_selects_level_zero() {
    let (raster, _) = engine();
    let t0 = raster.pyramid().level0_max_texel_size();
    let view = ViewState::look_at(
        DVec3::new(3.0, 0.0, 0.0),
        DVec3::ZERO,
        DVec3::Z,
        Projection::Orthographic {
            half_height: t0 * 256.0,
            near: 0.1,
            far: 10.0,
        },
        Viewport {
            width: 512,
            height: 512,
        },
    );
    assert_eq!(view.min_pixel_size_on_sphere(), t0);

    let lod = raster.get_level_of_detail(&view, 0.0);
    assert_eq!(lod, 0.0);
    assert_eq!(raster.clamp_level_of_detail(lod), 0.0);
}

#[test]
fn distant_cameras_select_coarser_levels() {
    let (raster, _) = engine();
    let at = |distance: f64| perspective(DVec3::new(distance, 0.0, 0.0), DVec3::ZERO);
    let near = raster.get_level_of_detail(&at(1.5), 0.0);
    let far = raster.get_level_of_detail(&at(50.0), 0.0);
    assert!(far > near);
    assert_eq!(raster.clamp_level_of_detail(near), 0.0);
    assert_eq!(raster.clamp_level_of_detail(far), 3.0);
}

#[test]
fn render_draws_exactly_the_visible_tiles() {
    let (mut raster, mut device) = engine();
    let view = facing_globe();
    let visible = raster.visible_tiles(&view, 0);
    assert!(!visible.is_empty());

    let outcome = raster.render(&mut device, &view, 0.0);
    assert!(outcome.tiles_drawn);
    assert_eq!(outcome.stats.level, 0);
    assert_eq!(outcome.stats.candidates, visible.len());
    assert_eq!(outcome.stats.drawn, visible.len());
    assert_eq!(outcome.stats.skipped, 0);

    let draws = device.take_draws();
    let drawn: Vec<TileId> = draws.iter().map(|draw| draw.tile).collect();
    assert_eq!(drawn, visible);
    // Tiles with the same grid size share one index buffer.
    let grid = |tile: TileId| raster.tile(tile).unwrap().vertex_grid_dimensions();
    for (a, b) in draws.iter().zip(draws.iter().skip(1)) {
        assert!(a.index_count > 0);
        if grid(a.tile) == grid(b.tile) {
            assert_eq!(a.index_buffer, b.index_buffer);
        }
    }

    raster.release(outcome.cache_handle);
    assert_eq!(raster.cache_stats().textures.pinned, 0);
    assert_eq!(raster.cache_stats().vertex_buffers.pinned, 0);
}

#[test]
fn camera_facing_away_draws_nothing() {
    let (mut raster, mut device) = engine();
    let view = perspective(DVec3::new(10.0, 0.0, 0.0), DVec3::new(11.0, 0.0, 0.0));
    let outcome = raster.render(&mut device, &view, 0.0);
    assert!(!outcome.tiles_drawn);
    assert_eq!(outcome.stats.candidates, 0);
    assert!(outcome.stats.nodes_visited >= 1);
    assert!(outcome.cache_handle.is_empty());
    assert_eq!(device.counters().textures_created, 0);
    raster.release(outcome.cache_handle);
}

#[test]
fn repeated_frames_reuse_resident_tiles() {
    let (mut raster, mut device) = engine();
    let view = facing_globe();

    let first = raster.render(&mut device, &view, 0.0);
    assert_eq!(first.stats.textures_uploaded, first.stats.drawn);
    assert_eq!(first.stats.meshes_generated, first.stats.drawn);

    let second = raster.render(&mut device, &view, 0.0);
    assert_eq!(second.stats.drawn, first.stats.drawn);
    assert_eq!(second.stats.textures_uploaded, 0);
    assert_eq!(second.stats.meshes_generated, 0);
    assert_eq!(device.counters().texture_uploads, first.stats.drawn as u64);

    raster.release(first.cache_handle);
    raster.release(second.cache_handle);
    assert_eq!(raster.cache_stats().textures.pinned, 0);
}

#[test]
fn acquiring_a_texture_twice_uploads_once() {
    let (mut raster, mut device) = engine();
    let tile = level0_tile(&raster, 1, 0);
    let mut handle = CacheHandle::new();

    let first = raster.tile_texture(&mut device, tile, &mut handle).unwrap().id;
    let second = raster.tile_texture(&mut device, tile, &mut handle).unwrap().id;
    assert_eq!(first, second);
    assert_eq!(device.counters().texture_uploads, 1);
    assert_eq!(handle.len(), 2);

    raster.release(handle);
    assert_eq!(raster.cache_stats().textures.pinned, 0);
    assert_eq!(raster.cache_stats().textures.live, 1);
}

#[test]
fn partial_tiles_upload_their_own_extent() {
    let (mut raster, mut device) = engine();
    let tile = level0_tile(&raster, 3, 1);
    let mut handle = CacheHandle::new();
    let texture = raster.tile_texture(&mut device, tile, &mut handle).unwrap();
    assert_eq!(texture.dimension, 256);
    assert_eq!(texture.contents, Some((232, 244)));
    raster.release(handle);
}

#[test]
fn replacing_the_source_refreshes_textures_but_not_meshes() {
    let (mut raster, mut device) = engine();
    let view = facing_globe();
    let first = raster.render(&mut device, &view, 0.0);
    let drawn = first.stats.drawn;
    raster.release(first.cache_handle);

    raster
        .source_mut()
        .replace(PixelBlock::Rgba8(checkerboard(1000, 500, 128)));

    let refreshed = raster.render(&mut device, &view, 0.0);
    assert_eq!(refreshed.stats.drawn, drawn);
    assert_eq!(refreshed.stats.textures_uploaded, drawn);
    assert_eq!(refreshed.stats.meshes_generated, 0);
    assert_eq!(raster.cache_stats().textures.stale_refreshes, drawn as u64);
    raster.release(refreshed.cache_handle);

    // Up to date again.
    let steady = raster.render(&mut device, &view, 0.0);
    assert_eq!(steady.stats.textures_uploaded, 0);
    raster.release(steady.cache_handle);
}

#[test]
fn a_failed_upload_skips_only_that_tile() {
    let (mut raster, mut device) = engine();
    let view = facing_globe();

    device.fail_next_uploads(1);
    let outcome = raster.render(&mut device, &view, 0.0);
    assert!(outcome.stats.candidates >= 2);
    assert_eq!(outcome.stats.skipped, 1);
    assert_eq!(outcome.stats.drawn, outcome.stats.candidates - 1);
    assert!(outcome.tiles_drawn);
    assert_eq!(outcome.cache_handle.len(), 2 * outcome.stats.drawn);
    raster.release(outcome.cache_handle);

    // The skipped tile is retried on the next frame.
    let retry = raster.render(&mut device, &view, 0.0);
    assert_eq!(retry.stats.skipped, 0);
    assert_eq!(retry.stats.drawn, retry.stats.candidates);
    assert_eq!(retry.stats.textures_uploaded, 1);
    raster.release(retry.cache_handle);
}

#[test]
fn a_failed_draw_is_skipped() {
    let (mut raster, mut device) = engine();
    let view = facing_globe();
    device.fail_next_draws(1);
    let outcome = raster.render(&mut device, &view, 0.0);
    assert_eq!(outcome.stats.skipped, 1);
    assert_eq!(outcome.stats.drawn, outcome.stats.candidates - 1);
    assert_eq!(device.draws().len(), outcome.stats.drawn);
    raster.release(outcome.cache_handle);
}

#[test]
fn a_failed_refresh_keeps_the_previous_frame_pinned() {
    let (mut raster, mut device) = engine();
    let view = facing_globe();
    let held = raster.render(&mut device, &view, 0.0);
    let drawn = held.stats.drawn;
    assert_eq!(raster.cache_stats().textures.pinned, drawn);

    raster
        .source_mut()
        .replace(PixelBlock::Rgba8(checkerboard(1000, 500, 128)));
    device.fail_next_uploads(1);
    let refreshed = raster.render(&mut device, &view, 0.0);
    assert_eq!(refreshed.stats.skipped, 1);
    assert_eq!(raster.cache_stats().textures.pinned, drawn);
    raster.release(refreshed.cache_handle);
    assert_eq!(raster.cache_stats().textures.pinned, drawn);
    raster.release(held.cache_handle);
    assert_eq!(raster.cache_stats().textures.pinned, 0);

    // The tile that failed is uploaded again in place.
    let created = device.counters().textures_created;
    let retry = raster.render(&mut device, &view, 0.0);
    assert_eq!(retry.stats.skipped, 0);
    assert_eq!(retry.stats.textures_uploaded, 1);
    assert_eq!(device.counters().textures_created, created);
    raster.release(retry.cache_handle);
}

/// Plate carrée that refuses longitudes west of `limit`.
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
                reason: "outside projection domain".to_owned(),
            });
        }
        Ok((x, y))
    }

    fn from_geographic(&self, longitude: f64, latitude: f64) -> GeoResult<(f64, f64)> {
        Ok((longitude, latitude))
    }
}

#[test]
fn tiles_with_unmappable_vertices_are_skipped() {
    let georeferencing = Georeferencing::new(AffineTransform::global(1000, 500), 500)
        .with_transform(Arc::new(WestUnmappable { limit: -170.0 }));
    let (mut raster, mut device) = engine_over(
        RasterExtent::new(1000, 500, georeferencing),
        RasterKind::Visual,
        &EngineConfig::default(),
    );
    assert_eq!(raster.num_levels_of_detail(), 4);

    // Looking at the antimeridian: the westernmost column cannot be meshed.
    let view = perspective(DVec3::new(-3.0, 0.0, 0.0), DVec3::ZERO);
    let outcome = raster.render(&mut device, &view, 0.0);
    assert!(outcome.stats.skipped > 0);
    assert!(outcome.tiles_drawn);
    assert_eq!(outcome.stats.drawn + outcome.stats.skipped, outcome.stats.candidates);
    assert!(device.draws().iter().all(|draw| {
        let (x, _) = raster.tile(draw.tile).unwrap().position();
        x != 0
    }));
    raster.release(outcome.cache_handle);
}

#[test]
#[should_panic(expected = "outside")]
fn rendering_past_the_coarsest_level_panics() {
    let (mut raster, mut device) = engine();
    let _ = raster.render(&mut device, &facing_globe(), 4.0);
}

fn small_caches() -> EngineConfig {
    EngineConfig {
        cache: CacheConfig {
            max_textures: 2,
            max_vertex_buffers: 2,
        },
        ..EngineConfig::default()
    }
}

#[test]
fn released_tiles_are_recycled_for_other_levels() {
    let (mut raster, mut device) = engine_with(&small_caches());
    let view = facing_globe();

    let fine = raster.render(&mut device, &view, 0.0);
    assert!(fine.stats.drawn >= 2);
    raster.release(fine.cache_handle);
    let created = device.counters().textures_created;

    let coarse = raster.render(&mut device, &view, 1.0);
    assert!(coarse.tiles_drawn);
    assert_eq!(device.counters().textures_created, created);
    assert_eq!(raster.cache_stats().textures.recycles, coarse.stats.drawn as u64);
    assert_eq!(coarse.stats.textures_uploaded, coarse.stats.drawn);
    raster.release(coarse.cache_handle);
}

#[test]
fn pinned_tiles_are_never_recycled() {
    let (mut raster, mut device) = engine_with(&small_caches());
    let view = facing_globe();

    let fine = raster.render(&mut device, &view, 0.0);
    let created = device.counters().textures_created;
    let coarse = raster.render(&mut device, &view, 1.0);
    assert_eq!(
        device.counters().textures_created,
        created + coarse.stats.drawn as u64
    );
    assert_eq!(raster.cache_stats().textures.recycles, 0);

    // The fine frame's textures are still resident and valid.
    let again = raster.render(&mut device, &view, 0.0);
    assert_eq!(again.stats.textures_uploaded, 0);

    let mut handle = fine.cache_handle;
    handle.merge(coarse.cache_handle);
    handle.merge(again.cache_handle);
    raster.release(handle);
    assert_eq!(raster.cache_stats().textures.pinned, 0);
}

#[test]
fn shrinking_destroys_idle_objects_beyond_capacity() {
    let (mut raster, mut device) = engine_with(&small_caches());
    let outcome = raster.render(&mut device, &facing_globe(), 0.0);
    let drawn = outcome.stats.drawn;

    // Nothing idle while pinned.
    assert_eq!(raster.shrink_caches(), 0);
    raster.release(outcome.cache_handle);

    assert_eq!(raster.shrink_caches(), 2 * drawn.saturating_sub(2));
    let stats = raster.cache_stats();
    assert_eq!(stats.textures.live, drawn.min(2));
    assert_eq!(stats.vertex_buffers.live, drawn.min(2));
}

#[test]
fn neighbouring_tiles_share_edge_vertices() {
    let (mut raster, mut device) = engine();
    let mut handle = CacheHandle::new();
    let left = level0_tile(&raster, 0, 0);
    let right = level0_tile(&raster, 1, 0);
    let below = level0_tile(&raster, 0, 1);
    let (columns, rows) = raster.tile(left).unwrap().vertex_grid_dimensions();
    let (right_columns, right_rows) = raster.tile(right).unwrap().vertex_grid_dimensions();
    let (below_columns, _) = raster.tile(below).unwrap().vertex_grid_dimensions();
    assert_eq!(rows, right_rows);
    assert_eq!(columns, below_columns);

    let left_positions = mesh_positions(&mut raster, &mut device, left, &mut handle);
    let right_positions = mesh_positions(&mut raster, &mut device, right, &mut handle);
    let below_positions = mesh_positions(&mut raster, &mut device, below, &mut handle);

    let (columns, rows, right_columns) = (columns as usize, rows as usize, right_columns as usize);
    for row in 0..rows {
        assert_eq!(
            left_positions[row * columns + columns - 1],
            right_positions[row * right_columns],
            "row {row}"
        );
    }
    for column in 0..columns {
        assert_eq!(
            left_positions[(rows - 1) * columns + column],
            below_positions[column],
            "column {column}"
        );
    }
    raster.release(handle);
}

#[test]
fn mesh_indices_cover_the_vertex_grid() {
    let (mut raster, mut device) = engine();
    let tile = level0_tile(&raster, 2, 1);
    let (columns, rows) = raster.tile(tile).unwrap().vertex_grid_dimensions();
    let mut handle = CacheHandle::new();
    let mesh = raster.tile_mesh(&mut device, tile, &mut handle).unwrap();
    assert_eq!(mesh.index_count, ((columns - 1) * (rows - 1) * 6) as usize);
    assert_eq!(mesh.indices.indices.len(), mesh.index_count);
    let vertices = mesh.vertices.vertices.as_ref().unwrap();
    assert_eq!(vertices.len(), (columns * rows) as usize);
    assert_eq!(vertices.layout(), VertexLayout::Textured);
    raster.release(handle);
}

#[test]
fn normal_maps_get_tangent_space_meshes() {
    let config = EngineConfig {
        tile_texel_dimension: 64,
        ..EngineConfig::default()
    };
    let (mut raster, mut device) =
        engine_over(RasterExtent::global(256, 128), RasterKind::NormalMap, &config);
    let tile = raster.pyramid().levels()[0].tile_at(1, 1).unwrap();
    let mut handle = CacheHandle::new();
    let mesh = raster.tile_mesh(&mut device, tile, &mut handle).unwrap();
    assert_eq!(mesh.vertices.layout, VertexLayout::TangentSpace);
    assert_eq!(
        mesh.vertices.vertices.as_ref().map(|vertices| vertices.layout()),
        Some(VertexLayout::TangentSpace)
    );
    raster.release(handle);

    let outcome = raster.render(&mut device, &facing_globe(), 0.0);
    assert!(outcome.tiles_drawn);
    raster.release(outcome.cache_handle);
}

#[test]
fn data_rasters_render_with_float_textures() {
    init_tracing();
    let mut device = HeadlessDevice::default();
    let context = RenderContext::probe(&device);
    let field = FloatImage::from_fn(128, 64, |x, y| image::Luma([(x + y) as f32]));
    let config = EngineConfig {
        tile_texel_dimension: 64,
        ..EngineConfig::default()
    };
    let mut raster: Engine = MultiResolutionRaster::new(
        &context,
        RasterExtent::global(128, 64),
        ImageRasterSource::data(field),
        &config,
    )
    .unwrap();
    let outcome = raster.render(&mut device, &facing_globe(), 0.0);
    assert!(outcome.tiles_drawn);
    assert_eq!(outcome.stats.skipped, 0);
    raster.release(outcome.cache_handle);
}

#[test]
fn construction_checks_device_capabilities() {
    init_tracing();
    let device = HeadlessDevice::new(DeviceCapabilities {
        max_texture_dimension: 128,
        float_textures: false,
    });
    let context = RenderContext::probe(&device);

    let visual = ImageRasterSource::rgba(RasterKind::Visual, RgbaImage::new(64, 32));
    let too_large: BuildResult<Engine> = MultiResolutionRaster::new(
        &context,
        RasterExtent::global(64, 32),
        visual,
        &EngineConfig::default(),
    );
    assert!(matches!(
        too_large,
        Err(BuildError::TileTooLarge {
            tile_dimension: 256,
            max: 128
        })
    ));

    let config = EngineConfig {
        tile_texel_dimension: 64,
        ..EngineConfig::default()
    };
    let data = ImageRasterSource::data(FloatImage::new(64, 32));
    let unsupported: BuildResult<Engine> =
        MultiResolutionRaster::new(&context, RasterExtent::global(64, 32), data, &config);
    assert!(matches!(
        unsupported,
        Err(BuildError::UnsupportedKind(RasterKind::Data))
    ));
}

#[test]
fn rows_past_the_pole_use_the_clamped_texture_coordinate() {
    // The first row sits 0.03 degrees beyond the north pole.
    let georeferencing = Georeferencing::new(
        AffineTransform::new([-180.0, 1.0, 0.0, 90.03, 0.0, -1.0]),
        181,
    );
    let config = EngineConfig {
        tile_texel_dimension: 64,
        ..EngineConfig::default()
    };
    let (mut raster, mut device) = engine_over(
        RasterExtent::new(360, 181, georeferencing),
        RasterKind::Visual,
        &config,
    );
    let tile = raster.pyramid().levels()[0].tile_at(0, 0).unwrap();
    let mut handle = CacheHandle::new();
    let mesh = raster.tile_mesh(&mut device, tile, &mut handle).unwrap();
    let vertices = mesh.vertices.vertices.as_ref().unwrap();

    let [u, v] = vertices.tex_coord(0).unwrap();
    assert_eq!(u, 0.0);
    assert_relative_eq!(v, (0.03 / 64.0) as f32, epsilon = 1e-6);
    let position = vertices.position(0).unwrap();
    assert_relative_eq!(position[2], 1.0, epsilon = 1e-6);
    raster.release(handle);
}

#[test]
fn longitudes_past_a_full_turn_wrap() {
    let config = EngineConfig {
        tile_texel_dimension: 64,
        ..EngineConfig::default()
    };
    let shifted = Georeferencing::new(
        AffineTransform::new([540.0, 1.0, 0.0, 90.0, 0.0, -1.0]),
        180,
    );
    let (mut wrapped, mut wrapped_device) =
        engine_over(RasterExtent::new(360, 180, shifted), RasterKind::Visual, &config);
    let (mut plain, mut plain_device) =
        engine_over(RasterExtent::global(360, 180), RasterKind::Visual, &config);

    let mut wrapped_handle = CacheHandle::new();
    let mut plain_handle = CacheHandle::new();
    for (x, y) in [(0, 0), (3, 1), (5, 2)] {
        let a = wrapped.pyramid().levels()[0].tile_at(x, y).unwrap();
        let b = plain.pyramid().levels()[0].tile_at(x, y).unwrap();
        let a = mesh_positions(&mut wrapped, &mut wrapped_device, a, &mut wrapped_handle);
        let b = mesh_positions(&mut plain, &mut plain_device, b, &mut plain_handle);
        assert_eq!(a.len(), b.len());
        for (p, q) in a.iter().zip(&b) {
            for axis in 0..3 {
                assert_relative_eq!(p[axis], q[axis], epsilon = 1e-5);
            }
        }
    }
    wrapped.release(wrapped_handle);
    plain.release(plain_handle);
}
