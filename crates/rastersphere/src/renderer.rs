//! The runtime renderer.
//!
//! A frame moves through four phases, each its own type so a phase can only
//! run once its inputs exist:
//!
//! 1. [`LodSelected`]: a validated integer pyramid level
//! 2. [`Culled`]: the level's tiles whose boxes intersect the view frustum
//! 3. [`TilesGathered`]: tiles whose texture, vertices and indices are
//!    resident and pinned
//! 4. drawn, reported as a [`RenderOutcome`]
//!
//! Failures while gathering or drawing a tile skip that tile for the frame.

use std::collections::HashMap;

use rastersphere_geom::grid_indices;
use tracing::{debug, trace, warn};

use crate::cache::{CacheKey, CacheStats, ObjectCache};
use crate::config::EngineConfig;
use crate::device::{DrawCall, RenderContext, RenderDevice};
use crate::error::{BuildError, BuildResult, TileError, TileResult};
use crate::extent::RasterExtent;
use crate::lod;
use crate::obb_tree::LevelOfDetail;
use crate::pyramid::RasterPyramid;
use crate::source::{RasterKind, RasterSource, SourceToken};
use crate::tile::{Tile, TileId};
use crate::view::ViewState;

/// Resources pinned by one or more render calls.
///
/// Everything in the handle stays resident until the handle is passed to
/// [`MultiResolutionRaster::release`]. Dropping a handle without releasing
/// it leaves its resources pinned for the engine's lifetime.
#[derive(Debug, Default, PartialEq, Eq)]
#[must_use = "resources stay pinned until the handle is released"]
pub struct CacheHandle {
    textures: Vec<CacheKey>,
    vertex_buffers: Vec<CacheKey>,
}

impl CacheHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pins held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.textures.len() + self.vertex_buffers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take over every pin held by `other`.
    pub fn merge(&mut self, other: CacheHandle) {
        self.textures.extend(other.textures);
        self.vertex_buffers.extend(other.vertex_buffers);
    }
}

/// Per-frame counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub level: u32,
    pub nodes_visited: usize,
    pub candidates: usize,
    pub drawn: usize,
    pub skipped: usize,
    pub textures_uploaded: usize,
    pub meshes_generated: usize,
}

#[derive(Debug)]
#[must_use = "the cache handle must be released"]
pub struct RenderOutcome {
    pub tiles_drawn: bool,
    pub cache_handle: CacheHandle,
    pub stats: FrameStats,
}

/// Cache counters for both object caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineCacheStats {
    pub textures: CacheStats,
    pub vertex_buffers: CacheStats,
    /// Shared index buffers, one per distinct vertex-grid size.
    pub index_buffers: usize,
}

/// A tile's mesh, resident on the device.
pub struct TileMesh<'a, D: RenderDevice> {
    pub vertices: &'a D::VertexBuffer,
    pub indices: &'a D::IndexBuffer,
    pub index_count: usize,
}

struct CachedTexture<T> {
    texture: T,
    /// Source contents currently uploaded, if any.
    token: Option<SourceToken>,
}

struct SharedIndices<B> {
    buffer: B,
    count: usize,
}

struct LodSelected {
    level: u32,
}

struct Culled {
    level: u32,
    nodes_visited: usize,
    candidates: Vec<TileId>,
}

struct ReadyTile {
    tile: TileId,
    texture: CacheKey,
    vertices: CacheKey,
    grid: (u32, u32),
}

struct TilesGathered {
    stats: FrameStats,
    ready: Vec<ReadyTile>,
    handle: CacheHandle,
}

/// A georeferenced raster rendered as a tiled multi-resolution pyramid.
pub struct MultiResolutionRaster<S, D: RenderDevice> {
    pyramid: RasterPyramid,
    source: S,
    kind: RasterKind,
    vertex_capacity: usize,
    textures: ObjectCache<CachedTexture<D::Texture>>,
    vertex_buffers: ObjectCache<D::VertexBuffer>,
    index_buffers: HashMap<(u32, u32), SharedIndices<D::IndexBuffer>>,
    texture_keys: Vec<Option<CacheKey>>,
    vertex_keys: Vec<Option<CacheKey>>,
}

impl<S: RasterSource, D: RenderDevice> MultiResolutionRaster<S, D> {
    /// Build the pyramid and every level's bounding tree.
    ///
    /// # Panics
    ///
    /// Panics if the tile dimension is zero or not a power of two.
    pub fn new(
        context: &RenderContext,
        extent: RasterExtent,
        source: S,
        config: &EngineConfig,
    ) -> BuildResult<Self> {
        let kind = source.kind();
        let max = context.capabilities().max_texture_dimension;
        if config.tile_texel_dimension > max {
            return Err(BuildError::TileTooLarge {
                tile_dimension: config.tile_texel_dimension,
                max,
            });
        }
        if !context.supports(kind.texture_format()) {
            return Err(BuildError::UnsupportedKind(kind));
        }

        let pyramid = RasterPyramid::build(extent, config)?;
        let tile_count = pyramid.tiles().len();
        Ok(Self {
            vertex_capacity: pyramid.max_vertex_count(),
            pyramid,
            source,
            kind,
            textures: ObjectCache::new(config.cache.max_textures),
            vertex_buffers: ObjectCache::new(config.cache.max_vertex_buffers),
            index_buffers: HashMap::new(),
            texture_keys: vec![None; tile_count],
            vertex_keys: vec![None; tile_count],
        })
    }

    #[must_use]
    pub fn pyramid(&self) -> &RasterPyramid {
        &self.pyramid
    }

    #[must_use]
    pub fn kind(&self) -> RasterKind {
        self.kind
    }

    #[must_use]
    pub fn num_levels_of_detail(&self) -> u32 {
        self.pyramid.num_levels()
    }

    #[must_use]
    pub fn tile(&self, id: TileId) -> Option<&Tile> {
        self.pyramid.tile(id)
    }

    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Mutable access to the source. Replacing its data changes its token,
    /// and stale textures are re-uploaded the next time they are acquired.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Unclamped level of detail at which one level texel matches the
    /// smallest projected screen pixel, offset by `bias`.
    #[must_use]
    pub fn get_level_of_detail(&self, view: &ViewState, bias: f32) -> f32 {
        lod::level_of_detail(
            view.min_pixel_size_on_sphere(),
            self.pyramid.level0_max_texel_size(),
            bias,
        )
    }

    #[must_use]
    pub fn clamp_level_of_detail(&self, level_of_detail: f32) -> f32 {
        lod::clamp_level_of_detail(level_of_detail, self.num_levels_of_detail())
    }

    /// Tiles of `level` that intersect the view frustum, without drawing.
    ///
    /// # Panics
    ///
    /// Panics if `level` is not a pyramid level.
    #[must_use]
    pub fn visible_tiles(&self, view: &ViewState, level: u32) -> Vec<TileId> {
        let mut visible = Vec::new();
        self.level(level).cull(&view.frustum(), &mut visible);
        visible
    }

    fn level(&self, level: u32) -> &LevelOfDetail {
        let num_levels = self.num_levels_of_detail();
        match self.pyramid.level(level) {
            Some(found) => found,
            None => panic!("level {level} outside [0, {num_levels})"),
        }
    }

    /// Draw the tiles of the level selected by `level_of_detail` that are in
    /// view.
    ///
    /// # Panics
    ///
    /// Panics if `level_of_detail` is outside `[0, num_levels_of_detail())`.
    /// Clamp it with [`clamp_level_of_detail`](Self::clamp_level_of_detail)
    /// first.
    pub fn render(
        &mut self,
        device: &mut D,
        view: &ViewState,
        level_of_detail: f32,
    ) -> RenderOutcome {
        let selected = self.select_level(level_of_detail);
        let culled = self.cull(selected, view);
        let gathered = self.gather(device, culled);
        self.draw(device, gathered)
    }

    fn select_level(&self, level_of_detail: f32) -> LodSelected {
        let level = lod::level_index(level_of_detail, self.num_levels_of_detail());
        trace!(level_of_detail, level, "Selected level");
        LodSelected { level }
    }

    fn cull(&self, selected: LodSelected, view: &ViewState) -> Culled {
        let mut candidates = Vec::new();
        let nodes_visited = self
            .level(selected.level)
            .cull(&view.frustum(), &mut candidates);
        trace!(
            level = selected.level,
            nodes_visited,
            candidates = candidates.len(),
            "Culled"
        );
        Culled {
            level: selected.level,
            nodes_visited,
            candidates,
        }
    }

    fn gather(&mut self, device: &mut D, culled: Culled) -> TilesGathered {
        let mut stats = FrameStats {
            level: culled.level,
            nodes_visited: culled.nodes_visited,
            candidates: culled.candidates.len(),
            ..FrameStats::default()
        };
        let mut handle = CacheHandle::new();
        let mut ready = Vec::with_capacity(culled.candidates.len());
        for tile in culled.candidates {
            match self.prepare_tile(device, tile, &mut handle, &mut stats) {
                Ok(prepared) => ready.push(prepared),
                Err(error) => {
                    warn!(%tile, %error, "Skipping tile this frame");
                    stats.skipped += 1;
                }
            }
        }
        TilesGathered {
            stats,
            ready,
            handle,
        }
    }

    fn prepare_tile(
        &mut self,
        device: &mut D,
        tile: TileId,
        handle: &mut CacheHandle,
        stats: &mut FrameStats,
    ) -> TileResult<ReadyTile> {
        let (texture, uploaded) = self.acquire_texture(device, tile, handle)?;
        stats.textures_uploaded += usize::from(uploaded);
        let (vertices, generated) = self.acquire_vertices(device, tile, handle)?;
        stats.meshes_generated += usize::from(generated);
        let grid = self
            .pyramid
            .tile(tile)
            .ok_or(TileError::UnknownTile(tile))?
            .vertex_grid_dimensions();
        self.ensure_index_buffer(device, grid)?;
        Ok(ReadyTile {
            tile,
            texture,
            vertices,
            grid,
        })
    }

    fn draw(&mut self, device: &mut D, gathered: TilesGathered) -> RenderOutcome {
        let TilesGathered {
            mut stats,
            ready,
            handle,
        } = gathered;
        for prepared in &ready {
            let call = match (
                self.textures.get(prepared.texture),
                self.vertex_buffers.get(prepared.vertices),
                self.index_buffers.get(&prepared.grid),
            ) {
                (Some(texture), Some(vertices), Some(indices)) => DrawCall {
                    tile: prepared.tile,
                    texture: &texture.texture,
                    vertices,
                    indices: &indices.buffer,
                    index_count: indices.count,
                },
                _ => {
                    warn!(tile = %prepared.tile, "Tile resources vanished before drawing");
                    stats.skipped += 1;
                    continue;
                }
            };
            match device.draw(&call) {
                Ok(()) => stats.drawn += 1,
                Err(error) => {
                    warn!(tile = %prepared.tile, %error, "Draw failed");
                    stats.skipped += 1;
                }
            }
        }
        debug!(
            level = stats.level,
            candidates = stats.candidates,
            drawn = stats.drawn,
            skipped = stats.skipped,
            uploads = stats.textures_uploaded,
            meshes = stats.meshes_generated,
            "Rendered frame"
        );
        RenderOutcome {
            tiles_drawn: stats.drawn > 0,
            cache_handle: handle,
            stats,
        }
    }

    /// Pin the tile's texture, uploading texels if the cached copy is
    /// missing or was made from different source data. Returns whether an
    /// upload happened.
    fn acquire_texture(
        &mut self,
        device: &mut D,
        id: TileId,
        handle: &mut CacheHandle,
    ) -> TileResult<(CacheKey, bool)> {
        let tile = self.pyramid.tile(id).ok_or(TileError::UnknownTile(id))?;
        let dimension = self.pyramid.tile_texel_dimension();
        let format = self.kind.texture_format();
        let token = self.source.token();

        let acquired = self.textures.acquire(self.texture_keys[id.index()], || {
            device
                .create_texture(dimension, format)
                .map(|texture| CachedTexture {
                    texture,
                    token: None,
                })
        })?;
        let key = acquired.key;

        let uploaded_token = self.textures.get(key).and_then(|cached| cached.token);
        let fresh = !acquired.acquisition.needs_refresh() && uploaded_token == Some(token);
        if !fresh {
            if uploaded_token.is_some() && !acquired.acquisition.needs_refresh() {
                debug!(tile = %id, "Refreshing stale texture");
                self.textures.record_stale_refresh();
            }
            let upload = tile.load_block(&self.source).map_err(TileError::from).and_then(|block| {
                let cached = self.textures.get_mut(key).ok_or(TileError::UnknownTile(id))?;
                cached.token = None;
                device.upload_texture(&mut cached.texture, &block)?;
                cached.token = Some(token);
                Ok(())
            });
            if let Err(error) = upload {
                if acquired.acquisition.needs_refresh() {
                    self.textures.invalidate(key);
                    self.texture_keys[id.index()] = None;
                } else {
                    // Other handles may still pin this texture. Keep the slot
                    // and force an upload on the next acquisition.
                    if let Some(cached) = self.textures.get_mut(key) {
                        cached.token = None;
                    }
                    self.textures.release(key);
                }
                return Err(error);
            }
            debug!(tile = %id, acquisition = ?acquired.acquisition, "Uploaded texture");
        }

        self.texture_keys[id.index()] = Some(key);
        handle.textures.push(key);
        Ok((key, !fresh))
    }

    /// Pin the tile's vertex buffer, generating the mesh if it is not
    /// resident. Returns whether a mesh was generated.
    fn acquire_vertices(
        &mut self,
        device: &mut D,
        id: TileId,
        handle: &mut CacheHandle,
    ) -> TileResult<(CacheKey, bool)> {
        let tile = self.pyramid.tile(id).ok_or(TileError::UnknownTile(id))?;
        let layout = self.kind.vertex_layout();
        let capacity = self.vertex_capacity;

        let acquired = self.vertex_buffers.acquire(self.vertex_keys[id.index()], || {
            device.create_vertex_buffer(layout, capacity)
        })?;
        let key = acquired.key;

        let generated = acquired.acquisition.needs_refresh();
        if generated {
            let georef = self.pyramid.georeferencing();
            let write = tile
                .generate_vertices(georef, layout)
                .map_err(TileError::from)
                .and_then(|vertices| {
                    let buffer = self
                        .vertex_buffers
                        .get_mut(key)
                        .ok_or(TileError::UnknownTile(id))?;
                    device.write_vertices(buffer, &vertices)?;
                    Ok(())
                });
            if let Err(error) = write {
                self.vertex_buffers.invalidate(key);
                self.vertex_keys[id.index()] = None;
                return Err(error);
            }
            debug!(tile = %id, acquisition = ?acquired.acquisition, "Generated mesh");
        }

        self.vertex_keys[id.index()] = Some(key);
        handle.vertex_buffers.push(key);
        Ok((key, generated))
    }

    fn ensure_index_buffer(&mut self, device: &mut D, grid: (u32, u32)) -> TileResult<()> {
        if self.index_buffers.contains_key(&grid) {
            return Ok(());
        }
        let indices = grid_indices(grid.0, grid.1);
        let buffer = device.create_index_buffer(&indices)?;
        debug!(columns = grid.0, rows = grid.1, count = indices.len(), "Built shared index buffer");
        self.index_buffers.insert(
            grid,
            SharedIndices {
                buffer,
                count: indices.len(),
            },
        );
        Ok(())
    }

    /// Pin and return a tile's texture, uploading it if needed.
    pub fn tile_texture(
        &mut self,
        device: &mut D,
        tile: TileId,
        handle: &mut CacheHandle,
    ) -> TileResult<&D::Texture> {
        let (key, _) = self.acquire_texture(device, tile, handle)?;
        self.textures
            .get(key)
            .map(|cached| &cached.texture)
            .ok_or(TileError::UnknownTile(tile))
    }

    /// Pin and return a tile's mesh, generating it if needed.
    pub fn tile_mesh(
        &mut self,
        device: &mut D,
        tile: TileId,
        handle: &mut CacheHandle,
    ) -> TileResult<TileMesh<'_, D>> {
        let (key, _) = self.acquire_vertices(device, tile, handle)?;
        let grid = self
            .pyramid
            .tile(tile)
            .ok_or(TileError::UnknownTile(tile))?
            .vertex_grid_dimensions();
        self.ensure_index_buffer(device, grid)?;
        match (self.vertex_buffers.get(key), self.index_buffers.get(&grid)) {
            (Some(vertices), Some(indices)) => Ok(TileMesh {
                vertices,
                indices: &indices.buffer,
                index_count: indices.count,
            }),
            _ => Err(TileError::UnknownTile(tile)),
        }
    }

    /// Unpin everything `handle` holds.
    pub fn release(&mut self, handle: CacheHandle) {
        for key in handle.textures {
            self.textures.release(key);
        }
        for key in handle.vertex_buffers {
            self.vertex_buffers.release(key);
        }
    }

    /// Destroy idle objects beyond the configured cache capacities. Returns
    /// the number destroyed.
    pub fn shrink_caches(&mut self) -> usize {
        let textures = self.textures.shrink_to_capacity().len();
        let vertex_buffers = self.vertex_buffers.shrink_to_capacity().len();
        if textures + vertex_buffers > 0 {
            debug!(textures, vertex_buffers, "Shrunk caches");
        }
        textures + vertex_buffers
    }

    #[must_use]
    pub fn cache_stats(&self) -> EngineCacheStats {
        EngineCacheStats {
            textures: self.textures.stats(),
            vertex_buffers: self.vertex_buffers.stats(),
            index_buffers: self.index_buffers.len(),
        }
    }
}
