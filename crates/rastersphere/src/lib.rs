//! Multi-resolution tiled rendering of georeferenced rasters on the unit sphere.
//!
//! A raster of any size is split into a pyramid of fixed-size tiles. Each
//! pyramid level halves the resolution of the one below it, and each level's
//! tiles are bound by a tree of oriented boxes for frustum culling. Per frame
//! the renderer picks a level from the camera, culls that level's tree, and
//! draws the visible tiles with textures and meshes drawn from bounded LRU
//! caches.
//!
//! # Design principles
//!
//! - **Device agnostic**: graphics calls go through [`RenderDevice`];
//!   [`HeadlessDevice`] records instead of drawing
//! - **Fault isolated**: a tile that fails to load, upload or draw is skipped
//!   for that frame and logged, the rest of the frame proceeds
//! - **Explicit pinning**: resources used by a frame stay resident until its
//!   [`CacheHandle`] is released
//! - **Synchronous**: one thread owns the engine and its device
//!
//! # Example
//!
//! ```
//! use glam::DVec3;
//! use image::RgbaImage;
//! use rastersphere::{
//!     EngineConfig, HeadlessDevice, ImageRasterSource, MultiResolutionRaster, Projection,
//!     RasterExtent, RasterKind, RenderContext, ViewState, Viewport,
//! };
//!
//! let mut device = HeadlessDevice::default();
//! let context = RenderContext::probe(&device);
//! let source = ImageRasterSource::rgba(RasterKind::Visual, RgbaImage::new(512, 256));
//! let config = EngineConfig { tile_texel_dimension: 64, ..EngineConfig::default() };
//! let mut raster: MultiResolutionRaster<_, HeadlessDevice> =
//!     MultiResolutionRaster::new(&context, RasterExtent::global(512, 256), source, &config)
//!         .unwrap();
//!
//! let view = ViewState::look_at(
//!     DVec3::new(3.0, 0.0, 0.0),
//!     DVec3::ZERO,
//!     DVec3::Z,
//!     Projection::Perspective { fov_y: 0.8, near: 0.01, far: 10.0 },
//!     Viewport { width: 800, height: 600 },
//! );
//! let lod = raster.clamp_level_of_detail(raster.get_level_of_detail(&view, 0.0));
//! let outcome = raster.render(&mut device, &view, lod);
//! assert!(outcome.tiles_drawn);
//! raster.release(outcome.cache_handle);
//! ```

mod error;

pub mod cache;
pub mod config;
pub mod device;
pub mod extent;
pub mod headless;
pub mod lod;
pub mod obb_tree;
pub mod pyramid;
pub mod renderer;
pub mod source;
pub mod tile;
pub mod view;

pub use cache::{Acquisition, CacheKey, CacheStats, ObjectCache};
pub use config::{CacheConfig, EngineConfig};
pub use device::{DeviceCapabilities, DrawCall, RenderContext, RenderDevice, TextureFormat};
pub use error::{
    BuildError, BuildResult, DeviceError, DeviceResult, SourceError, SourceResult, TileError,
    TileResult,
};
pub use extent::RasterExtent;
pub use headless::{DeviceCounters, DrawRecord, HeadlessDevice};
pub use obb_tree::{LevelOfDetail, NodeKind, ObbTreeNode};
pub use pyramid::RasterPyramid;
pub use renderer::{
    CacheHandle, EngineCacheStats, FrameStats, MultiResolutionRaster, RenderOutcome, TileMesh,
};
pub use source::{FloatImage, ImageRasterSource, PixelBlock, RasterKind, RasterSource, SourceToken};
pub use tile::{Tile, TileId};
pub use view::{Projection, ViewState, Viewport};

pub use rastersphere_geom as geom;
