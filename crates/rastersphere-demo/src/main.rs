//! Headless driver for the raster engine.
//!
//! Flies a descending orbit around the globe, renders every frame into the
//! recording device and logs per-frame statistics. Halfway through the run
//! the raster's contents are replaced so cached textures go stale and are
//! refreshed.

mod camera;
mod loader;
mod synthetic;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use rastersphere::{
    CacheHandle, HeadlessDevice, MultiResolutionRaster, RasterExtent, RasterKind, RasterSource,
    RenderContext, Viewport,
};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::camera::OrbitCamera;

#[derive(Parser, Debug)]
#[command(name = "rastersphere-demo", version)]
#[command(about = "Fly a camera around a raster draped on the globe and report what gets drawn")]
struct Cli {
    /// Image to drape over the whole globe. A synthetic checkerboard is used
    /// when omitted.
    #[arg(long)]
    image: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = KindArg::Visual)]
    kind: KindArg,

    /// Synthetic raster width in texels.
    #[arg(long, default_value_t = 4096)]
    width: u32,

    /// Synthetic raster height in texels.
    #[arg(long, default_value_t = 2048)]
    height: u32,

    /// Engine configuration as JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured tile size in texels.
    #[arg(long)]
    tile_dimension: Option<u32>,

    #[arg(long, default_value_t = 240)]
    frames: u32,

    #[arg(long, default_value_t = 60.0)]
    fps: f64,

    #[arg(long, default_value_t = 1280)]
    viewport_width: u32,

    #[arg(long, default_value_t = 720)]
    viewport_height: u32,

    /// Added to the computed level of detail; positive values pick coarser
    /// levels.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    lod_bias: f32,

    /// Log filter used when `RUST_LOG` is unset, e.g. `debug` or
    /// `rastersphere=trace`.
    #[arg(long, default_value = "info")]
    log: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Visual,
    Data,
    NormalMap,
    DepthLayer,
}

impl From<KindArg> for RasterKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Visual => Self::Visual,
            KindArg::Data => Self::Data,
            KindArg::NormalMap => Self::NormalMap,
            KindArg::DepthLayer => Self::DepthLayer,
        }
    }
}

#[derive(Debug, Default)]
struct RunTotals {
    drawn: usize,
    skipped: usize,
    uploads: usize,
    meshes: usize,
    destroyed: usize,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log)))
        .init();

    let kind = RasterKind::from(cli.kind);

    let mut config = loader::load_config(cli.config.as_deref())?;
    if let Some(tile_dimension) = cli.tile_dimension {
        config.tile_texel_dimension = tile_dimension;
    }
    anyhow::ensure!(
        config.tile_texel_dimension.is_power_of_two(),
        "tile dimension {} is not a power of two",
        config.tile_texel_dimension
    );

    let source = match &cli.image {
        Some(path) => loader::load_source(path, kind)?,
        None => synthetic::source(kind, cli.width, cli.height),
    };
    let (width, height) = source.dimensions();
    anyhow::ensure!(width > 0 && height > 0, "raster is empty");

    let mut device = HeadlessDevice::default();
    let context = RenderContext::probe(&device);
    let mut raster: MultiResolutionRaster<_, HeadlessDevice> =
        MultiResolutionRaster::new(&context, RasterExtent::global(width, height), source, &config)
            .context("failed to build raster pyramid")?;
    info!(
        width,
        height,
        ?kind,
        levels = raster.num_levels_of_detail(),
        tiles = raster.pyramid().tiles().len(),
        "Raster ready"
    );

    let mut camera = OrbitCamera::new(Viewport {
        width: cli.viewport_width,
        height: cli.viewport_height,
    });
    let dt = 1.0 / cli.fps.max(1.0);
    let mut previous: Option<CacheHandle> = None;
    let mut totals = RunTotals::default();

    for frame in 0..cli.frames {
        if frame == cli.frames / 2 && frame > 0 {
            raster
                .source_mut()
                .replace(synthetic::block(kind, width, height, 160));
            info!(frame, token = raster.source().token().0, "Replaced raster contents");
        }

        let view = camera.view();
        let lod = raster.clamp_level_of_detail(raster.get_level_of_detail(&view, cli.lod_bias));
        let outcome = raster.render(&mut device, &view, lod);
        debug!(
            frame,
            altitude = camera.altitude,
            lod,
            level = outcome.stats.level,
            visited = outcome.stats.nodes_visited,
            drawn = outcome.stats.drawn,
            skipped = outcome.stats.skipped,
            "Frame"
        );
        totals.drawn += outcome.stats.drawn;
        totals.skipped += outcome.stats.skipped;
        totals.uploads += outcome.stats.textures_uploaded;
        totals.meshes += outcome.stats.meshes_generated;

        // Keep the last frame pinned while the next one renders.
        if let Some(handle) = previous.replace(outcome.cache_handle) {
            raster.release(handle);
        }
        totals.destroyed += raster.shrink_caches();
        device.take_draws();
        camera.advance(dt);
    }
    if let Some(handle) = previous.take() {
        raster.release(handle);
    }

    let stats = raster.cache_stats();
    info!(
        frames = cli.frames,
        drawn = totals.drawn,
        skipped = totals.skipped,
        uploads = totals.uploads,
        meshes = totals.meshes,
        destroyed = totals.destroyed,
        "Run complete"
    );
    info!(
        hits = stats.textures.hits,
        recycles = stats.textures.recycles,
        allocations = stats.textures.allocations,
        stale_refreshes = stats.textures.stale_refreshes,
        live = stats.textures.live,
        "Texture cache"
    );
    info!(
        hits = stats.vertex_buffers.hits,
        recycles = stats.vertex_buffers.recycles,
        allocations = stats.vertex_buffers.allocations,
        live = stats.vertex_buffers.live,
        index_buffers = stats.index_buffers,
        "Vertex cache"
    );
    Ok(())
}
