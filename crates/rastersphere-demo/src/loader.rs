//! Reading engine configuration and rasters from disk.

use std::path::Path;

use anyhow::Context;
use rastersphere::{EngineConfig, ImageRasterSource, RasterKind};
use tracing::info;

/// Parse an engine configuration. Missing fields take their defaults.
pub fn parse_config(json: &str) -> anyhow::Result<EngineConfig> {
    serde_json::from_str(json).context("invalid engine configuration")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config = parse_config(&json)?;
    info!(path = %path.display(), "Loaded engine configuration");
    Ok(config)
}

/// Load an image as a raster of the given kind. Data rasters keep a single
/// luminance channel as floats.
pub fn load_source(path: &Path, kind: RasterKind) -> anyhow::Result<ImageRasterSource> {
    let image = image::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    info!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        ?kind,
        "Loaded raster"
    );
    Ok(match kind {
        RasterKind::Data => ImageRasterSource::data(image.to_luma32f()),
        RasterKind::Visual | RasterKind::NormalMap | RasterKind::DepthLayer => {
            ImageRasterSource::rgba(kind, image.to_rgba8())
        }
    })
}
