use rastersphere_geom::GeoError;
use thiserror::Error;

use crate::source::RasterKind;
use crate::tile::TileId;

/// Failure to supply a block of raster texels.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("level {level} out of range ({levels} levels available)")]
    LevelOutOfRange { level: u32, levels: u32 },

    #[error(
        "block {width}x{height} at ({x}, {y}) is outside level {level} ({level_width}x{level_height})"
    )]
    BlockOutOfBounds {
        level: u32,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        level_width: u32,
        level_height: u32,
    },

    #[error("raster source failed: {0}")]
    Upstream(String),
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Failure reported by the graphics device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("texture upload failed: {0}")]
    Upload(String),

    #[error("failed to map buffer: {0}")]
    BufferMap(String),

    #[error("out of device memory")]
    OutOfMemory,

    #[error("draw failed: {0}")]
    Draw(String),
}

pub type DeviceResult<T> = Result<T, DeviceError>;

/// Failure while constructing the engine. Construction aborts on any of these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("tile dimension {tile_dimension} exceeds the device texture limit of {max}")]
    TileTooLarge { tile_dimension: u32, max: u32 },

    #[error("{0:?} rasters need a texture format the device does not support")]
    UnsupportedKind(RasterKind),

    #[error("tile ({x}, {y}) at level {level} has no georeferenced samples")]
    NoValidSamples { level: u32, x: u32, y: u32 },

    #[error("no level-0 tile yielded a texel size estimate")]
    NoTexelSizeSamples,
}

pub type BuildResult<T> = Result<T, BuildError>;

/// Failure to prepare or draw one tile. Never aborts a frame.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TileError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("mesh generation failed: {0}")]
    Geo(#[from] GeoError),

    #[error("no tile with id {0}")]
    UnknownTile(TileId),
}

pub type TileResult<T> = Result<T, TileError>;
