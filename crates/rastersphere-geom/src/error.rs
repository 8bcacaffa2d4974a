use thiserror::Error;

/// Failure to map a raster sample onto the globe.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoError {
    /// The coordinate transform could not handle this coordinate.
    #[error("coordinate transform failed at ({x}, {y}): {reason}")]
    Projection { x: f64, y: f64, reason: String },

    /// The affine transform or projection produced NaN or infinity.
    #[error("non-finite geographic coordinate (lon {longitude}, lat {latitude})")]
    NonFinite { longitude: f64, latitude: f64 },
}

pub type GeoResult<T> = Result<T, GeoError>;
