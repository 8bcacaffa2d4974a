//! Raster pixel coordinates to points on the unit sphere.
//!
//! Every vertex the engine generates goes through [`Georeferencing::map`].
//! The function is deliberately plain floating-point arithmetic (no fused
//! multiply-add, no lookup tables) so two tiles that share an edge compute
//! bit-identical positions for the shared pixel coordinates.

use std::fmt;
use std::sync::Arc;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::{GeoError, GeoResult};

/// Mean equatorial radius used by the Web Mercator projection (EPSG:3857).
const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Order in which scanlines are stored in the raster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanlineOrder {
    /// Row 0 is the northern-most (first georeferenced) row.
    #[default]
    TopToBottom,
    /// Row 0 is the last georeferenced row; pixel y is flipped before the
    /// affine transform is applied.
    BottomToTop,
}

/// Affine pixel-to-georeferenced transform in GDAL geotransform order.
///
/// ```text
/// gx = c[0] + x * c[1] + y * c[2]
/// gy = c[3] + x * c[4] + y * c[5]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    pub coefficients: [f64; 6],
}

impl AffineTransform {
    #[must_use]
    pub const fn new(coefficients: [f64; 6]) -> Self {
        Self { coefficients }
    }

    /// Plate carrée transform covering the whole globe, north-up, with the
    /// raster's top-left corner at (-180, 90).
    #[must_use]
    pub fn global(width: u32, height: u32) -> Self {
        Self::new([
            -180.0,
            360.0 / f64::from(width),
            0.0,
            90.0,
            0.0,
            -180.0 / f64::from(height),
        ])
    }

    #[must_use]
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let c = &self.coefficients;
        (c[0] + x * c[1] + y * c[2], c[3] + x * c[4] + y * c[5])
    }

    /// Solve the second row for `y`, keeping `x` fixed.
    ///
    /// Returns `None` when the row does not depend on `y`.
    #[must_use]
    pub fn solve_y(&self, x: f64, gy: f64) -> Option<f64> {
        let c = &self.coefficients;
        if c[5] == 0.0 {
            return None;
        }
        Some((gy - c[3] - x * c[4]) / c[5])
    }
}

/// Optional transform from the raster's georeferenced coordinate system to
/// geographic WGS84 degrees.
pub trait CoordinateTransform: fmt::Debug + Send + Sync {
    /// Returns `(longitude, latitude)` in degrees.
    fn to_geographic(&self, x: f64, y: f64) -> GeoResult<(f64, f64)>;

    /// Inverse of [`to_geographic`](Self::to_geographic).
    fn from_geographic(&self, longitude: f64, latitude: f64) -> GeoResult<(f64, f64)>;
}

/// Spherical Web Mercator (EPSG:3857) metres.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebMercator;

impl CoordinateTransform for WebMercator {
    fn to_geographic(&self, x: f64, y: f64) -> GeoResult<(f64, f64)> {
        if !x.is_finite() || !y.is_finite() {
            return Err(GeoError::Projection {
                x,
                y,
                reason: "non-finite projected coordinate".to_string(),
            });
        }
        let longitude = (x / WEB_MERCATOR_RADIUS).to_degrees();
        let latitude = (y / WEB_MERCATOR_RADIUS).sinh().atan().to_degrees();
        Ok((longitude, latitude))
    }

    fn from_geographic(&self, longitude: f64, latitude: f64) -> GeoResult<(f64, f64)> {
        if latitude.abs() >= 90.0 {
            return Err(GeoError::Projection {
                x: longitude,
                y: latitude,
                reason: "poles are at infinity in web mercator".to_string(),
            });
        }
        let x = longitude.to_radians() * WEB_MERCATOR_RADIUS;
        let y = latitude.to_radians().tan().asinh() * WEB_MERCATOR_RADIUS;
        Ok((x, y))
    }
}

/// Empirically tuned epsilons used while sampling raster geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoreferenceTolerances {
    /// Inset (in pixels) applied to samples that would otherwise land exactly
    /// on the raster's outer edge, so longitude wraparound at +/-180 resolves
    /// toward the raster interior.
    pub edge_inset: f64,
}

impl Default for GeoreferenceTolerances {
    fn default() -> Self {
        Self { edge_inset: 1e-8 }
    }
}

/// A geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

/// Result of mapping one pixel coordinate onto the globe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MappedPoint {
    /// Unit-length position on the sphere.
    pub position: DVec3,
    /// Geographic coordinate after latitude clamping and longitude wrapping.
    pub geographic: GeoPoint,
    /// Pixel-space y consistent with the clamped latitude. Equal to the input
    /// y unless the latitude had to be clamped.
    pub y: f64,
    /// Whether the latitude was clamped to a pole.
    pub clamped: bool,
}

/// Maps raster pixel coordinates (level-0 pixels, storage order) to the unit
/// sphere.
#[derive(Debug, Clone)]
pub struct Georeferencing {
    affine: AffineTransform,
    transform: Option<Arc<dyn CoordinateTransform>>,
    scanline_order: ScanlineOrder,
    height: f64,
}

impl Georeferencing {
    #[must_use]
    pub fn new(affine: AffineTransform, height: u32) -> Self {
        Self {
            affine,
            transform: None,
            scanline_order: ScanlineOrder::TopToBottom,
            height: f64::from(height),
        }
    }

    #[must_use]
    pub fn with_transform(mut self, transform: Arc<dyn CoordinateTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    #[must_use]
    pub fn with_scanline_order(mut self, scanline_order: ScanlineOrder) -> Self {
        self.scanline_order = scanline_order;
        self
    }

    #[must_use]
    pub fn affine(&self) -> &AffineTransform {
        &self.affine
    }

    #[must_use]
    pub fn scanline_order(&self) -> ScanlineOrder {
        self.scanline_order
    }

    fn to_affine_y(&self, y: f64) -> f64 {
        match self.scanline_order {
            ScanlineOrder::TopToBottom => y,
            ScanlineOrder::BottomToTop => self.height - y,
        }
    }

    /// Geographic coordinate of a pixel before any clamping or wrapping.
    pub fn geographic(&self, x: f64, y: f64) -> GeoResult<GeoPoint> {
        let (gx, gy) = self.affine.apply(x, self.to_affine_y(y));
        let (longitude, latitude) = match &self.transform {
            Some(transform) => transform.to_geographic(gx, gy)?,
            None => (gx, gy),
        };
        if !longitude.is_finite() || !latitude.is_finite() {
            return Err(GeoError::NonFinite {
                longitude,
                latitude,
            });
        }
        Ok(GeoPoint {
            longitude,
            latitude,
        })
    }

    /// Map a pixel onto the unit sphere.
    ///
    /// Latitude is clamped to `[-90, 90]` and the returned `y` is moved onto
    /// the clamped latitude so texture coordinates follow the clamp. Longitude
    /// is wrapped into `(-360, 360)`; out-of-range input never fails.
    pub fn map(&self, x: f64, y: f64) -> GeoResult<MappedPoint> {
        let raw = self.geographic(x, y)?;

        let latitude = raw.latitude.clamp(-90.0, 90.0);
        let clamped = latitude != raw.latitude;
        let y = if clamped {
            self.clamped_pixel_y(x, raw.longitude, latitude).unwrap_or(y)
        } else {
            y
        };

        let longitude = raw.longitude % 360.0;
        Ok(MappedPoint {
            position: sphere_position(longitude, latitude),
            geographic: GeoPoint {
                longitude,
                latitude,
            },
            y,
            clamped,
        })
    }

    /// Convenience for [`map`](Self::map) when only the position is needed.
    pub fn to_sphere_point(&self, x: f64, y: f64) -> GeoResult<DVec3> {
        self.map(x, y).map(|mapped| mapped.position)
    }

    fn clamped_pixel_y(&self, x: f64, longitude: f64, latitude: f64) -> Option<f64> {
        let gy = match &self.transform {
            Some(transform) => transform.from_geographic(longitude, latitude).ok()?.1,
            None => latitude,
        };
        let affine_y = self.affine.solve_y(x, gy)?;
        Some(match self.scanline_order {
            ScanlineOrder::TopToBottom => affine_y,
            ScanlineOrder::BottomToTop => self.height - affine_y,
        })
    }
}

/// Unit-sphere position for a geographic coordinate in degrees (z is north).
#[must_use]
pub fn sphere_position(longitude: f64, latitude: f64) -> DVec3 {
    let (sin_lat, cos_lat) = latitude.to_radians().sin_cos();
    let (sin_lon, cos_lon) = longitude.to_radians().sin_cos();
    DVec3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat)
}
