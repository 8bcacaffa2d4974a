use rastersphere_geom::{AffineTransform, Georeferencing, ScanlineOrder};

/// Size and georeferencing of a raster. Fixed for the engine's lifetime.
#[derive(Debug, Clone)]
pub struct RasterExtent {
    width: u32,
    height: u32,
    georeferencing: Georeferencing,
}

impl RasterExtent {
    /// # Panics
    ///
    /// Panics if either dimension is zero.
    #[must_use]
    pub fn new(width: u32, height: u32, georeferencing: Georeferencing) -> Self {
        assert!(width > 0 && height > 0, "raster must be at least 1x1, got {width}x{height}");
        Self {
            width,
            height,
            georeferencing,
        }
    }

    /// North-up plate carrée raster covering the whole globe.
    #[must_use]
    pub fn global(width: u32, height: u32) -> Self {
        Self::new(
            width,
            height,
            Georeferencing::new(AffineTransform::global(width, height), height),
        )
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn scanline_order(&self) -> ScanlineOrder {
        self.georeferencing.scanline_order()
    }

    #[must_use]
    pub fn georeferencing(&self) -> &Georeferencing {
        &self.georeferencing
    }
}
