//! Procedural rasters for runs without an input image.

use image::{Luma, Rgba, RgbaImage};
use rastersphere::{FloatImage, ImageRasterSource, PixelBlock, RasterKind};

/// Squares per 360 degrees of longitude.
const SQUARES_AROUND: u32 = 24;

/// A graticule-aligned checkerboard. `phase` shifts the palette so a replaced
/// raster is visibly different.
#[must_use]
pub fn checkerboard(width: u32, height: u32, phase: u8) -> RgbaImage {
    let square = (width / SQUARES_AROUND).max(1);
    RgbaImage::from_fn(width, height, |x, y| {
        let light = (x / square + y / square) % 2 == 0;
        #[allow(clippy::cast_possible_truncation)]
        let band = (y * 255 / height.max(1)) as u8;
        if light {
            Rgba([255, band, phase, 255])
        } else {
            Rgba([phase, 64, 255 - band, 255])
        }
    })
}

/// Scalar field of latitude in degrees, row-major from the north.
#[must_use]
pub fn latitude_field(width: u32, height: u32, offset: f32) -> FloatImage {
    #[allow(clippy::cast_precision_loss)]
    let scale = 180.0 / height.max(1) as f32;
    FloatImage::from_fn(width, height, |_, y| {
        #[allow(clippy::cast_precision_loss)]
        let row = y as f32;
        Luma([90.0 - (row + 0.5) * scale + offset])
    })
}

/// Level-0 texels for a raster of `kind`.
#[must_use]
pub fn block(kind: RasterKind, width: u32, height: u32, phase: u8) -> PixelBlock {
    match kind {
        RasterKind::Data => PixelBlock::Float32(latitude_field(width, height, f32::from(phase))),
        RasterKind::Visual | RasterKind::NormalMap | RasterKind::DepthLayer => {
            PixelBlock::Rgba8(checkerboard(width, height, phase))
        }
    }
}

#[must_use]
pub fn source(kind: RasterKind, width: u32, height: u32) -> ImageRasterSource {
    ImageRasterSource::new(kind, block(kind, width, height, 0))
}
