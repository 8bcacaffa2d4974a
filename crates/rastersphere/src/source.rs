//! Raster pixel supply.
//!
//! The engine never decodes raster files itself. It asks a [`RasterSource`]
//! for blocks of texels at a pyramid level whenever a tile texture is missing
//! or stale, and compares the source's [`SourceToken`] against the token a
//! texture was uploaded with to detect replaced data.

use image::imageops;
use image::{ImageBuffer, Luma, Rgba, RgbaImage};
use rastersphere_geom::VertexLayout;
use serde::{Deserialize, Serialize};

use crate::device::TextureFormat;
use crate::error::{SourceError, SourceResult};

/// Single-channel floating-point raster.
pub type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// What a raster's texels mean, which decides how tiles are meshed and stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RasterKind {
    /// Colour imagery.
    Visual,
    /// Scalar field values.
    Data,
    /// Tangent-space surface normals.
    NormalMap,
    /// Depth or height layer.
    DepthLayer,
}

impl RasterKind {
    #[must_use]
    pub const fn vertex_layout(self) -> VertexLayout {
        match self {
            Self::Visual | Self::Data => VertexLayout::Textured,
            Self::NormalMap | Self::DepthLayer => VertexLayout::TangentSpace,
        }
    }

    #[must_use]
    pub const fn texture_format(self) -> TextureFormat {
        match self {
            Self::Data => TextureFormat::R32Float,
            Self::Visual | Self::NormalMap | Self::DepthLayer => TextureFormat::Rgba8,
        }
    }
}

/// Changes whenever the data behind a source is replaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceToken(pub u64);

impl SourceToken {
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// Decoded texels for one tile.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelBlock {
    Rgba8(RgbaImage),
    Float32(FloatImage),
}

impl PixelBlock {
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Rgba8(image) => image.dimensions(),
            Self::Float32(image) => image.dimensions(),
        }
    }

    #[must_use]
    pub fn format(&self) -> TextureFormat {
        match self {
            Self::Rgba8(_) => TextureFormat::Rgba8,
            Self::Float32(_) => TextureFormat::R32Float,
        }
    }

    /// Copy out a sub-rectangle. The caller guarantees it lies within bounds.
    #[must_use]
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Self {
        match self {
            Self::Rgba8(image) => {
                Self::Rgba8(imageops::crop_imm(image, x, y, width, height).to_image())
            }
            Self::Float32(image) => {
                Self::Float32(imageops::crop_imm(image, x, y, width, height).to_image())
            }
        }
    }

    /// Next pyramid level: each texel averages the 2 x 2 block it covers,
    /// clipped at the right and bottom edges, so texel `i` still spans level-0
    /// pixels `[i * 2^L, (i + 1) * 2^L)`.
    fn halve(&self) -> Self {
        match self {
            Self::Rgba8(image) => {
                let (width, height) = image.dimensions();
                Self::Rgba8(RgbaImage::from_fn(width.div_ceil(2), height.div_ceil(2), |x, y| {
                    let mut sum = [0u32; 4];
                    let mut count = 0u32;
                    for (sx, sy) in covered_texels(x, y, width, height) {
                        for (total, channel) in sum.iter_mut().zip(image.get_pixel(sx, sy).0) {
                            *total += u32::from(channel);
                        }
                        count += 1;
                    }
                    #[allow(clippy::cast_possible_truncation)]
                    let average = sum.map(|total| ((total + count / 2) / count) as u8);
                    Rgba(average)
                }))
            }
            Self::Float32(image) => {
                let (width, height) = image.dimensions();
                Self::Float32(FloatImage::from_fn(width.div_ceil(2), height.div_ceil(2), |x, y| {
                    let mut sum = 0.0;
                    let mut count = 0u8;
                    for (sx, sy) in covered_texels(x, y, width, height) {
                        sum += image.get_pixel(sx, sy).0[0];
                        count += 1;
                    }
                    Luma([sum / f32::from(count)])
                }))
            }
        }
    }
}

/// Texels of the finer level under texel `(x, y)` of the next level.
fn covered_texels(x: u32, y: u32, width: u32, height: u32) -> impl Iterator<Item = (u32, u32)> {
    let columns = 2 * x..(2 * x + 2).min(width);
    (2 * y..(2 * y + 2).min(height)).flat_map(move |sy| columns.clone().map(move |sx| (sx, sy)))
}

/// Supplies texel blocks for any pyramid level.
pub trait RasterSource {
    fn kind(&self) -> RasterKind;

    /// Token identifying the current contents.
    fn token(&self) -> SourceToken;

    /// Texels `[x, x + width) x [y, y + height)` of `level`, where level `L`
    /// has `(dim + 1) / 2` applied `L` times to each level-0 dimension.
    fn load_block(&self, level: u32, x: u32, y: u32, width: u32, height: u32)
    -> SourceResult<PixelBlock>;
}

/// In-memory raster holding every pyramid level.
#[derive(Debug, Clone)]
pub struct ImageRasterSource {
    kind: RasterKind,
    levels: Vec<PixelBlock>,
    token: SourceToken,
}

impl ImageRasterSource {
    #[must_use]
    pub fn new(kind: RasterKind, image: PixelBlock) -> Self {
        Self {
            kind,
            levels: build_levels(image),
            token: SourceToken::default(),
        }
    }

    #[must_use]
    pub fn rgba(kind: RasterKind, image: RgbaImage) -> Self {
        Self::new(kind, PixelBlock::Rgba8(image))
    }

    #[must_use]
    pub fn data(image: FloatImage) -> Self {
        Self::new(RasterKind::Data, PixelBlock::Float32(image))
    }

    /// Swap in new level-0 texels and rebuild every level.
    pub fn replace(&mut self, image: PixelBlock) {
        self.levels = build_levels(image);
        self.token = self.token.next();
    }

    /// Level-0 dimensions.
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.levels.first().map_or((0, 0), PixelBlock::dimensions)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn num_levels(&self) -> u32 {
        self.levels.len() as u32
    }
}

impl RasterSource for ImageRasterSource {
    fn kind(&self) -> RasterKind {
        self.kind
    }

    fn token(&self) -> SourceToken {
        self.token
    }

    fn load_block(
        &self,
        level: u32,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> SourceResult<PixelBlock> {
        let image = self
            .levels
            .get(level as usize)
            .ok_or(SourceError::LevelOutOfRange {
                level,
                levels: self.num_levels(),
            })?;
        let (level_width, level_height) = image.dimensions();
        let fits = |start: u32, len: u32, limit: u32| {
            start.checked_add(len).is_some_and(|end| end <= limit)
        };
        if width == 0
            || height == 0
            || !fits(x, width, level_width)
            || !fits(y, height, level_height)
        {
            return Err(SourceError::BlockOutOfBounds {
                level,
                x,
                y,
                width,
                height,
                level_width,
                level_height,
            });
        }
        Ok(image.crop(x, y, width, height))
    }
}

/// Halve (rounding up) until a single texel remains.
fn build_levels(image: PixelBlock) -> Vec<PixelBlock> {
    let mut levels = vec![image];
    loop {
        let Some(last) = levels.last() else {
            break;
        };
        let (width, height) = last.dimensions();
        if width <= 1 && height <= 1 {
            break;
        }
        let next = last.halve();
        levels.push(next);
    }
    levels
}
