//! Fixed-point mesh density.

use crate::MAX_VERTICES_PER_AXIS;

const FRACTIONAL_BITS: u32 = 16;
const ONE: u32 = 1 << FRACTIONAL_BITS;

/// Number of texels spanned by one mesh segment, as unsigned 16.16 fixed point.
///
/// Vertex counts derived from this are pure integer arithmetic, so two tiles
/// with the same texel extent always get the same vertex count along that
/// extent regardless of where they sit in the raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TexelsPerVertex(u32);

impl TexelsPerVertex {
    /// Smallest representable density (1/65536 texels per vertex).
    pub const MIN: Self = Self(1);

    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(if raw == 0 { 1 } else { raw })
    }

    /// Round a floating-point ratio to the nearest representable value.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn from_f64(texels_per_vertex: f64) -> Self {
        let raw = (texels_per_vertex * f64::from(ONE)).round();
        if raw.is_nan() || raw < 1.0 {
            Self::MIN
        } else if raw >= u32::MAX as f64 {
            Self(u32::MAX)
        } else {
            Self(raw as u32)
        }
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn to_f64(self) -> f64 {
        f64::from(self.0) / f64::from(ONE)
    }

    /// Density at a coarser pyramid level, where each texel covers `2^level`
    /// level-0 texels along each axis.
    #[must_use]
    pub fn at_level(self, level: u32) -> Self {
        Self::from_raw(self.0.checked_shr(level).unwrap_or(0))
    }

    /// Number of vertices needed to cover `texels` texels, including both end
    /// vertices, clamped to `[2, max_vertices]`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn vertices_for_texels(self, texels: u32, max_vertices: u32) -> u32 {
        let max_vertices = max_vertices.clamp(2, MAX_VERTICES_PER_AXIS);
        let segments = (u64::from(texels) << FRACTIONAL_BITS).div_ceil(u64::from(self.0));
        (segments + 1).clamp(2, u64::from(max_vertices)) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_texel_per_vertex() {
        let density = TexelsPerVertex::from_f64(1.0);
        assert_eq!(density.raw(), ONE);
        assert_eq!(density.vertices_for_texels(100, 256), 101);
        assert_eq!(density.vertices_for_texels(256, 256), 256);
    }

    #[test]
    fn coarse_density_rounds_segments_up() {
        let density = TexelsPerVertex::from_f64(16.0);
        assert_eq!(density.vertices_for_texels(256, 256), 17);
        assert_eq!(density.vertices_for_texels(17, 256), 3);
        assert_eq!(density.vertices_for_texels(1, 256), 2);
    }

    #[test]
    fn coarser_levels_get_denser_meshes() {
        let density = TexelsPerVertex::from_f64(16.0);
        assert_eq!(density.at_level(1).to_f64(), 8.0);
        assert_eq!(density.at_level(4).to_f64(), 1.0);
        assert_eq!(density.at_level(40), TexelsPerVertex::MIN);
    }

    #[test]
    fn degenerate_ratios_are_clamped() {
        assert_eq!(TexelsPerVertex::from_f64(0.0), TexelsPerVertex::MIN);
        assert_eq!(TexelsPerVertex::from_f64(f64::NAN), TexelsPerVertex::MIN);
        assert_eq!(TexelsPerVertex::from_raw(0), TexelsPerVertex::MIN);
        assert_eq!(TexelsPerVertex::MIN.vertices_for_texels(u32::MAX, 1000), 256);
    }
}
