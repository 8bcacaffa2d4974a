//! Level-of-detail selection.
//!
//! Level `L` of the pyramid has texels `2^L` times the size of level 0, so
//! the level whose texels match a projected screen pixel of size `p` is
//! `log2(p / t0)`, where `t0` is the largest level-0 texel on the sphere.
//! Larger pixels (a more distant camera) select coarser levels.

/// Continuous level of detail for a projected pixel size.
///
/// Not clamped; pass the result through [`clamp_level_of_detail`] before
/// rendering.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn level_of_detail(pixel_size: f64, level0_texel_size: f64, bias: f32) -> f32 {
    (f64::from(bias) + pixel_size.log2() - level0_texel_size.log2()) as f32
}

/// Clamp into `[0, num_levels - 1]`. NaN clamps to the finest level.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn clamp_level_of_detail(level_of_detail: f32, num_levels: u32) -> f32 {
    let coarsest = num_levels.saturating_sub(1) as f32;
    if level_of_detail.is_nan() {
        return 0.0;
    }
    level_of_detail.clamp(0.0, coarsest)
}

/// Integer pyramid level for a clamped level of detail, rounding toward the
/// finer level.
///
/// # Panics
///
/// Panics if `level_of_detail` is outside `[0, num_levels)`.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn level_index(level_of_detail: f32, num_levels: u32) -> u32 {
    assert!(
        level_of_detail >= 0.0 && level_of_detail < num_levels as f32,
        "level of detail {level_of_detail} outside [0, {num_levels})"
    );
    (level_of_detail.floor() as u32).min(num_levels - 1)
}
