//! Engine configuration.

use rastersphere_geom::{GeoreferenceTolerances, MAX_VERTICES_PER_AXIS};
use serde::{Deserialize, Serialize};

/// Tunables for pyramid construction, meshing and caching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Texels along each side of a tile texture. Must be a nonzero power of two.
    pub tile_texel_dimension: u32,
    /// Largest angle, in degrees, one mesh segment may span on the globe.
    pub max_degrees_per_vertex: f64,
    pub min_texels_per_vertex: f64,
    pub max_texels_per_vertex: f64,
    /// Upper bound on vertices along one side of a tile mesh. Values above
    /// the 16-bit index limit are lowered to it.
    pub max_vertices_per_axis: u32,
    /// Number of coarsest levels whose tile bounds also sample interior
    /// vertices.
    pub coarse_interior_sample_levels: u32,
    pub cache: CacheConfig,
    pub tolerances: GeoreferenceTolerances,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tile_texel_dimension: 256,
            max_degrees_per_vertex: 1.0,
            min_texels_per_vertex: 1.0 / 16.0,
            max_texels_per_vertex: 16.0,
            max_vertices_per_axis: MAX_VERTICES_PER_AXIS,
            coarse_interior_sample_levels: 4,
            cache: CacheConfig::default(),
            tolerances: GeoreferenceTolerances::default(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn effective_max_vertices_per_axis(&self) -> u32 {
        self.max_vertices_per_axis.clamp(2, MAX_VERTICES_PER_AXIS)
    }
}

/// Number of idle objects each cache keeps before recycling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_textures: usize,
    pub max_vertex_buffers: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_textures: 512,
            max_vertex_buffers: 512,
        }
    }
}
