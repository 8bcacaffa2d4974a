//! Graphics device seam.
//!
//! The engine owns no graphics API. Everything it needs from the GPU goes
//! through [`RenderDevice`], and everything it needs to know about the GPU
//! up front is probed once into a [`RenderContext`].

use rastersphere_geom::{TileVertices, VertexLayout};
use tracing::info;

use crate::error::DeviceResult;
use crate::source::PixelBlock;
use crate::tile::TileId;

/// Texel storage format of a tile texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8,
    R32Float,
}

/// What the device can do, probed once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
    pub max_texture_dimension: u32,
    /// Whether single-channel float textures can be created and sampled.
    pub float_textures: bool,
}

/// Process-wide context created once from a probed device and passed by
/// reference to everything that needs capability information.
#[derive(Debug, Clone)]
pub struct RenderContext {
    capabilities: DeviceCapabilities,
}

impl RenderContext {
    pub fn probe<D: RenderDevice + ?Sized>(device: &D) -> Self {
        let capabilities = device.probe_capabilities();
        info!(
            max_texture_dimension = capabilities.max_texture_dimension,
            float_textures = capabilities.float_textures,
            "Probed render device"
        );
        Self { capabilities }
    }

    #[must_use]
    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    #[must_use]
    pub fn supports(&self, format: TextureFormat) -> bool {
        match format {
            TextureFormat::Rgba8 => true,
            TextureFormat::R32Float => self.capabilities.float_textures,
        }
    }
}

/// Everything needed to draw one tile.
pub struct DrawCall<'a, D: RenderDevice + ?Sized> {
    pub tile: TileId,
    pub texture: &'a D::Texture,
    pub vertices: &'a D::VertexBuffer,
    pub indices: &'a D::IndexBuffer,
    pub index_count: usize,
}

/// A graphics device able to hold tile textures and meshes and draw them.
///
/// All calls happen on the thread that owns the device.
pub trait RenderDevice {
    type Texture;
    type VertexBuffer;
    type IndexBuffer;

    fn probe_capabilities(&self) -> DeviceCapabilities;

    /// Square texture of `dimension` texels per side.
    fn create_texture(
        &mut self,
        dimension: u32,
        format: TextureFormat,
    ) -> DeviceResult<Self::Texture>;

    /// Write `block` into the texture starting at texel (0, 0). Blocks of
    /// partial tiles are smaller than the texture.
    fn upload_texture(
        &mut self,
        texture: &mut Self::Texture,
        block: &PixelBlock,
    ) -> DeviceResult<()>;

    /// Buffer able to hold `capacity` vertices of `layout`.
    fn create_vertex_buffer(
        &mut self,
        layout: VertexLayout,
        capacity: usize,
    ) -> DeviceResult<Self::VertexBuffer>;

    fn write_vertices(
        &mut self,
        buffer: &mut Self::VertexBuffer,
        vertices: &TileVertices,
    ) -> DeviceResult<()>;

    fn create_index_buffer(&mut self, indices: &[u16]) -> DeviceResult<Self::IndexBuffer>;

    fn draw(&mut self, call: &DrawCall<'_, Self>) -> DeviceResult<()>;
}
