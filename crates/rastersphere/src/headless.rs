//! A [`RenderDevice`] that records instead of rendering.
//!
//! Used by the test suite and the demo driver. Resources hold enough of what
//! was written to them to check tile contents, and failures can be injected
//! to exercise the per-tile skip path.

use rastersphere_geom::{TileVertices, VertexLayout};

use crate::device::{DeviceCapabilities, DrawCall, RenderDevice, TextureFormat};
use crate::error::{DeviceError, DeviceResult};
use crate::source::PixelBlock;
use crate::tile::TileId;

/// Running totals of device operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceCounters {
    pub textures_created: u64,
    pub texture_uploads: u64,
    pub vertex_buffers_created: u64,
    pub vertex_writes: u64,
    pub index_buffers_created: u64,
    pub draws: u64,
}

#[derive(Debug)]
pub struct HeadlessTexture {
    pub id: u32,
    pub dimension: u32,
    pub format: TextureFormat,
    /// Size of the last uploaded block.
    pub contents: Option<(u32, u32)>,
    pub uploads: u32,
}

#[derive(Debug)]
pub struct HeadlessVertexBuffer {
    pub id: u32,
    pub layout: VertexLayout,
    pub capacity: usize,
    pub vertices: Option<TileVertices>,
}

#[derive(Debug)]
pub struct HeadlessIndexBuffer {
    pub id: u32,
    pub indices: Vec<u16>,
}

/// One recorded draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRecord {
    pub tile: TileId,
    pub texture: u32,
    pub vertex_buffer: u32,
    pub index_buffer: u32,
    pub index_count: usize,
}

#[derive(Debug)]
pub struct HeadlessDevice {
    capabilities: DeviceCapabilities,
    counters: DeviceCounters,
    draws: Vec<DrawRecord>,
    next_id: u32,
    failing_uploads: u32,
    failing_draws: u32,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(DeviceCapabilities {
            max_texture_dimension: 8192,
            float_textures: true,
        })
    }
}

impl HeadlessDevice {
    #[must_use]
    pub fn new(capabilities: DeviceCapabilities) -> Self {
        Self {
            capabilities,
            counters: DeviceCounters::default(),
            draws: Vec::new(),
            next_id: 0,
            failing_uploads: 0,
            failing_draws: 0,
        }
    }

    /// Make the next `count` texture uploads fail.
    pub fn fail_next_uploads(&mut self, count: u32) {
        self.failing_uploads = count;
    }

    /// Make the next `count` draws fail.
    pub fn fail_next_draws(&mut self, count: u32) {
        self.failing_draws = count;
    }

    #[must_use]
    pub fn counters(&self) -> DeviceCounters {
        self.counters
    }

    #[must_use]
    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    /// Drain the draws recorded since the last call.
    pub fn take_draws(&mut self) -> Vec<DrawRecord> {
        std::mem::take(&mut self.draws)
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl RenderDevice for HeadlessDevice {
    type Texture = HeadlessTexture;
    type VertexBuffer = HeadlessVertexBuffer;
    type IndexBuffer = HeadlessIndexBuffer;

    fn probe_capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn create_texture(
        &mut self,
        dimension: u32,
        format: TextureFormat,
    ) -> DeviceResult<HeadlessTexture> {
        if dimension > self.capabilities.max_texture_dimension {
            return Err(DeviceError::OutOfMemory);
        }
        self.counters.textures_created += 1;
        Ok(HeadlessTexture {
            id: self.allocate_id(),
            dimension,
            format,
            contents: None,
            uploads: 0,
        })
    }

    fn upload_texture(
        &mut self,
        texture: &mut HeadlessTexture,
        block: &PixelBlock,
    ) -> DeviceResult<()> {
        if self.failing_uploads > 0 {
            self.failing_uploads -= 1;
            return Err(DeviceError::Upload("injected failure".to_string()));
        }
        if block.format() != texture.format {
            return Err(DeviceError::Upload(format!(
                "{:?} block uploaded to {:?} texture",
                block.format(),
                texture.format
            )));
        }
        let (width, height) = block.dimensions();
        if width > texture.dimension || height > texture.dimension {
            return Err(DeviceError::Upload(format!(
                "{width}x{height} block exceeds {0}x{0} texture",
                texture.dimension
            )));
        }
        texture.contents = Some((width, height));
        texture.uploads += 1;
        self.counters.texture_uploads += 1;
        Ok(())
    }

    fn create_vertex_buffer(
        &mut self,
        layout: VertexLayout,
        capacity: usize,
    ) -> DeviceResult<HeadlessVertexBuffer> {
        self.counters.vertex_buffers_created += 1;
        Ok(HeadlessVertexBuffer {
            id: self.allocate_id(),
            layout,
            capacity,
            vertices: None,
        })
    }

    fn write_vertices(
        &mut self,
        buffer: &mut HeadlessVertexBuffer,
        vertices: &TileVertices,
    ) -> DeviceResult<()> {
        if vertices.layout() != buffer.layout || vertices.len() > buffer.capacity {
            return Err(DeviceError::BufferMap(format!(
                "{} {:?} vertices do not fit a {:?} buffer of {}",
                vertices.len(),
                vertices.layout(),
                buffer.layout,
                buffer.capacity
            )));
        }
        buffer.vertices = Some(vertices.clone());
        self.counters.vertex_writes += 1;
        Ok(())
    }

    fn create_index_buffer(&mut self, indices: &[u16]) -> DeviceResult<HeadlessIndexBuffer> {
        self.counters.index_buffers_created += 1;
        Ok(HeadlessIndexBuffer {
            id: self.allocate_id(),
            indices: indices.to_vec(),
        })
    }

    fn draw(&mut self, call: &DrawCall<'_, Self>) -> DeviceResult<()> {
        if self.failing_draws > 0 {
            self.failing_draws -= 1;
            return Err(DeviceError::Draw("injected failure".to_string()));
        }
        if call.texture.contents.is_none() || call.vertices.vertices.is_none() {
            return Err(DeviceError::Draw(format!(
                "tile {} drawn with unpopulated resources",
                call.tile
            )));
        }
        self.counters.draws += 1;
        self.draws.push(DrawRecord {
            tile: call.tile,
            texture: call.texture.id,
            vertex_buffer: call.vertices.id,
            index_buffer: call.indices.id,
            index_count: call.index_count,
        });
        Ok(())
    }
}
