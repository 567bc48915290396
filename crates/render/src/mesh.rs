//! GPU-side mesh data.
//!
//! Uploads a [`MeshData`] into device-local vertex and index buffers through
//! a staging copy, and issues the draw for it. Meshes without indices draw
//! non-indexed.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use orrery_resources::MeshData;
use orrery_rhi::RhiResult;
use orrery_rhi::buffer::{Buffer, BufferUsage};
use orrery_rhi::command::{CommandBuffer, CommandPool};
use orrery_rhi::device::Device;

/// Vertex and index buffers for one mesh, in device-local memory.
pub struct GpuMesh {
    vertex_buffer: Buffer,
    index_buffer: Option<Buffer>,
    vertex_count: u32,
    index_count: u32,
}

impl GpuMesh {
    /// Uploads mesh data to the GPU.
    ///
    /// Both buffers are filled through a staging buffer and a blocking copy
    /// on the graphics queue.
    ///
    /// # Panics
    ///
    /// Panics if the mesh has fewer than three vertices.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation or the upload fails.
    pub fn from_mesh_data(
        device: Arc<Device>,
        pool: &CommandPool,
        data: &MeshData,
    ) -> RhiResult<Self> {
        assert!(
            data.vertices.len() >= 3,
            "mesh needs at least three vertices"
        );

        let vertex_buffer = Buffer::device_local_with_data(
            device.clone(),
            pool,
            BufferUsage::Vertex,
            bytemuck::cast_slice(&data.vertices),
        )?;

        let index_buffer = if data.indices.is_empty() {
            None
        } else {
            Some(Buffer::device_local_with_data(
                device,
                pool,
                BufferUsage::Index,
                bytemuck::cast_slice(&data.indices),
            )?)
        };

        debug!(
            "Uploaded mesh: {} vertices, {} indices",
            data.vertices.len(),
            data.indices.len()
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            vertex_count: data.vertices.len() as u32,
            index_count: data.indices.len() as u32,
        })
    }

    /// Binds the vertex (and index, when present) buffers.
    pub fn bind(&self, cmd: &CommandBuffer) {
        cmd.bind_vertex_buffers(0, &[self.vertex_buffer.handle()], &[0]);
        if let Some(ref index_buffer) = self.index_buffer {
            cmd.bind_index_buffer(index_buffer.handle(), 0, vk::IndexType::UINT32);
        }
    }

    /// Issues the draw call: indexed when an index buffer exists.
    pub fn draw(&self, cmd: &CommandBuffer) {
        if self.index_buffer.is_some() {
            cmd.draw_indexed(self.index_count, 1, 0, 0, 0);
        } else {
            cmd.draw(self.vertex_count, 1, 0, 0);
        }
    }

    /// Number of unique vertices.
    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Number of indices (zero for non-indexed meshes).
    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}
