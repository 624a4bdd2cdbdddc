//! Device-local vertex and index buffers for one mesh.

use ash::vk;
use tracing::debug;

use vkforge_resources::MeshData;
use vkforge_rhi::buffer::{Buffer, BufferKind};
use vkforge_rhi::command::CommandBuffer;
use vkforge_rhi::transfer::TransferContext;
use vkforge_rhi::{RhiError, RhiResult};

pub struct GpuMesh {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
}

impl GpuMesh {
    /// Uploads `mesh` through staging buffers.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidArgument`] if the mesh is empty or has an index
    /// outside its vertex list.
    pub fn upload(transfer: &TransferContext, mesh: &MeshData) -> RhiResult<Self> {
        mesh.validate()
            .map_err(|e| RhiError::InvalidArgument(e.to_string()))?;

        let vertex_buffer =
            transfer.upload_buffer(BufferKind::Vertex, bytemuck::cast_slice(&mesh.vertices))?;
        let index_buffer =
            transfer.upload_buffer(BufferKind::Index, bytemuck::cast_slice(&mesh.indices))?;

        debug!(
            "Mesh uploaded: {} vertices, {} indices",
            mesh.vertices.len(),
            mesh.indices.len()
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.index_count(),
        })
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Binds both buffers and draws every index once.
    pub fn draw(&self, cmd: &CommandBuffer) {
        cmd.bind_vertex_buffers(0, &[self.vertex_buffer.handle()], &[0]);
        cmd.bind_index_buffer(self.index_buffer.handle(), 0, vk::IndexType::UINT32);
        cmd.draw_indexed(self.index_count, 1, 0, 0, 0);
    }
}
