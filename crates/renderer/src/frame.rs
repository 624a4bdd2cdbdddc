//! Per-slot frame resources.
//!
//! Each frame-in-flight slot owns its synchronization objects, a command
//! buffer, a persistently mapped uniform buffer and the descriptor set
//! pointing at that buffer. Nothing here is shared between slots except
//! the texture referenced by the descriptor set.
//!
//! # Synchronization Flow
//!
//! ```text
//! 1. Wait on in_flight (previous use of this slot has retired)
//! 2. Acquire image (signals image_acquired)
//! 3. Reset in_flight, write uniforms, record
//! 4. Submit: wait image_acquired, signal render_finished + in_flight
//! 5. Present: wait render_finished
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use vkforge_rhi::RhiResult;
use vkforge_rhi::buffer::PersistentBuffer;
use vkforge_rhi::command::{CommandBuffer, CommandPool};
use vkforge_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, write_frame_set};
use vkforge_rhi::device::Device;
use vkforge_rhi::sync::FrameSync;
use vkforge_rhi::texture::Texture;

use crate::MAX_FRAMES_IN_FLIGHT;
use crate::ubo::UniformBufferObject;

pub struct FrameSlot {
    sync: FrameSync,
    command_buffer: CommandBuffer,
    uniforms: PersistentBuffer,
    descriptor_set: vk::DescriptorSet,
}

impl FrameSlot {
    fn new(
        device: Arc<Device>,
        pool: &CommandPool,
        descriptor_set: vk::DescriptorSet,
        texture: &Texture,
    ) -> RhiResult<Self> {
        let sync = FrameSync::new(device.clone())?;
        let command_buffer = CommandBuffer::new(device.clone(), pool)?;
        let uniforms = PersistentBuffer::uniform::<UniformBufferObject>(device.clone())?;
        write_frame_set(&device, descriptor_set, &uniforms, texture);

        Ok(Self {
            sync,
            command_buffer,
            uniforms,
            descriptor_set,
        })
    }

    /// Creates [`MAX_FRAMES_IN_FLIGHT`] slots with sets from `descriptor_pool`.
    pub fn create_all(
        device: &Arc<Device>,
        pool: &CommandPool,
        descriptor_pool: &DescriptorPool,
        layout: &DescriptorSetLayout,
        texture: &Texture,
    ) -> RhiResult<Vec<Self>> {
        let layouts = [layout.handle(); MAX_FRAMES_IN_FLIGHT];
        let sets = descriptor_pool.allocate(&layouts)?;

        let slots = sets
            .into_iter()
            .map(|set| Self::new(device.clone(), pool, set, texture))
            .collect::<RhiResult<Vec<_>>>()?;

        debug!("Created {} frame slot(s)", slots.len());
        Ok(slots)
    }

    #[inline]
    pub fn sync(&self) -> &FrameSync {
        &self.sync
    }

    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    #[inline]
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }

    /// Writes through the persistent mapping; the slot's fence must have
    /// been waited on.
    pub fn write_uniforms(&mut self, ubo: &UniformBufferObject) -> RhiResult<()> {
        self.uniforms.write(ubo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_slot_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameSlot>();
    }
}
