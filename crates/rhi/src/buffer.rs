//! GPU buffers.
//!
//! [`Buffer`] pairs a `VkBuffer` with memory chosen by property flags.
//! Host-visible buffers can be filled and read back directly; device-local
//! buffers are populated through [`crate::transfer::TransferContext`].
//! [`PersistentBuffer`] keeps a host pointer for per-frame writes.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkforge_rhi::buffer::{Buffer, BufferKind};
//! use vkforge_rhi::device::Device;
//!
//! # fn example(device: Arc<Device>) -> Result<(), vkforge_rhi::RhiError> {
//! let data = [1u8, 2, 3, 4];
//! let staging = Buffer::of_kind(device, BufferKind::Staging, data.len() as u64)?;
//! staging.fill(&data)?;
//! # Ok(())
//! # }
//! ```

use std::ptr::NonNull;
use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;
use gpu_allocator::vulkan::Allocation;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

const HOST_MEMORY: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

/// Common buffer configurations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferKind {
    /// Device-local vertex data, filled by a transfer
    Vertex,
    /// Device-local index data, filled by a transfer
    Index,
    /// Host-visible uniform data, rewritten every frame
    Uniform,
    /// Device-local storage buffer, filled by a transfer
    Storage,
    /// Host-visible transfer source
    Staging,
    /// Host-visible transfer destination for readback
    Readback,
}

impl BufferKind {
    pub fn usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferKind::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferKind::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferKind::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferKind::Storage => {
                vk::BufferUsageFlags::STORAGE_BUFFER
                    | vk::BufferUsageFlags::TRANSFER_DST
                    | vk::BufferUsageFlags::TRANSFER_SRC
            }
            BufferKind::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
            BufferKind::Readback => vk::BufferUsageFlags::TRANSFER_DST,
        }
    }

    pub fn memory_properties(self) -> vk::MemoryPropertyFlags {
        match self {
            BufferKind::Vertex | BufferKind::Index | BufferKind::Storage => {
                vk::MemoryPropertyFlags::DEVICE_LOCAL
            }
            BufferKind::Uniform | BufferKind::Staging | BufferKind::Readback => HOST_MEMORY,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BufferKind::Vertex => "vertex",
            BufferKind::Index => "index",
            BufferKind::Uniform => "uniform",
            BufferKind::Storage => "storage",
            BufferKind::Staging => "staging",
            BufferKind::Readback => "readback",
        }
    }
}

/// GPU buffer with bound memory.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    properties: vk::MemoryPropertyFlags,
}

impl Buffer {
    /// Creates a buffer and binds memory having all of `properties`.
    ///
    /// # Errors
    ///
    /// - [`RhiError::InvalidArgument`] for a zero size
    /// - [`RhiError::CreationError`] if the driver rejects the buffer
    /// - [`RhiError::AllocationError`] if no memory type qualifies
    pub fn new(
        device: Arc<Device>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidArgument(
                "buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device
                .handle()
                .create_buffer(&buffer_info, None)
                .map_err(RhiError::creation("buffer"))?
        };

        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = match device.allocate_memory("buffer", requirements, properties, true) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let bound = unsafe {
            device
                .handle()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            unsafe { device.handle().destroy_buffer(buffer, None) };
            device.free_memory(allocation);
            return Err(e.into());
        }

        debug!("Created buffer: {} bytes, {:?}, {:?}", size, usage, properties);

        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
            properties,
        })
    }

    /// Creates a buffer from one of the common configurations.
    pub fn of_kind(device: Arc<Device>, kind: BufferKind, size: vk::DeviceSize) -> RhiResult<Self> {
        Self::new(device, size, kind.usage(), kind.memory_properties())
    }

    /// Copies `data` to the start of the buffer.
    pub fn fill(&self, data: &[u8]) -> RhiResult<()> {
        self.write(0, data)
    }

    /// Copies `data` into the buffer at `offset`.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidArgument`] if the buffer is not host-visible or the
    /// write would run past its end.
    pub fn write(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        check_range(self.size, offset, data.len())?;

        let dst = self.host_ptr()?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst.as_ptr().add(offset as usize), data.len());
        }
        Ok(())
    }

    /// Copies the whole buffer to host memory.
    pub fn read(&self) -> RhiResult<Vec<u8>> {
        let src = self.host_ptr()?;
        let mut out = vec![0u8; self.size as usize];
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), out.as_mut_ptr(), out.len());
        }
        Ok(out)
    }

    /// Whether the memory can be written from the host.
    #[inline]
    pub fn is_host_visible(&self) -> bool {
        self.properties
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    }

    fn host_ptr(&self) -> RhiResult<NonNull<u8>> {
        if !self.is_host_visible() {
            return Err(RhiError::InvalidArgument(
                "buffer memory is not host-visible".to_string(),
            ));
        }
        self.allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .map(NonNull::cast)
            .ok_or_else(|| RhiError::InvalidArgument("buffer memory is not mapped".to_string()))
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    #[inline]
    pub fn memory_properties(&self) -> vk::MemoryPropertyFlags {
        self.properties
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }
        if let Some(allocation) = self.allocation.take() {
            self.device.free_memory(allocation);
        }
        debug!("Destroyed buffer: {} bytes", self.size);
    }
}

/// Host-visible buffer whose mapping is resolved once and kept.
///
/// Used for uniform data rewritten every frame.
pub struct PersistentBuffer {
    buffer: Buffer,
    mapped: NonNull<u8>,
}

impl PersistentBuffer {
    pub fn new(
        device: Arc<Device>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> RhiResult<Self> {
        let buffer = Buffer::new(device, size, usage, HOST_MEMORY)?;
        let mapped = buffer.host_ptr()?;
        Ok(Self { buffer, mapped })
    }

    /// Uniform buffer sized for one `T`.
    pub fn uniform<T: Pod>(device: Arc<Device>) -> RhiResult<Self> {
        Self::new(
            device,
            std::mem::size_of::<T>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
        )
    }

    /// Writes `value` at the start of the mapping.
    pub fn write<T: Pod>(&mut self, value: &T) -> RhiResult<()> {
        self.write_bytes(0, bytemuck::bytes_of(value))
    }

    pub fn write_bytes(&mut self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        check_range(self.buffer.size, offset, data.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                self.mapped.as_ptr().add(offset as usize),
                data.len(),
            );
        }
        Ok(())
    }

    #[inline]
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.buffer.size()
    }
}

// Safety: the mapping belongs to the owned allocation and is only written
// through `&mut self`.
unsafe impl Send for PersistentBuffer {}

fn check_range(size: vk::DeviceSize, offset: vk::DeviceSize, len: usize) -> RhiResult<()> {
    let end = offset.checked_add(len as vk::DeviceSize);
    match end {
        Some(end) if end <= size => Ok(()),
        _ => Err(RhiError::InvalidArgument(format!(
            "write exceeds buffer size: offset {} + data {} > buffer {}",
            offset, len, size
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_local_kinds_are_transfer_destinations() {
        for kind in [BufferKind::Vertex, BufferKind::Index, BufferKind::Storage] {
            assert!(kind.usage().contains(vk::BufferUsageFlags::TRANSFER_DST));
            assert_eq!(kind.memory_properties(), vk::MemoryPropertyFlags::DEVICE_LOCAL);
        }
    }

    #[test]
    fn test_host_kinds_are_coherent() {
        for kind in [BufferKind::Uniform, BufferKind::Staging, BufferKind::Readback] {
            let props = kind.memory_properties();
            assert!(props.contains(vk::MemoryPropertyFlags::HOST_VISIBLE));
            assert!(props.contains(vk::MemoryPropertyFlags::HOST_COHERENT));
        }
        assert!(BufferKind::Staging.usage().contains(vk::BufferUsageFlags::TRANSFER_SRC));
        assert!(BufferKind::Readback.usage().contains(vk::BufferUsageFlags::TRANSFER_DST));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(BufferKind::Vertex.name(), "vertex");
        assert_eq!(BufferKind::Readback.name(), "readback");
    }

    #[test]
    fn test_check_range() {
        assert!(check_range(16, 0, 16).is_ok());
        assert!(check_range(16, 8, 8).is_ok());
        assert!(check_range(16, 8, 9).is_err());
        assert!(check_range(16, u64::MAX, 1).is_err());
    }

    #[test]
    fn test_persistent_buffer_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<PersistentBuffer>();
    }
}
