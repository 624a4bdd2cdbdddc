//! Synchronous transfers through single-time command buffers.
//!
//! Every operation records into a fresh command buffer, submits it to the
//! graphics queue and blocks until it completes before returning. Device
//! local resources are filled through a host-visible staging buffer that
//! is destroyed once the copy has finished.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkforge_rhi::buffer::BufferKind;
//! use vkforge_rhi::device::Device;
//! use vkforge_rhi::transfer::TransferContext;
//!
//! # fn example(device: Arc<Device>) -> Result<(), vkforge_rhi::RhiError> {
//! let transfer = TransferContext::new(device)?;
//! let indices: [u32; 6] = [0, 1, 2, 2, 3, 0];
//! let index_buffer = transfer.upload_buffer(BufferKind::Index, bytemuck::cast_slice(&indices))?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error};

use crate::buffer::{Buffer, BufferKind};
use crate::command::{CommandBuffer, CommandPool};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, ImageDesc, mip_levels_for, subresource_range};
use crate::layout::{record_transition, transition_masks};
use crate::mipmap::{check_linear_blit_support, record_mip_chain};
use crate::sync::Fence;

/// Transient command pool plus the queue transfers are submitted to.
pub struct TransferContext {
    device: Arc<Device>,
    pool: CommandPool,
    queue: vk::Queue,
}

impl TransferContext {
    /// Creates a transient pool on the graphics family.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let pool = CommandPool::new_transient(device.clone(), device.graphics_family())?;
        let queue = device.graphics_queue();
        Ok(Self {
            device,
            pool,
            queue,
        })
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Records `record` into a one-time command buffer, submits it and waits.
    ///
    /// The wait is bounded by the device timeout. The command buffer is
    /// freed before returning, also on error.
    pub fn submit_single_time<F>(&self, record: F) -> RhiResult<()>
    where
        F: FnOnce(&CommandBuffer) -> RhiResult<()>,
    {
        let cmd = CommandBuffer::new(self.device.clone(), &self.pool)?;
        let result = self.record_and_wait(&cmd, record);
        self.pool.free_command_buffers(&[cmd.handle()]);
        result
    }

    fn record_and_wait<F>(&self, cmd: &CommandBuffer, record: F) -> RhiResult<()>
    where
        F: FnOnce(&CommandBuffer) -> RhiResult<()>,
    {
        cmd.begin()?;
        record(cmd)?;
        cmd.end()?;

        let fence = Fence::new(self.device.clone(), false)?;
        let command_buffers = [cmd.handle()];
        let submit = vk::SubmitInfo::default().command_buffers(&command_buffers);

        unsafe {
            self.device
                .handle()
                .queue_submit(self.queue, &[submit], fence.handle())?;
        }

        // On timeout the buffer may still be pending; settle the queue
        // before the caller frees it.
        fence.wait().inspect_err(|_| unsafe {
            if let Err(e) = self.device.handle().queue_wait_idle(self.queue) {
                error!("Transfer queue did not go idle after a failed wait: {:?}", e);
            }
        })
    }

    /// Copies the first `size` bytes of `src` into `dst`.
    pub fn copy_buffer(&self, src: &Buffer, dst: &Buffer, size: vk::DeviceSize) -> RhiResult<()> {
        check_copy_size(src, dst, size)?;
        self.submit_single_time(|cmd| {
            record_buffer_copy(cmd, src, dst, size);
            Ok(())
        })
    }

    /// Copies `src` into mip level 0 of `dst`, which must be in
    /// `TRANSFER_DST_OPTIMAL`.
    pub fn copy_buffer_to_image(&self, src: &Buffer, dst: &Image) -> RhiResult<()> {
        self.submit_single_time(|cmd| {
            record_copy_to_image(cmd, src, dst);
            Ok(())
        })
    }

    /// Transitions every mip level of `image` from `old` to `new`.
    pub fn transition_image_layout(
        &self,
        image: &Image,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) -> RhiResult<()> {
        // Reject before allocating a command buffer
        transition_masks(old, new)?;
        self.submit_single_time(|cmd| {
            record_transition(cmd, image.handle(), image.full_range(), old, new)
        })
    }

    /// Fills every mip level of `image` from level 0.
    ///
    /// Every level must be in `TRANSFER_DST_OPTIMAL`; afterwards all levels
    /// are in `SHADER_READ_ONLY_OPTIMAL`.
    pub fn generate_mip_chain(&self, image: &Image) -> RhiResult<()> {
        check_linear_blit_support(&self.device, image.format())?;
        self.submit_single_time(|cmd| record_mip_chain(cmd, image))
    }

    /// Creates a device-local buffer of `kind` holding `data`.
    pub fn upload_buffer(&self, kind: BufferKind, data: &[u8]) -> RhiResult<Buffer> {
        let size = data.len() as vk::DeviceSize;

        let staging = Buffer::of_kind(self.device.clone(), BufferKind::Staging, size)?;
        staging.fill(data)?;

        let buffer = Buffer::new(
            self.device.clone(),
            size,
            kind.usage() | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        self.copy_buffer(&staging, &buffer, size)?;

        debug!("Uploaded {} bytes to {} buffer", size, kind.name());
        Ok(buffer)
    }

    /// Copies a buffer's contents back to the host through a readback
    /// buffer.
    ///
    /// The copy is followed by a transfer-to-host barrier in the same
    /// submission so the fence wait makes the bytes visible to the host.
    pub fn download_buffer(&self, src: &Buffer) -> RhiResult<Vec<u8>> {
        let size = src.size();
        let readback = Buffer::of_kind(self.device.clone(), BufferKind::Readback, size)?;

        self.submit_single_time(|cmd| {
            record_buffer_copy(cmd, src, &readback, size);
            let (src_stage, dst_stage, barrier) = host_readback_barrier();
            cmd.memory_barrier(src_stage, dst_stage, barrier);
            Ok(())
        })?;

        readback.read()
    }

    /// Creates a sampled, device-local image holding tightly packed `pixels`.
    ///
    /// With `mipmapped` the full chain is generated by blits; the image is
    /// left in `SHADER_READ_ONLY_OPTIMAL` either way.
    ///
    /// # Errors
    ///
    /// - [`RhiError::InvalidArgument`] if either dimension is zero or `pixels`
    ///   is not exactly `width * height` texels of `format`
    /// - [`RhiError::UnsupportedFormat`] if `format` has no known texel size,
    ///   or `mipmapped` is set and the format cannot be linearly blitted
    pub fn upload_image(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
        format: vk::Format,
        mipmapped: bool,
    ) -> RhiResult<Image> {
        check_pixel_len(pixels.len(), width, height, format)?;
        if mipmapped {
            check_linear_blit_support(&self.device, format)?;
        }

        let staging =
            Buffer::of_kind(self.device.clone(), BufferKind::Staging, pixels.len() as u64)?;
        staging.fill(pixels)?;

        let mip_levels = if mipmapped { mip_levels_for(width, height) } else { 1 };
        let mut usage = vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED;
        if mipmapped {
            usage |= vk::ImageUsageFlags::TRANSFER_SRC;
        }

        let image = Image::new(
            self.device.clone(),
            &ImageDesc::device_local(width, height, format, usage, vk::ImageAspectFlags::COLOR)
                .with_mip_levels(mip_levels),
        )?;

        self.submit_single_time(|cmd| {
            use vk::ImageLayout as L;

            record_transition(cmd, image.handle(), image.full_range(), L::UNDEFINED, L::TRANSFER_DST_OPTIMAL)?;
            record_copy_to_image(cmd, &staging, &image);
            if mipmapped {
                record_mip_chain(cmd, &image)
            } else {
                let base = subresource_range(image.aspect(), 0, 1);
                record_transition(cmd, image.handle(), base, L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL)
            }
        })?;

        debug!(
            "Uploaded {}x{} {:?} image with {} mip level(s)",
            width, height, format, mip_levels
        );
        Ok(image)
    }
}

/// Bytes per texel of the uncompressed color formats images are uploaded in.
pub fn texel_size(format: vk::Format) -> Option<u64> {
    use vk::Format as F;

    match format {
        F::R8_UNORM | F::R8_SRGB => Some(1),
        F::R8G8_UNORM | F::R8G8_SRGB => Some(2),
        F::R8G8B8A8_UNORM | F::R8G8B8A8_SRGB | F::B8G8R8A8_UNORM | F::B8G8R8A8_SRGB => Some(4),
        F::R16G16B16A16_SFLOAT => Some(8),
        F::R32G32B32A32_SFLOAT => Some(16),
        _ => None,
    }
}

/// Fails unless `len` bytes are exactly `width x height` texels of `format`.
fn check_pixel_len(len: usize, width: u32, height: u32, format: vk::Format) -> RhiResult<()> {
    if width == 0 || height == 0 {
        return Err(RhiError::InvalidArgument(format!(
            "image extent {}x{} has zero area",
            width, height
        )));
    }

    let texel = texel_size(format).ok_or(RhiError::UnsupportedFormat {
        format,
        feature: "tightly packed upload",
    })?;
    let expected = u64::from(width) * u64::from(height) * texel;
    if len as u64 != expected {
        return Err(RhiError::InvalidArgument(format!(
            "expected {} bytes of {:?} for {}x{}, got {}",
            expected, format, width, height, len
        )));
    }
    Ok(())
}

fn check_copy_size(src: &Buffer, dst: &Buffer, size: vk::DeviceSize) -> RhiResult<()> {
    if size > src.size() || size > dst.size() {
        return Err(RhiError::InvalidArgument(format!(
            "copy of {} bytes exceeds source ({}) or destination ({})",
            size,
            src.size(),
            dst.size()
        )));
    }
    Ok(())
}

/// Makes transfer writes available to host reads after the fence signals.
fn host_readback_barrier() -> (
    vk::PipelineStageFlags,
    vk::PipelineStageFlags,
    vk::MemoryBarrier<'static>,
) {
    let barrier = vk::MemoryBarrier::default()
        .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .dst_access_mask(vk::AccessFlags::HOST_READ);
    (
        vk::PipelineStageFlags::TRANSFER,
        vk::PipelineStageFlags::HOST,
        barrier,
    )
}

fn record_buffer_copy(cmd: &CommandBuffer, src: &Buffer, dst: &Buffer, size: vk::DeviceSize) {
    cmd.copy_buffer(
        src.handle(),
        dst.handle(),
        &[vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        }],
    );
}

fn record_copy_to_image(cmd: &CommandBuffer, src: &Buffer, dst: &Image) {
    let extent = dst.extent();
    let region = vk::BufferImageCopy {
        buffer_offset: 0,
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: dst.aspect(),
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        },
        image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
        image_extent: vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        },
    };
    cmd.copy_buffer_to_image(
        src.handle(),
        dst.handle(),
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        &[region],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texel_size_of_upload_formats() {
        assert_eq!(texel_size(vk::Format::R8G8B8A8_SRGB), Some(4));
        assert_eq!(texel_size(vk::Format::B8G8R8A8_UNORM), Some(4));
        assert_eq!(texel_size(vk::Format::R8_UNORM), Some(1));
        assert_eq!(texel_size(vk::Format::R32G32B32A32_SFLOAT), Some(16));
        assert_eq!(texel_size(vk::Format::BC1_RGB_UNORM_BLOCK), None);
        assert_eq!(texel_size(vk::Format::D32_SFLOAT), None);
    }

    #[test]
    fn test_pixel_len_must_cover_extent() {
        let format = vk::Format::R8G8B8A8_SRGB;
        assert!(check_pixel_len(64 * 32 * 4, 64, 32, format).is_ok());

        // 16 bytes cannot back a 64x32 copy
        assert!(matches!(
            check_pixel_len(16, 64, 32, format),
            Err(RhiError::InvalidArgument(_))
        ));
        assert!(matches!(
            check_pixel_len(64 * 32 * 4 + 1, 64, 32, format),
            Err(RhiError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_zero_extent_is_rejected() {
        let format = vk::Format::R8G8B8A8_UNORM;
        assert!(matches!(
            check_pixel_len(0, 0, 32, format),
            Err(RhiError::InvalidArgument(_))
        ));
        assert!(matches!(
            check_pixel_len(0, 64, 0, format),
            Err(RhiError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_unknown_texel_size_is_unsupported() {
        assert!(matches!(
            check_pixel_len(8, 4, 4, vk::Format::BC1_RGB_UNORM_BLOCK),
            Err(RhiError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_readback_barrier_reaches_host() {
        let (src_stage, dst_stage, barrier) = host_readback_barrier();
        assert_eq!(src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(dst_stage, vk::PipelineStageFlags::HOST);
        assert_eq!(barrier.src_access_mask, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(barrier.dst_access_mask, vk::AccessFlags::HOST_READ);
    }
}
