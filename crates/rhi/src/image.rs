//! 2D images with bound memory and a view.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Number of mip levels needed to reduce `width` x `height` to 1x1.
pub fn mip_levels_for(width: u32, height: u32) -> u32 {
    let largest = width.max(height).max(1);
    u32::BITS - largest.leading_zeros()
}

/// Parameters for [`Image::new`].
#[derive(Clone, Copy, Debug)]
pub struct ImageDesc {
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub samples: vk::SampleCountFlags,
    pub format: vk::Format,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
    pub properties: vk::MemoryPropertyFlags,
    pub aspect: vk::ImageAspectFlags,
}

impl ImageDesc {
    /// Single-sample, optimal-tiling, device-local image with one level.
    pub fn device_local(
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> Self {
        Self {
            width,
            height,
            mip_levels: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            format,
            tiling: vk::ImageTiling::OPTIMAL,
            usage,
            properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            aspect,
        }
    }

    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    pub fn with_samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }
}

/// Image, its memory and a view over every mip level.
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent2D,
    mip_levels: u32,
    samples: vk::SampleCountFlags,
    aspect: vk::ImageAspectFlags,
}

impl Image {
    /// Creates the image, binds memory with `desc.properties` and creates
    /// the paired view.
    ///
    /// # Errors
    ///
    /// - [`RhiError::InvalidArgument`] for a zero extent or zero mip levels
    /// - [`RhiError::CreationError`] if the driver rejects the image or view
    /// - [`RhiError::AllocationError`] if no memory type qualifies
    pub fn new(device: Arc<Device>, desc: &ImageDesc) -> RhiResult<Self> {
        if desc.width == 0 || desc.height == 0 || desc.mip_levels == 0 {
            return Err(RhiError::InvalidArgument(format!(
                "image {}x{} with {} mip level(s)",
                desc.width, desc.height, desc.mip_levels
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            })
            .mip_levels(desc.mip_levels)
            .array_layers(1)
            .format(desc.format)
            .tiling(desc.tiling)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.usage)
            .samples(desc.samples)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe {
            device
                .handle()
                .create_image(&image_info, None)
                .map_err(RhiError::creation("image"))?
        };

        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };
        let linear = desc.tiling == vk::ImageTiling::LINEAR;

        let allocation = match device.allocate_memory("image", requirements, desc.properties, linear)
        {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e);
            }
        };

        let view = unsafe {
            device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .map_err(RhiError::from)
                .and_then(|()| {
                    create_image_view(device.handle(), image, desc.format, desc.aspect, desc.mip_levels)
                })
        };
        let view = match view {
            Ok(view) => view,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                device.free_memory(allocation);
                return Err(e);
            }
        };

        debug!(
            "Created image {}x{} {:?}, {} mip(s), {:?}",
            desc.width, desc.height, desc.format, desc.mip_levels, desc.samples
        );

        Ok(Self {
            device,
            image,
            view,
            allocation: Some(allocation),
            format: desc.format,
            extent: vk::Extent2D {
                width: desc.width,
                height: desc.height,
            },
            mip_levels: desc.mip_levels,
            samples: desc.samples,
            aspect: desc.aspect,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    #[inline]
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }

    /// Subresource range covering every mip level.
    pub fn full_range(&self) -> vk::ImageSubresourceRange {
        subresource_range(self.aspect, 0, self.mip_levels)
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
            self.device.handle().destroy_image(self.image, None);
        }
        if let Some(allocation) = self.allocation.take() {
            self.device.free_memory(allocation);
        }
        debug!(
            "Destroyed image {}x{} {:?}",
            self.extent.width, self.extent.height, self.format
        );
    }
}

/// Range over `level_count` levels starting at `base_mip`, single layer.
pub fn subresource_range(
    aspect: vk::ImageAspectFlags,
    base_mip: u32,
    level_count: u32,
) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: base_mip,
        level_count,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Creates a 2D view over the first `mip_levels` levels of `image`.
pub fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
    mip_levels: u32,
) -> RhiResult<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping::default())
        .subresource_range(subresource_range(aspect, 0, mip_levels));

    unsafe {
        device
            .create_image_view(&view_info, None)
            .map_err(RhiError::creation("image view"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_levels_for() {
        assert_eq!(mip_levels_for(1, 1), 1);
        assert_eq!(mip_levels_for(2, 1), 2);
        assert_eq!(mip_levels_for(512, 512), 10);
        assert_eq!(mip_levels_for(1024, 768), 11);
        assert_eq!(mip_levels_for(800, 600), 10);
        assert_eq!(mip_levels_for(1023, 1), 10);
    }

    #[test]
    fn test_mip_levels_zero_extent() {
        assert_eq!(mip_levels_for(0, 0), 1);
    }

    #[test]
    fn test_device_local_desc_defaults() {
        let desc = ImageDesc::device_local(
            64,
            32,
            vk::Format::R8G8B8A8_SRGB,
            vk::ImageUsageFlags::SAMPLED,
            vk::ImageAspectFlags::COLOR,
        )
        .with_mip_levels(mip_levels_for(64, 32));

        assert_eq!(desc.mip_levels, 7);
        assert_eq!(desc.samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(desc.tiling, vk::ImageTiling::OPTIMAL);
        assert_eq!(desc.properties, vk::MemoryPropertyFlags::DEVICE_LOCAL);
    }

    #[test]
    fn test_subresource_range() {
        let range = subresource_range(vk::ImageAspectFlags::DEPTH, 2, 3);
        assert_eq!(range.base_mip_level, 2);
        assert_eq!(range.level_count, 3);
        assert_eq!(range.layer_count, 1);
    }
}
