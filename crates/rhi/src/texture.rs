//! Sampled textures: a mipmapped device-local image plus its sampler.

use std::sync::Arc;

use ash::vk;
use tracing::info;

use crate::error::RhiResult;
use crate::image::Image;
use crate::sampler::Sampler;
use crate::transfer::TransferContext;

/// Format used for decoded RGBA8 color textures.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Image and sampler bound together at descriptor binding time.
pub struct Texture {
    image: Image,
    sampler: Sampler,
}

impl Texture {
    /// Uploads tightly packed RGBA8 pixels and generates the full mip chain.
    ///
    /// # Errors
    ///
    /// - [`crate::RhiError::InvalidArgument`] if `pixels` is not `width * height * 4` bytes
    /// - [`crate::RhiError::UnsupportedFormat`] if the format cannot be linearly blitted
    pub fn from_rgba8(
        transfer: &TransferContext,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> RhiResult<Self> {
        // Length and extent are validated by the upload
        let image = transfer.upload_image(pixels, width, height, TEXTURE_FORMAT, true)?;
        let sampler = Sampler::new(Arc::clone(transfer.device()), image.mip_levels())?;

        info!(
            "Texture created: {}x{}, {} mip level(s)",
            width,
            height,
            image.mip_levels()
        );

        Ok(Self { image, sampler })
    }

    #[inline]
    pub fn image(&self) -> &Image {
        &self.image
    }

    #[inline]
    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    /// Descriptor info for a combined image sampler binding.
    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler.handle(),
            image_view: self.image.view(),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }
}
