//! Presentation targets: the swapchain plus everything sized to it.
//!
//! A [`Presentation`] is created and destroyed as a unit whenever the
//! swapchain has to change. Destruction order is framebuffers, swapchain
//! image views, swapchain, then the depth and multisampled color targets.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use vkforge_rhi::device::Device;
use vkforge_rhi::image::{Image, ImageDesc};
use vkforge_rhi::physical_device::SurfaceTarget;
use vkforge_rhi::render_pass::{Framebuffer, RenderPass};
use vkforge_rhi::swapchain::Swapchain;
use vkforge_rhi::{RhiError, RhiResult};

// Field order is the implicit drop order.
pub struct Presentation {
    framebuffers: Vec<Framebuffer>,
    swapchain: Swapchain,
    depth_target: Image,
    /// Present only when the render pass is multisampled.
    color_target: Option<Image>,
}

impl Presentation {
    /// Creates the swapchain for `target` and one framebuffer per image.
    ///
    /// # Errors
    ///
    /// [`RhiError::SwapchainError`] if the surface now prefers a format the
    /// render pass was not built for.
    pub fn new(
        device: &Arc<Device>,
        target: &SurfaceTarget<'_>,
        framebuffer: vk::Extent2D,
        render_pass: &RenderPass,
    ) -> RhiResult<Self> {
        let swapchain = Swapchain::new(device.clone(), target, framebuffer)?;
        if swapchain.format() != render_pass.color_format() {
            return Err(RhiError::SwapchainError(format!(
                "surface format changed from {:?} to {:?}",
                render_pass.color_format(),
                swapchain.format()
            )));
        }

        let extent = swapchain.extent();

        let depth_target = Image::new(
            device.clone(),
            &ImageDesc::device_local(
                extent.width,
                extent.height,
                render_pass.depth_format(),
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                vk::ImageAspectFlags::DEPTH,
            )
            .with_samples(render_pass.samples()),
        )?;

        let color_target = if render_pass.is_multisampled() {
            Some(Image::new(
                device.clone(),
                &ImageDesc::device_local(
                    extent.width,
                    extent.height,
                    swapchain.format(),
                    vk::ImageUsageFlags::TRANSIENT_ATTACHMENT
                        | vk::ImageUsageFlags::COLOR_ATTACHMENT,
                    vk::ImageAspectFlags::COLOR,
                )
                .with_samples(render_pass.samples()),
            )?)
        } else {
            None
        };

        let framebuffers = swapchain
            .image_views()
            .iter()
            .map(|&view| {
                let attachments = match &color_target {
                    Some(color) => vec![color.view(), depth_target.view(), view],
                    None => vec![view, depth_target.view()],
                };
                Framebuffer::new(device.clone(), render_pass, &attachments, extent)
            })
            .collect::<RhiResult<Vec<_>>>()?;

        info!(
            "Presentation targets ready: {}x{}, {} framebuffer(s), {:?}",
            extent.width,
            extent.height,
            framebuffers.len(),
            render_pass.samples()
        );

        Ok(Self {
            framebuffers,
            swapchain,
            depth_target,
            color_target,
        })
    }

    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Framebuffer wrapping swapchain image `image_index`.
    pub fn framebuffer(&self, image_index: u32) -> RhiResult<&Framebuffer> {
        self.framebuffers
            .get(image_index as usize)
            .ok_or_else(|| {
                RhiError::InvalidArgument(format!(
                    "image index {} out of {} framebuffers",
                    image_index,
                    self.framebuffers.len()
                ))
            })
    }

    pub fn destroy(self) {
        let Self {
            framebuffers,
            swapchain,
            depth_target,
            color_target,
        } = self;

        swapchain.cleanup(framebuffers);
        drop(depth_target);
        drop(color_target);
        debug!("Presentation targets destroyed");
    }
}
