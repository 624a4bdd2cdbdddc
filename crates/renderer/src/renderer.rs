//! Top-level renderer.
//!
//! [`Renderer`] pairs the [`VulkanBackend`] with a [`FrameScheduler`] and
//! is what the application drives once per redraw.

use ash::vk;
use tracing::info;

use vkforge_core::RendererConfig;
use vkforge_platform::{FramebufferSource, Window};
use vkforge_resources::{MeshData, TextureData};
use vkforge_rhi::RhiResult;

use crate::MAX_FRAMES_IN_FLIGHT;
use crate::backend::VulkanBackend;
use crate::scheduler::{FrameScheduler, FrameStatus};

pub struct Renderer {
    scheduler: FrameScheduler<VulkanBackend>,
}

impl Renderer {
    /// Creates the renderer for `window`, drawing `mesh` with `texture`.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while bringing up the device or any
    /// scene resource.
    pub fn new(
        window: &Window,
        config: &RendererConfig,
        texture: &TextureData,
        mesh: &MeshData,
    ) -> RhiResult<Self> {
        let (width, height) = window.framebuffer_size();
        info!("Initializing Vulkan renderer ({}x{})", width, height);

        let backend = VulkanBackend::new(window, config, texture, mesh)?;
        let extent = backend
            .extent()
            .unwrap_or(vk::Extent2D { width, height });

        info!(
            "Renderer initialized: {}x{}, {} frame(s) in flight",
            extent.width, extent.height, MAX_FRAMES_IN_FLIGHT
        );

        Ok(Self {
            scheduler: FrameScheduler::new(backend, extent),
        })
    }

    /// Renders one frame. See [`FrameScheduler::draw_frame`].
    pub fn draw_frame(&mut self, window: &Window, elapsed_secs: f32) -> RhiResult<FrameStatus> {
        self.scheduler.draw_frame(window, elapsed_secs)
    }

    /// Schedules presentation recreation after the next present.
    pub fn notify_resized(&mut self) {
        self.scheduler.notify_resized();
    }

    /// Blocks until the GPU has finished all submitted work.
    pub fn wait_idle(&mut self) -> RhiResult<()> {
        self.scheduler.wait_idle()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.scheduler.extent()
    }

    #[inline]
    pub fn is_suspended(&self) -> bool {
        self.scheduler.is_suspended()
    }

    #[inline]
    pub fn frames_submitted(&self) -> u64 {
        self.scheduler.frames_submitted()
    }

    #[inline]
    pub fn recreations(&self) -> u64 {
        self.scheduler.recreations()
    }
}

