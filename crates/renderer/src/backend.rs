//! Vulkan implementation of [`FrameBackend`].
//!
//! [`VulkanBackend`] owns every GPU object the demo scene needs. Objects
//! that outlive a presentation chain (render pass, pipeline, texture, mesh,
//! frame slots) are created once; the [`Presentation`] is torn down and
//! rebuilt whenever the scheduler asks.
//!
//! # Resource Destruction Order
//!
//! 1. Wait for the device to go idle
//! 2. Presentation targets (framebuffers, views, swapchain, attachments)
//! 3. Frame slots (fences, semaphores, uniform buffers)
//! 4. Mesh and texture
//! 5. Descriptor pool and set layout
//! 6. Pipeline, pipeline layout, render pass
//! 7. Command pool and transfer context
//! 8. Device, then surface, then instance
//!
//! `ManuallyDrop` pins this order independently of field order.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use vkforge_core::RendererConfig;
use vkforge_platform::{FramebufferSource, Surface, Window};
use vkforge_resources::{MeshData, TextureData};
use vkforge_rhi::command::CommandPool;
use vkforge_rhi::descriptor::{DescriptorPool, DescriptorSetLayout};
use vkforge_rhi::device::{Device, PRESENTATION_EXTENSIONS};
use vkforge_rhi::instance::Instance;
use vkforge_rhi::physical_device::{SurfaceTarget, select_physical_device};
use vkforge_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use vkforge_rhi::render_pass::RenderPass;
use vkforge_rhi::shader::{Shader, ShaderStage};
use vkforge_rhi::swapchain::{AcquiredImage, SurfaceSupport, choose_surface_format};
use vkforge_rhi::texture::Texture;
use vkforge_rhi::transfer::TransferContext;
use vkforge_rhi::vertex::Vertex;
use vkforge_rhi::{RhiError, RhiResult};

use crate::MAX_FRAMES_IN_FLIGHT;
use crate::frame::FrameSlot;
use crate::mesh::GpuMesh;
use crate::presentation::Presentation;
use crate::scheduler::FrameBackend;
use crate::ubo::UniformBufferObject;

/// Base name of the `<name>.vert.spv` / `<name>.frag.spv` pair.
pub const SHADER_NAME: &str = "textured";

pub struct VulkanBackend {
    presentation: Option<Presentation>,
    frames: Vec<FrameSlot>,
    mesh: ManuallyDrop<GpuMesh>,
    texture: ManuallyDrop<Texture>,
    descriptor_pool: ManuallyDrop<DescriptorPool>,
    descriptor_set_layout: ManuallyDrop<DescriptorSetLayout>,
    pipeline: ManuallyDrop<Pipeline>,
    pipeline_layout: ManuallyDrop<PipelineLayout>,
    render_pass: ManuallyDrop<RenderPass>,
    command_pool: ManuallyDrop<CommandPool>,
    transfer: ManuallyDrop<TransferContext>,
    device: ManuallyDrop<Arc<Device>>,
    surface: ManuallyDrop<Surface>,
    instance: ManuallyDrop<Instance>,
}

impl VulkanBackend {
    /// Brings up the device for `window` and creates every scene resource,
    /// including the first presentation chain.
    ///
    /// # Errors
    ///
    /// Any construction failure is returned; objects created before the
    /// failure are released in reverse order of creation.
    pub fn new(
        window: &Window,
        config: &RendererConfig,
        texture_data: &TextureData,
        mesh_data: &MeshData,
    ) -> RhiResult<Self> {
        let surface_extensions = window
            .required_extensions()
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;
        let instance = Instance::new(config.validation, &surface_extensions)?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;
        let target = SurfaceTarget {
            loader: surface.loader(),
            surface: surface.handle(),
        };

        let physical_device =
            select_physical_device(instance.handle(), Some(&target), PRESENTATION_EXTENSIONS)?;
        let device = Device::new(&instance, &physical_device, config.wait_timeout)?;

        let samples = if config.msaa {
            device.max_sample_count()
        } else {
            vk::SampleCountFlags::TYPE_1
        };
        let support = SurfaceSupport::query(device.physical_device(), &target)?;
        let surface_format = choose_surface_format(&support.formats)?;
        let render_pass = RenderPass::new(
            device.clone(),
            surface_format.format,
            device.depth_format()?,
            samples,
        )?;

        let descriptor_set_layout = DescriptorSetLayout::for_frame(device.clone())?;
        let pipeline_layout =
            PipelineLayout::new(device.clone(), &[descriptor_set_layout.handle()])?;
        let pipeline = {
            let vert = Shader::load(
                device.clone(),
                &config.shader_dir,
                SHADER_NAME,
                ShaderStage::Vertex,
            )?;
            let frag = Shader::load(
                device.clone(),
                &config.shader_dir,
                SHADER_NAME,
                ShaderStage::Fragment,
            )?;
            GraphicsPipelineBuilder::new()
                .vertex_shader(&vert)
                .fragment_shader(&frag)
                .vertex_input(
                    &[Vertex::binding_description()],
                    &Vertex::attribute_descriptions(),
                )
                .rasterization_samples(samples)
                .sample_shading(device.sample_rate_shading())
                .build(device.clone(), &pipeline_layout, &render_pass)?
        };

        let transfer = TransferContext::new(device.clone())?;
        let texture = Texture::from_rgba8(
            &transfer,
            texture_data.pixels(),
            texture_data.width(),
            texture_data.height(),
        )?;
        let mesh = GpuMesh::upload(&transfer, mesh_data)?;

        let command_pool = CommandPool::new(device.clone(), device.graphics_family())?;
        let descriptor_pool =
            DescriptorPool::for_frames(device.clone(), MAX_FRAMES_IN_FLIGHT as u32)?;
        let frames = FrameSlot::create_all(
            &device,
            &command_pool,
            &descriptor_pool,
            &descriptor_set_layout,
            &texture,
        )?;

        let (width, height) = window.framebuffer_size();
        let presentation = Presentation::new(
            &device,
            &target,
            vk::Extent2D { width, height },
            &render_pass,
        )?;

        info!(
            "Vulkan backend initialized: {} frame slot(s), {} indices, {:?}",
            frames.len(),
            mesh.index_count(),
            samples
        );

        Ok(Self {
            presentation: Some(presentation),
            frames,
            mesh: ManuallyDrop::new(mesh),
            texture: ManuallyDrop::new(texture),
            descriptor_pool: ManuallyDrop::new(descriptor_pool),
            descriptor_set_layout: ManuallyDrop::new(descriptor_set_layout),
            pipeline: ManuallyDrop::new(pipeline),
            pipeline_layout: ManuallyDrop::new(pipeline_layout),
            render_pass: ManuallyDrop::new(render_pass),
            command_pool: ManuallyDrop::new(command_pool),
            transfer: ManuallyDrop::new(transfer),
            device: ManuallyDrop::new(device),
            surface: ManuallyDrop::new(surface),
            instance: ManuallyDrop::new(instance),
        })
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Extent of the live presentation chain, if there is one.
    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.presentation.as_ref().map(Presentation::extent)
    }

    fn presentation(&self) -> RhiResult<&Presentation> {
        // A missing chain means the last recreation failed; report it as
        // stale so the scheduler tries again.
        self.presentation.as_ref().ok_or(RhiError::PresentationStale)
    }

    fn slot(&self, slot: usize) -> RhiResult<&FrameSlot> {
        self.frames.get(slot).ok_or_else(|| {
            RhiError::InvalidArgument(format!("frame slot {} out of range", slot))
        })
    }

    fn record(&self, slot: &FrameSlot, image_index: u32) -> RhiResult<()> {
        let presentation = self.presentation()?;
        let framebuffer = presentation.framebuffer(image_index)?;
        let extent = presentation.extent();
        let cmd = slot.command_buffer();

        cmd.reset()?;
        cmd.begin()?;

        let clear_values = self.render_pass.clear_values();
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass.handle())
            .framebuffer(framebuffer.handle())
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);
        cmd.begin_render_pass(&begin_info);

        cmd.bind_pipeline(self.pipeline.bind_point(), self.pipeline.handle());
        cmd.set_viewport(&vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        cmd.set_scissor(&vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        });
        cmd.bind_descriptor_sets(
            self.pipeline.bind_point(),
            self.pipeline_layout.handle(),
            0,
            &[slot.descriptor_set()],
        );
        self.mesh.draw(cmd);

        cmd.end_render_pass();
        cmd.end()
    }
}

impl FrameBackend for VulkanBackend {
    fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()> {
        self.slot(slot)?.sync().in_flight().wait()
    }

    fn acquire_image(&mut self, slot: usize) -> RhiResult<AcquiredImage> {
        let semaphore = self.slot(slot)?.sync().image_acquired();
        self.presentation()?
            .swapchain()
            .acquire_next_image(semaphore)
    }

    fn reset_slot(&mut self, slot: usize) -> RhiResult<()> {
        self.slot(slot)?.sync().in_flight().reset()
    }

    fn update_uniforms(&mut self, slot: usize, elapsed_secs: f32) -> RhiResult<()> {
        let extent = self.presentation()?.extent();
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let ubo = UniformBufferObject::spinning(elapsed_secs, aspect);

        self.frames
            .get_mut(slot)
            .ok_or_else(|| RhiError::InvalidArgument(format!("frame slot {} out of range", slot)))?
            .write_uniforms(&ubo)
    }

    fn record_and_submit(&mut self, slot: usize, image_index: u32) -> RhiResult<()> {
        let frame = self.slot(slot)?;
        self.record(frame, image_index)?;

        let sync = frame.sync();
        let wait_semaphores = [sync.image_acquired()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [frame.command_buffer().handle()];
        let signal_semaphores = [sync.render_finished()];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: the command buffer was just recorded and the fence was
        // reset by the scheduler before recording
        unsafe {
            self.device
                .submit_graphics(&[submit_info], sync.in_flight().handle())?;
        }
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<()> {
        let wait_semaphore = self.slot(slot)?.sync().render_finished();
        self.presentation()?.swapchain().present(
            self.device.present_queue(),
            image_index,
            wait_semaphore,
        )
    }

    fn wait_idle(&mut self) -> RhiResult<()> {
        self.device.wait_idle()
    }

    fn destroy_presentation(&mut self) {
        if let Some(presentation) = self.presentation.take() {
            presentation.destroy();
        }
    }

    fn create_presentation(&mut self, framebuffer: vk::Extent2D) -> RhiResult<vk::Extent2D> {
        debug_assert!(self.presentation.is_none());
        let target = SurfaceTarget {
            loader: self.surface.loader(),
            surface: self.surface.handle(),
        };
        let presentation =
            Presentation::new(&self.device, &target, framebuffer, &self.render_pass)?;
        let extent = presentation.extent();
        self.presentation = Some(presentation);
        debug!("Presentation recreated at {}x{}", extent.width, extent.height);
        Ok(extent)
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during backend drop: {:?}", e);
        }

        self.destroy_presentation();
        self.frames.clear();

        // SAFETY: each field is dropped exactly once and never used again
        unsafe {
            ManuallyDrop::drop(&mut self.mesh);
            ManuallyDrop::drop(&mut self.texture);
            ManuallyDrop::drop(&mut self.descriptor_pool);
            ManuallyDrop::drop(&mut self.descriptor_set_layout);
            ManuallyDrop::drop(&mut self.pipeline);
            ManuallyDrop::drop(&mut self.pipeline_layout);
            ManuallyDrop::drop(&mut self.render_pass);
            ManuallyDrop::drop(&mut self.command_pool);
            ManuallyDrop::drop(&mut self.transfer);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Vulkan backend destroyed");
    }
}
