//! Frame loop and scene rendering.
//!
//! This crate drives the GPU once per redraw:
//! - [`FrameScheduler`] orders wait, acquire, record, submit and present
//!   over [`MAX_FRAMES_IN_FLIGHT`] slots and owns the recreation policy
//! - [`VulkanBackend`] implements that protocol against real Vulkan objects
//! - [`Renderer`] ties the two together for the application

mod backend;
mod frame;
mod mesh;
mod presentation;
mod renderer;
pub mod scheduler;
pub mod ubo;

pub use backend::{SHADER_NAME, VulkanBackend};
pub use mesh::GpuMesh;
pub use presentation::Presentation;
pub use renderer::Renderer;
pub use scheduler::{FrameBackend, FrameScheduler, FrameStatus};
pub use ubo::UniformBufferObject;

/// Maximum number of frames that can be in flight simultaneously.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
