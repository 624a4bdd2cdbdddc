//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate.
//! It handles:
//! - Instance creation and physical device selection
//! - Logical device, queues and the memory allocator
//! - Buffers, images and the staging transfer path
//! - Swapchain management
//! - Render pass, pipeline and descriptor creation
//! - Synchronization primitives with bounded waits

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod layout;
pub mod memory;
pub mod mipmap;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod transfer;
pub mod vertex;

pub use error::{RhiError, RhiResult, SuitabilityError};

// Re-export ash types that users might need
pub use ash::vk;
