//! Platform layer for the Vulkan renderer.
//!
//! - Window management via winit
//! - Resize and close signals polled once per frame
//! - Surface creation via ash-window

mod window;

pub use window::{FramebufferSource, Surface, Window, WindowSignals};

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
