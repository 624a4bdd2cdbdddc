//! Window management using winit.
//!
//! The window is the renderer's only view of the outside world: it reports
//! the framebuffer size, whether a resize happened since the last frame,
//! and whether the user asked to close it.

use std::ffi::{CStr, c_char};
use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use vkforge_core::{Error, RendererConfig, Result};

/// Anything that can report the current framebuffer size in pixels.
///
/// A minimized window reports `(0, 0)`.
pub trait FramebufferSource {
    fn framebuffer_size(&self) -> (u32, u32);
}

/// RAII wrapper for a Vulkan surface.
///
/// The instance the surface was created from must outlive it.
pub struct Surface {
    handle: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
}

impl Surface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Loader for capability, format and present mode queries.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: created by ash_window::create_surface from the loader's instance
        unsafe {
            self.surface_loader.destroy_surface(self.handle, None);
        }
        tracing::debug!("Vulkan surface destroyed");
    }
}

/// Resize and close notifications accumulated between frames.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WindowSignals {
    resized: bool,
    close_requested: bool,
    size: (u32, u32),
}

impl WindowSignals {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            ..Default::default()
        }
    }

    /// Records a window event. Returns `true` if the event was relevant.
    pub fn record(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::Resized(size) => {
                self.resize(size.width, size.height);
                true
            }
            WindowEvent::CloseRequested => {
                self.close_requested = true;
                true
            }
            _ => false,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        self.resized = true;
    }

    /// Returns and clears the resize flag.
    pub fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }

    #[inline]
    pub fn close_requested(&self) -> bool {
        self.close_requested
    }

    #[inline]
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Zero width or height, as reported while minimized.
    #[inline]
    pub fn is_zero_area(&self) -> bool {
        self.size.0 == 0 || self.size.1 == 0
    }
}

/// A winit window with the signals the renderer polls every frame.
pub struct Window {
    window: Arc<WinitWindow>,
    signals: WindowSignals,
}

impl Window {
    /// Creates a resizable window from the configured title and size.
    pub fn new(event_loop: &ActiveEventLoop, config: &RendererConfig) -> Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(config.title.as_str())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(true);

        let window = event_loop
            .create_window(attrs)
            .map_err(|e| Error::Window(e.to_string()))?;

        let size = window.inner_size();
        tracing::info!(
            "Window created: {}x{} (framebuffer {}x{})",
            config.width,
            config.height,
            size.width,
            size.height
        );

        Ok(Self {
            window: Arc::new(window),
            signals: WindowSignals::new(size.width, size.height),
        })
    }

    /// Feeds a window event into the signals.
    pub fn handle_event(&mut self, event: &WindowEvent) -> bool {
        let relevant = self.signals.record(event);
        if let WindowEvent::Resized(size) = event {
            tracing::debug!("Window resized: {}x{}", size.width, size.height);
        }
        relevant
    }

    /// Returns and clears the resize flag.
    pub fn take_resized(&mut self) -> bool {
        self.signals.take_resized()
    }

    pub fn close_requested(&self) -> bool {
        self.signals.close_requested()
    }

    pub fn is_minimized(&self) -> bool {
        self.signals.is_zero_area()
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Instance extensions needed to create a surface for this window.
    pub fn required_extensions(&self) -> Result<Vec<*const c_char>> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Surface(format!("Failed to get display handle: {}", e)))?;

        let extensions = ash_window::enumerate_required_extensions(display_handle.as_raw())
            .map_err(|e| Error::Surface(format!("Failed to enumerate extensions: {}", e)))?;

        tracing::debug!(
            "Required surface extensions: {:?}",
            extensions
                .iter()
                // SAFETY: ash_window returns static, null-terminated names
                .map(|&ext| unsafe { CStr::from_ptr(ext) })
                .collect::<Vec<_>>()
        );

        Ok(extensions.to_vec())
    }

    /// Creates a Vulkan surface for this window.
    ///
    /// `instance` must have been created with [`Self::required_extensions`]
    /// enabled and must outlive the returned [`Surface`].
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Surface(format!("Failed to get display handle: {}", e)))?;
        let window_handle = self
            .window
            .window_handle()
            .map_err(|e| Error::Surface(format!("Failed to get window handle: {}", e)))?;

        // SAFETY: both handles come from a live winit window
        let handle = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| Error::Surface(format!("vkCreateSurfaceKHR failed: {}", e)))?
        };

        tracing::info!("Vulkan surface created");

        Ok(Surface {
            handle,
            surface_loader: ash::khr::surface::Instance::new(entry, instance),
        })
    }
}

impl FramebufferSource for Window {
    fn framebuffer_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }
}

#[cfg(test)]
mod tests {
    use winit::event::WindowEvent;

    use super::*;

    #[test]
    fn test_resize_flag_is_taken_once() {
        let mut signals = WindowSignals::new(800, 600);
        assert!(!signals.take_resized());

        assert!(signals.record(&WindowEvent::Resized(PhysicalSize::new(1024, 768))));
        assert_eq!(signals.size(), (1024, 768));
        assert!(signals.take_resized());
        assert!(!signals.take_resized());
    }

    #[test]
    fn test_close_request() {
        let mut signals = WindowSignals::new(800, 600);
        assert!(!signals.close_requested());
        assert!(signals.record(&WindowEvent::CloseRequested));
        assert!(signals.close_requested());
    }

    #[test]
    fn test_zero_area_while_minimized() {
        let mut signals = WindowSignals::new(800, 600);
        assert!(!signals.is_zero_area());

        signals.resize(0, 0);
        assert!(signals.is_zero_area());
        signals.resize(640, 0);
        assert!(signals.is_zero_area());
        signals.resize(640, 480);
        assert!(!signals.is_zero_area());
    }

    #[test]
    fn test_unrelated_events_are_ignored() {
        let mut signals = WindowSignals::new(800, 600);
        assert!(!signals.record(&WindowEvent::Focused(true)));
        assert!(!signals.take_resized());
        assert!(!signals.close_requested());
    }
}
