//! vkforge - spinning textured quads on Vulkan.
//!
//! Configuration comes from `VKFORGE_*` environment variables; see
//! [`RendererConfig`].

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};
use winit::application::ApplicationHandler;
use winit::window::WindowId;

use vkforge_core::{FrameTimer, RendererConfig};
use vkforge_platform::{ActiveEventLoop, ControlFlow, EventLoop, Window, WindowEvent};
use vkforge_renderer::{FrameStatus, Renderer};
use vkforge_resources::{MeshData, TextureData};

/// Checkerboard used when no texture is configured.
const FALLBACK_TEXTURE_SIZE: u32 = 256;
const FALLBACK_TEXTURE_CELL: u32 = 32;

struct App {
    config: RendererConfig,
    texture: TextureData,
    mesh: MeshData,
    // Dropped before the window it renders into
    renderer: Option<Renderer>,
    window: Option<Window>,
    timer: FrameTimer,
}

impl App {
    fn new(config: RendererConfig) -> Result<Self> {
        let texture = match &config.texture {
            Some(path) => TextureData::load(path)
                .with_context(|| format!("Failed to load texture {:?}", path))?,
            None => {
                info!("No texture configured, using checkerboard");
                TextureData::checkerboard(FALLBACK_TEXTURE_SIZE, FALLBACK_TEXTURE_CELL)
            }
        };

        Ok(Self {
            config,
            texture,
            mesh: MeshData::textured_quads(),
            renderer: None,
            window: None,
            timer: FrameTimer::new(),
        })
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(event_loop, &self.config).context("Failed to create window")?;
        let renderer = Renderer::new(&window, &self.config, &self.texture, &self.mesh)
            .context("Failed to create renderer")?;

        info!("Initialization complete, entering main loop");
        window.request_redraw();
        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(window), Some(renderer)) = (self.window.as_mut(), self.renderer.as_mut()) else {
            return;
        };

        if window.take_resized() {
            renderer.notify_resized();
        }

        match renderer.draw_frame(window, self.timer.elapsed_secs()) {
            Ok(FrameStatus::Suspended) => {
                debug!("Framebuffer has zero area, waiting for events");
                event_loop.set_control_flow(ControlFlow::Wait);
                return;
            }
            Ok(FrameStatus::Recreated) => {
                let extent = renderer.extent();
                info!("Presentation recreated at {}x{}", extent.width, extent.height);
            }
            Ok(FrameStatus::Rendered) => {
                self.timer.tick();
                if let Some(fps) = self.timer.take_fps() {
                    debug!("{:.1} fps ({} frames submitted)", fps, renderer.frames_submitted());
                }
            }
            Err(e) => {
                error!("Fatal render error: {}", e);
                event_loop.exit();
                return;
            }
        }

        event_loop.set_control_flow(ControlFlow::Poll);
        window.request_redraw();
    }

    fn shutdown(&mut self) {
        if let Some(mut renderer) = self.renderer.take() {
            if let Err(e) = renderer.wait_idle() {
                warn!("Device did not go idle before shutdown: {}", e);
            }
            info!(
                "Rendered {} frame(s), {} presentation recreation(s)",
                renderer.frames_submitted(),
                renderer.recreations()
            );
        }
        self.window = None;
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            error!("{:#}", e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(window) = self.window.as_mut() else {
            return;
        };

        window.handle_event(&event);
        if window.close_requested() {
            info!("Close requested, shutting down");
            self.shutdown();
            event_loop.exit();
            return;
        }

        match event {
            WindowEvent::Resized(_) if !window.is_minimized() => {
                // Leave Wait mode so the pending recreation gets a chance to run
                event_loop.set_control_flow(ControlFlow::Poll);
                window.request_redraw();
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

fn main() -> Result<()> {
    vkforge_core::init_logging();
    info!("Starting vkforge");

    let config = RendererConfig::from_env().context("Invalid configuration")?;
    debug!("{:?}", config);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config)?;
    event_loop.run_app(&mut app)?;

    Ok(())
}
