// =============================================================================
// APPLICATION - window, Vulkan context and the event loop
// =============================================================================
//
// STARTUP (each stage includes the previous ones):
// 1. Instance    window + instance + validation layers + debug messenger
// 2. Swapchain   surface + device + swapchain + image views
// 3. Triangle    render pass + pipeline + framebuffers + commands + sync
//
// SHUTDOWN: close the window -> wait for the GPU -> destroy in reverse order.

use crate::backend::frame::FrameStatus;
use crate::backend::{Surface, Swapchain, TriangleRenderer, VulkanDevice, VulkanInstance};
use crate::config::Config;
use anyhow::{Context as _, Result};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::ActiveEventLoop,
    window::{Window, WindowAttributes, WindowId},
};

/// How far a program takes the initialization sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// Window and instance only
    Instance,
    /// Adds device, surface and swapchain
    Swapchain,
    /// Adds the pipeline and draws every frame
    Triangle,
}

impl Stage {
    pub fn needs_swapchain(self) -> bool {
        self >= Stage::Swapchain
    }

    pub fn draws(self) -> bool {
        self >= Stage::Triangle
    }
}

// =============================================================================
// VULKAN CONTEXT
// =============================================================================

/// Every Vulkan object of one run.
///
/// IMPORTANT: fields are declared in reverse creation order. Rust drops
/// fields top to bottom, which makes teardown the exact mirror of setup.
pub struct VulkanContext {
    renderer: Option<TriangleRenderer>,
    swapchain: Option<Swapchain>,
    device: Option<Arc<VulkanDevice>>,
    surface: Option<Surface>,
    _instance: Arc<VulkanInstance>,
    window: Arc<Window>,
}

impl VulkanContext {
    /// Run the initialization sequence up to `stage`.
    ///
    /// On failure everything created so far is dropped, in reverse order,
    /// before the error is returned.
    pub fn new(window: Arc<Window>, stage: Stage, config: &Config) -> Result<Self> {
        log::info!("Initializing Vulkan ({:?} stage)...", stage);

        let display_handle = window.raw_display_handle();
        let instance = VulkanInstance::new(display_handle, config.validation_enabled())?;

        let mut context = Self {
            renderer: None,
            swapchain: None,
            device: None,
            surface: None,
            _instance: instance.clone(),
            window,
        };

        if !stage.needs_swapchain() {
            return Ok(context);
        }

        let surface = Surface::new(
            instance.clone(),
            display_handle,
            context.window.raw_window_handle(),
        )?;
        let device = VulkanDevice::new(instance, &surface)?;
        context.surface = Some(surface);
        context.device = Some(device.clone());

        let size = context.window.inner_size();
        let surface = context.surface.as_ref().context("Surface not initialized")?;
        let swapchain = Swapchain::new(
            device.clone(),
            surface,
            config.present_mode(),
            size.width,
            size.height,
        )?;

        if stage.draws() {
            let renderer = TriangleRenderer::new(
                device,
                &swapchain,
                &config.shaders,
                config.graphics.clear_color,
            )?;
            context.renderer = Some(renderer);
        }
        context.swapchain = Some(swapchain);

        log::info!("Vulkan initialized successfully!");
        Ok(context)
    }

    /// Draw one frame, if this context has a renderer.
    pub fn draw_frame(&self) -> Result<Option<FrameStatus>> {
        let (Some(renderer), Some(swapchain)) = (&self.renderer, &self.swapchain) else {
            return Ok(None);
        };
        renderer.draw_frame(swapchain).map(Some)
    }

    pub fn window(&self) -> &Window {
        &self.window
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        // Nothing may still be executing when the handles go away
        if let Some(ref device) = self.device {
            if let Err(e) = device.wait_idle() {
                log::error!("{:#}", e);
            }
        }
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

pub struct App {
    stage: Stage,
    config: Config,
    context: Option<VulkanContext>,
    /// First fatal error; ends the event loop
    error: Option<anyhow::Error>,

    /// Set to true when window is minimized (size = 0) - skip rendering
    is_minimized: bool,
    reported_suboptimal: bool,

    // FPS TRACKING
    frames_rendered: u64,
    frame_count: u32,
    last_fps_update: Instant,
    last_frame_time: Instant,
}

impl App {
    pub fn new(stage: Stage, config: Config) -> Self {
        let now = Instant::now();
        Self {
            stage,
            config,
            context: None,
            error: None,
            is_minimized: false,
            reported_suboptimal: false,
            frames_rendered: 0,
            frame_count: 0,
            last_fps_update: now,
            last_frame_time: now,
        }
    }

    /// Tear everything down and hand back the error that stopped the loop, if any.
    pub fn finish(mut self) -> Result<()> {
        drop(self.context.take());
        if self.stage.draws() {
            log::info!("Rendered {} frames", self.frames_rendered);
        }
        log::info!("Cleanup complete");

        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        if self.error.is_none() {
            self.error = Some(error);
        }
        event_loop.exit();
    }

    fn window_attributes(&self) -> WindowAttributes {
        Window::default_attributes()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(self.config.window.resizable)
    }

    fn render_frame(&mut self) -> Result<bool> {
        if self.is_minimized {
            return Ok(false);
        }
        let Some(context) = self.context.as_ref() else {
            return Ok(false);
        };

        let status = match context.draw_frame() {
            Ok(Some(status)) => status,
            Ok(None) => return Ok(false),
            Err(e) => {
                let out_of_date = e
                    .downcast_ref::<crate::error::VkError>()
                    .is_some_and(|vk| vk.is_out_of_date());
                if out_of_date {
                    return Err(e.context("Swapchain out of date and recreation is not supported"));
                }
                return Err(e);
            }
        };

        if status.suboptimal && !self.reported_suboptimal {
            log::warn!("Swapchain is suboptimal for the surface; continuing");
            self.reported_suboptimal = true;
        }
        Ok(true)
    }

    fn update_fps(&mut self) {
        self.frames_rendered += 1;
        if !self.config.debug.show_fps {
            return;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_count += 1;

        // Update title every second
        let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
        if elapsed >= 1.0 {
            let fps = self.frame_count as f32 / elapsed;

            if let Some(ref context) = self.context {
                context.window().set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms)",
                    self.config.window.title,
                    fps,
                    frame_time * 1000.0
                ));
            }

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.context.is_some() || self.error.is_some() {
            return;
        }

        let window = match event_loop.create_window(self.window_attributes()) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.fail(event_loop, anyhow::anyhow!("Failed to create window: {}", e));
                return;
            }
        };

        match VulkanContext::new(window, self.stage, &self.config) {
            Ok(context) => self.context = Some(context),
            Err(e) => self.fail(event_loop, e.context("Failed to initialize Vulkan")),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.is_minimized = size.width == 0 || size.height == 0;
            }

            WindowEvent::RedrawRequested => match self.render_frame() {
                Ok(true) => self.update_fps(),
                Ok(false) => {}
                Err(e) => self.fail(event_loop, e),
            },

            _ => {}
        }
    }

    /// Keep redrawing as fast as presentation allows.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if !self.stage.draws() {
            return;
        }
        if let Some(ref context) = self.context {
            context.window().request_redraw();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_build_on_each_other() {
        assert!(!Stage::Instance.needs_swapchain());
        assert!(!Stage::Instance.draws());
        assert!(Stage::Swapchain.needs_swapchain());
        assert!(!Stage::Swapchain.draws());
        assert!(Stage::Triangle.needs_swapchain());
        assert!(Stage::Triangle.draws());
    }

    #[test]
    fn window_matches_config() {
        let app = App::new(Stage::Instance, Config::default());
        let attributes = app.window_attributes();
        assert_eq!(attributes.title, "Vulkan window");
        assert!(!attributes.resizable);
        assert_eq!(
            attributes.inner_size,
            Some(winit::dpi::PhysicalSize::new(800u32, 600u32).into())
        );
    }

    #[test]
    fn finish_without_error_is_ok() {
        let app = App::new(Stage::Triangle, Config::default());
        assert!(app.finish().is_ok());
    }
}
