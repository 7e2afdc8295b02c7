//! Vulkan Renderer - Main Entry Point
//!
//! Opens a window, loads the configured model and draws it through the
//! two-subpass renderer, spinning it about the vertical axis.

use std::process::ExitCode;

use anyhow::{Context, Result};
use glam::Mat4;
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowId;

use renderer_core::{FrameClock, RendererConfig};
use renderer_platform::Window;
use renderer_renderer::Renderer;

/// Spin speed of the startup model.
const ROTATION_DEGREES_PER_SEC: f32 = 50.0;

/// Model matrix of the startup model after `elapsed_secs` seconds.
fn spin_transform(elapsed_secs: f32) -> Mat4 {
    Mat4::from_rotation_y((ROTATION_DEGREES_PER_SEC * elapsed_secs).to_radians())
}

struct App {
    config: RendererConfig,
    // Declared before the window so it drops first
    renderer: Option<Renderer>,
    window: Option<Window>,
    model: Option<usize>,
    clock: FrameClock,
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(config: RendererConfig) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            model: None,
            clock: FrameClock::new(),
            failure: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window =
            Window::new(event_loop, &self.config.window).context("Failed to create window")?;
        let mut renderer =
            Renderer::new(&window, &self.config).context("Failed to create renderer")?;

        let model = renderer
            .create_mesh_model(&self.config.model_path)
            .with_context(|| {
                format!("Failed to load model '{}'", self.config.model_path.display())
            })?;

        info!(
            "Initialization complete with {} model(s), entering main loop",
            renderer.model_count()
        );
        self.model = Some(model);
        self.renderer = Some(renderer);
        self.window = Some(window);
        self.clock = FrameClock::new();
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };

        self.clock.tick();
        if let Some(model) = self.model {
            renderer.update_model(model, spin_transform(self.clock.animation_secs()));
        }
        renderer.render_frame().context("Frame failed")?;

        if let Some(window) = &self.window {
            window.request_redraw();
        }
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        error!("{:#}", e);
        self.failure = Some(e);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none()
            && let Err(e) = self.init(event_loop)
        {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn run() -> Result<()> {
    let config = RendererConfig::from_args(std::env::args_os())?;
    info!(
        "Starting Vulkan Renderer: '{}' {}x{}",
        config.window.title, config.window.width, config.window.height
    );

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    // Release GPU objects before reporting
    app.renderer = None;
    match app.failure.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn main() -> ExitCode {
    renderer_core::init_logging();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_spin_starts_at_identity() {
        assert!(spin_transform(0.0).abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }

    #[test]
    fn test_spin_rate() {
        // 50 deg/s for 1.8 s is a quarter turn: +X goes to -Z
        let rotated = spin_transform(1.8).transform_vector3(Vec3::X);
        assert!(rotated.abs_diff_eq(Vec3::NEG_Z, 1e-5));
    }

    #[test]
    fn test_spin_keeps_axis() {
        let rotated = spin_transform(3.7).transform_vector3(Vec3::Y);
        assert!(rotated.abs_diff_eq(Vec3::Y, 1e-6));
    }
}
