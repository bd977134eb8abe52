//! gpuframe - windowed driver
//!
//! Opens a window, initializes a Vulkan renderer and draws a rotating cube
//! through the frame protocol. F11 toggles exclusive fullscreen.
//!
//! Usage: `gpuframe [config.toml]`. Without an argument, `gpuframe.toml` in
//! the working directory is used when present.

mod geometry;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glam::Vec3;
use tracing::{debug, error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowId;

use gpuframe_core::{RendererConfig, Timer};
use gpuframe_platform::Window;
use gpuframe_renderer::{DrawableAsset, PassConstants, Renderer, RendererResult};
use gpuframe_rhi::Extent2D;
use gpuframe_rhi::vulkan::Vulkan;

const WINDOW_WIDTH: u32 = 1280;
const WINDOW_HEIGHT: u32 = 720;
const DEFAULT_CONFIG_FILE: &str = "gpuframe.toml";

const CAMERA_DISTANCE: f32 = 4.0;
const CAMERA_HEIGHT: f32 = 1.5;
/// Camera orbit speed in radians per second.
const ORBIT_SPEED: f32 = 0.6;

struct App {
    config: RendererConfig,
    // Dropped before the renderer so its buffers go first.
    cube: Option<DrawableAsset<Vulkan>>,
    renderer: Option<Renderer<Vulkan>>,
    window: Option<Window>,
    timer: Timer,
}

impl App {
    fn new(config: RendererConfig) -> Self {
        Self {
            config,
            cube: None,
            renderer: None,
            window: None,
            timer: Timer::new(),
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(event_loop, WINDOW_WIDTH, WINDOW_HEIGHT, "gpuframe")
            .context("Failed to create window")?;
        let (width, height) = window.inner_size();
        let renderer =
            Renderer::<Vulkan>::init(window.clone(), width, height, self.config.clone())
                .context("Failed to initialize renderer")?;
        info!("Rendering on {}", renderer.adapter_info().name);

        let (vertices, indices) = geometry::cube(1.5);
        let cube = DrawableAsset::from_geometry(renderer.device(), &vertices, &indices)
            .context("Failed to upload cube geometry")?;

        self.cube = Some(cube);
        self.renderer = Some(renderer);
        self.window = Some(window);
        self.timer.reset();
        Ok(())
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.cube = None;
        self.renderer = None;
        event_loop.exit();
    }

    fn render(&mut self) -> RendererResult<()> {
        let (Some(renderer), Some(cube)) = (self.renderer.as_mut(), self.cube.as_ref()) else {
            return Ok(());
        };

        self.timer.tick();
        let angle = self.timer.total_secs() * ORBIT_SPEED;
        let eye = Vec3::new(
            angle.cos() * CAMERA_DISTANCE,
            CAMERA_HEIGHT,
            angle.sin() * CAMERA_DISTANCE,
        );
        let constants = PassConstants::look_at(
            eye,
            Vec3::ZERO,
            std::f32::consts::FRAC_PI_4,
            renderer.extent(),
            0.1,
            100.0,
        )
        .with_time(self.timer.total_secs(), self.timer.delta_secs());

        renderer.new_frame()?;
        renderer.update_pass_constants(&constants)?;
        cube.record_draw(renderer.command_list()?)?;
        renderer.execute_command_list()?;
        renderer.end_frame()
    }

    fn toggle_full_screen(&mut self) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        let target = !renderer.is_full_screen();
        if target {
            for mode in renderer.display_modes().into_iter().flatten() {
                debug!("Display mode {:?}", mode);
            }
        }
        match renderer.set_full_screen(target) {
            Ok(()) => info!("Fullscreen {}", if target { "on" } else { "off" }),
            Err(e) => error!("Failed to change fullscreen state: {}", e),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            error!("{:#}", e);
            event_loop.exit();
        } else {
            info!("Initialization complete, entering main loop");
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                self.shutdown(event_loop);
            }
            WindowEvent::Resized(size) => {
                // Minimized windows report 0x0; keep the old targets until restored.
                if size.width == 0 || size.height == 0 {
                    return;
                }
                if let Some(renderer) = self.renderer.as_mut()
                    && renderer.extent() != Extent2D::new(size.width, size.height)
                    && let Err(e) = renderer.set_size(size.width, size.height)
                {
                    error!("Resize to {}x{} failed: {}", size.width, size.height, e);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => match key {
                KeyCode::Escape => self.shutdown(event_loop),
                KeyCode::F11 => self.toggle_full_screen(),
                _ => {}
            },
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.render() {
                    if e.is_device_lost() {
                        error!("{}; exiting", e);
                        self.shutdown(event_loop);
                    } else {
                        warn!("Frame failed: {}", e);
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

fn load_config() -> Result<RendererConfig> {
    let path = match std::env::args_os().nth(1) {
        Some(arg) => PathBuf::from(arg),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => PathBuf::from(DEFAULT_CONFIG_FILE),
        None => return Ok(RendererConfig::default()),
    };
    let config = RendererConfig::load(&path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

fn main() -> Result<()> {
    gpuframe_core::init_logging();
    info!("Starting gpuframe");

    let config = load_config()?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
