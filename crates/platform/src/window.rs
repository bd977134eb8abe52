//! Window management using winit.
//!
//! This module provides window creation, Vulkan surface creation and the
//! monitor queries behind display mode enumeration and exclusive fullscreen.

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::monitor::VideoModeHandle;
use winit::window::{Fullscreen, Window as WinitWindow, WindowAttributes};

use gpuframe_core::{Error, Result};

/// RAII wrapper for a Vulkan surface.
///
/// This struct owns a `vk::SurfaceKHR` handle and ensures it is properly destroyed
/// when dropped. The caller must ensure that the Vulkan instance outlives this surface.
pub struct Surface {
    handle: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
}

impl Surface {
    /// Get the raw Vulkan surface handle.
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Get a reference to the surface loader.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: the handle was created by ash_window::create_surface from the same
        // instance as the loader and is destroyed only here.
        unsafe {
            self.surface_loader.destroy_surface(self.handle, None);
        }
        tracing::debug!("Vulkan surface destroyed");
    }
}

/// A video mode reported by the monitor the window currently sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoMode {
    pub width: u32,
    pub height: u32,
    pub refresh_rate_millihertz: u32,
    pub bit_depth: u16,
}

impl From<&VideoModeHandle> for VideoMode {
    fn from(handle: &VideoModeHandle) -> Self {
        let size = handle.size();
        Self {
            width: size.width,
            height: size.height,
            refresh_rate_millihertz: handle.refresh_rate_millihertz(),
            bit_depth: handle.bit_depth(),
        }
    }
}

/// Cheaply clonable handle to a winit window.
///
/// The renderer keeps one clone; the application keeps another to drive the
/// event loop. Neither creates nor destroys the window on the other's behalf.
#[derive(Clone)]
pub struct Window {
    window: Arc<WinitWindow>,
}

impl Window {
    /// Create a new window with the given dimensions and title.
    pub fn new(event_loop: &ActiveEventLoop, width: u32, height: u32, title: &str) -> Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(true);

        let window = event_loop
            .create_window(attrs)
            .map_err(|e| Error::Window(e.to_string()))?;

        tracing::info!("Window created: {}x{}", width, height);

        Ok(Self {
            window: Arc::new(window),
        })
    }

    /// Get a reference to the underlying winit window.
    pub fn inner(&self) -> &WinitWindow {
        &self.window
    }

    /// Current client area size in physical pixels.
    pub fn inner_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    /// Request a redraw of the window.
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Video modes of the monitor the window is on, queried now.
    ///
    /// Returns an empty list when the platform cannot tell which monitor
    /// hosts the window.
    pub fn video_modes(&self) -> Vec<VideoMode> {
        self.window
            .current_monitor()
            .map(|monitor| monitor.video_modes().map(|m| VideoMode::from(&m)).collect())
            .unwrap_or_default()
    }

    /// Enters exclusive fullscreen with the monitor mode matching `mode`,
    /// or returns to windowed mode when `mode` is `None`.
    pub fn set_exclusive_fullscreen(&self, mode: Option<&VideoMode>) -> Result<()> {
        let Some(mode) = mode else {
            self.window.set_fullscreen(None);
            tracing::info!("Left exclusive fullscreen");
            return Ok(());
        };

        let monitor = self
            .window
            .current_monitor()
            .ok_or_else(|| Error::Window("window is not on any monitor".to_string()))?;
        let handle = monitor
            .video_modes()
            .find(|candidate| VideoMode::from(candidate) == *mode)
            .ok_or_else(|| {
                Error::Window(format!(
                    "video mode {}x{}@{}mHz not offered by the current monitor",
                    mode.width, mode.height, mode.refresh_rate_millihertz
                ))
            })?;

        self.window.set_fullscreen(Some(Fullscreen::Exclusive(handle)));
        tracing::info!(
            "Entered exclusive fullscreen {}x{}@{}mHz",
            mode.width,
            mode.height,
            mode.refresh_rate_millihertz
        );
        Ok(())
    }

    /// Whether the window is currently fullscreen.
    pub fn is_fullscreen(&self) -> bool {
        self.window.fullscreen().is_some()
    }

    /// Instance extensions needed to create a surface for this window.
    ///
    /// The returned pointers reference static strings owned by the Vulkan loader.
    pub fn required_extensions(&self) -> Result<Vec<*const std::ffi::c_char>> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {}", e)))?;

        let extensions = ash_window::enumerate_required_extensions(display_handle.as_raw())
            .map_err(|e| Error::Surface(format!("Failed to enumerate required extensions: {}", e)))?;

        tracing::debug!("Window requires {} surface extension(s)", extensions.len());

        Ok(extensions.to_vec())
    }

    /// Create a Vulkan surface for this window.
    ///
    /// # Errors
    /// Returns an error if the window or display handle is unavailable or
    /// surface creation fails.
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {}", e)))?;

        let window_handle = self
            .window
            .window_handle()
            .map_err(|e| Error::Window(format!("Failed to get window handle: {}", e)))?;

        // SAFETY: entry and instance are valid for the duration of the call and the
        // raw handles come from a live winit window. The surface is destroyed in Drop.
        let handle = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| Error::Surface(format!("Failed to create Vulkan surface: {}", e)))?
        };

        let surface_loader = ash::khr::surface::Instance::new(entry, instance);

        tracing::info!("Vulkan surface created successfully");

        Ok(Surface {
            handle,
            surface_loader,
        })
    }
}
