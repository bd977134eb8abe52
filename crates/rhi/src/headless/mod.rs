//! Software backend without a GPU.
//!
//! The headless backend implements every RHI trait in memory. Its queue owns
//! a worker thread standing in for the GPU timeline: submitted command lists
//! are "executed" there after a configurable latency, fences advance only
//! when the worker reaches their signal, and every executed command is kept
//! in a log that tests can inspect.
//!
//! Beyond the traits it offers a few test hooks:
//! - [`HeadlessDevice::set_gpu_latency`] to make the GPU lag behind the CPU
//! - [`HeadlessDevice::simulate_device_loss`] to exercise the fatal path
//! - [`HeadlessDevice::executed_lists`] to read what the GPU consumed
//! - [`HeadlessBuffer::read`] for buffer readback
//! - [`HeadlessWindow::resize`] to make the next present report out-of-date

mod command;
mod descriptor;
mod device;
mod resources;
mod swapchain;
mod timeline;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{Backend, WindowHandle};
use crate::error::RhiResult;
use crate::types::{DeviceDesc, DisplayMode, Extent2D, Format};

pub use command::{ExecutedList, HeadlessCommand, HeadlessCommandAllocator, HeadlessCommandList};
pub use descriptor::{HeadlessDescriptor, HeadlessDescriptorHeap};
pub use device::HeadlessDevice;
pub use resources::{
    HeadlessBuffer, HeadlessPipelineState, HeadlessRootSignature, HeadlessShader, HeadlessTexture,
};
pub use swapchain::HeadlessSwapChain;
pub use timeline::{HeadlessFence, HeadlessQueue};

/// Marker type selecting the headless implementation.
#[derive(Debug)]
pub enum Headless {}

impl Backend for Headless {
    const NAME: &'static str = "headless";

    type Window = HeadlessWindow;
    type Device = HeadlessDevice;
    type Queue = HeadlessQueue;
    type CommandAllocator = HeadlessCommandAllocator;
    type CommandList = HeadlessCommandList;
    type Fence = HeadlessFence;
    type DescriptorHeap = HeadlessDescriptorHeap;
    type Buffer = HeadlessBuffer;
    type Texture = HeadlessTexture;
    type SwapChain = HeadlessSwapChain;
    type Shader = HeadlessShader;
    type RootSignature = HeadlessRootSignature;
    type PipelineState = HeadlessPipelineState;

    fn create_device(_window: &HeadlessWindow, desc: &DeviceDesc) -> RhiResult<Arc<HeadlessDevice>> {
        Ok(HeadlessDevice::new(desc))
    }
}

#[derive(Debug)]
struct WindowState {
    windowed_extent: Extent2D,
    fullscreen: Option<DisplayMode>,
}

/// An imaginary window with a size and a monitor offering display modes.
#[derive(Clone, Debug)]
pub struct HeadlessWindow {
    state: Arc<Mutex<WindowState>>,
    display_modes: Arc<Vec<DisplayMode>>,
}

impl HeadlessWindow {
    /// A window on a monitor offering the common 16:9 modes at 60 Hz.
    pub fn new(width: u32, height: u32) -> Self {
        let modes = [(1280, 720), (1600, 900), (1920, 1080), (2560, 1440)]
            .into_iter()
            .map(|(width, height)| DisplayMode {
                width,
                height,
                refresh_rate_millihertz: 60_000,
                format: Format::Bgra8Unorm,
            })
            .collect();
        Self::with_display_modes(width, height, modes)
    }

    pub fn with_display_modes(width: u32, height: u32, display_modes: Vec<DisplayMode>) -> Self {
        Self {
            state: Arc::new(Mutex::new(WindowState {
                windowed_extent: Extent2D::new(width, height),
                fullscreen: None,
            })),
            display_modes: Arc::new(display_modes),
        }
    }

    /// Changes the windowed size behind the renderer's back, as a user drag would.
    pub fn resize(&self, width: u32, height: u32) {
        self.state.lock().windowed_extent = Extent2D::new(width, height);
    }

    pub fn display_modes(&self) -> &[DisplayMode] {
        &self.display_modes
    }

    pub fn fullscreen_mode(&self) -> Option<DisplayMode> {
        self.state.lock().fullscreen
    }

    pub(crate) fn set_fullscreen_mode(&self, mode: Option<DisplayMode>) {
        self.state.lock().fullscreen = mode;
    }
}

impl WindowHandle for HeadlessWindow {
    fn inner_extent(&self) -> Extent2D {
        let state = self.state.lock();
        match state.fullscreen {
            Some(mode) => mode.extent(),
            None => state.windowed_extent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_extent_follows_fullscreen() {
        let window = HeadlessWindow::new(800, 600);
        assert_eq!(window.inner_extent(), Extent2D::new(800, 600));

        let mode = window.display_modes()[2];
        window.set_fullscreen_mode(Some(mode));
        assert_eq!(window.inner_extent(), Extent2D::new(1920, 1080));

        window.set_fullscreen_mode(None);
        assert_eq!(window.inner_extent(), Extent2D::new(800, 600));
    }

    #[test]
    fn test_window_clones_share_state() {
        let window = HeadlessWindow::new(800, 600);
        let clone = window.clone();
        clone.resize(1024, 768);
        assert_eq!(window.inner_extent(), Extent2D::new(1024, 768));
    }
}
