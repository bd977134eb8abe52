use std::sync::Arc;

use tracing::{debug, info};

use super::device::DeviceShared;
use super::timeline::HeadlessQueue;
use super::{Headless, HeadlessWindow};
use crate::backend::{SwapChain, WindowHandle};
use crate::error::{RhiError, RhiResult};
use crate::types::{DisplayMode, Extent2D, ImageHandle, PresentStatus, SwapChainDesc};

/// Swap chain over imaginary back buffers.
///
/// Presenting reports [`PresentStatus::OutOfDate`] when the window's size no
/// longer matches the buffers, mirroring what a compositor would do.
#[derive(Debug)]
pub struct HeadlessSwapChain {
    shared: Arc<DeviceShared>,
    window: HeadlessWindow,
    desc: SwapChainDesc,
    buffers: Vec<u64>,
    current: u32,
    fullscreen: bool,
    presents: u64,
}

impl HeadlessSwapChain {
    pub(crate) fn new(
        shared: Arc<DeviceShared>,
        window: HeadlessWindow,
        desc: SwapChainDesc,
    ) -> RhiResult<Self> {
        validate(&desc)?;
        let buffers = (0..desc.buffer_count).map(|_| shared.next_id()).collect();
        info!(
            "Headless swap chain created: {} x {} buffer(s)",
            desc.extent, desc.buffer_count
        );
        Ok(Self {
            shared,
            window,
            desc,
            buffers,
            current: 0,
            fullscreen: false,
            presents: 0,
        })
    }

    /// Successful presents since creation.
    pub fn present_count(&self) -> u64 {
        self.presents
    }
}

fn validate(desc: &SwapChainDesc) -> RhiResult<()> {
    if desc.extent.is_empty() {
        return Err(RhiError::SwapchainError(format!(
            "cannot create buffers of size {}",
            desc.extent
        )));
    }
    if !(2..=3).contains(&desc.buffer_count) {
        return Err(RhiError::SwapchainError(format!(
            "buffer count must be 2 or 3, got {}",
            desc.buffer_count
        )));
    }
    Ok(())
}

impl SwapChain<Headless> for HeadlessSwapChain {
    fn desc(&self) -> SwapChainDesc {
        self.desc
    }

    fn current_back_buffer_index(&self) -> u32 {
        self.current
    }

    fn back_buffer(&self, index: u32) -> RhiResult<ImageHandle> {
        let raw = self.buffers.get(index as usize).copied().ok_or_else(|| {
            RhiError::InvalidArgument(format!(
                "back buffer {} out of range ({} buffers)",
                index,
                self.buffers.len()
            ))
        })?;
        Ok(ImageHandle {
            raw,
            format: self.desc.format,
            mip_levels: 1,
        })
    }

    fn present(&mut self, _queue: &HeadlessQueue, _sync_interval: u32) -> RhiResult<PresentStatus> {
        self.shared.ensure_alive()?;
        if self.window.inner_extent() != self.desc.extent {
            debug!(
                "Window is {}, buffers are {}: out of date",
                self.window.inner_extent(),
                self.desc.extent
            );
            return Ok(PresentStatus::OutOfDate);
        }
        self.current = (self.current + 1) % self.desc.buffer_count;
        self.presents += 1;
        Ok(PresentStatus::Presented)
    }

    fn resize_buffers(&mut self, buffer_count: u32, extent: Extent2D) -> RhiResult<()> {
        self.shared.ensure_alive()?;
        let desc = SwapChainDesc {
            buffer_count,
            extent,
            ..self.desc
        };
        validate(&desc)?;
        self.buffers = (0..buffer_count).map(|_| self.shared.next_id()).collect();
        self.desc = desc;
        self.current = 0;
        debug!("Headless swap chain resized to {} x {}", extent, buffer_count);
        Ok(())
    }

    fn set_fullscreen_state(
        &mut self,
        window: &HeadlessWindow,
        mode: Option<&DisplayMode>,
    ) -> RhiResult<()> {
        self.shared.ensure_alive()?;
        if let Some(mode) = mode
            && !window.display_modes().contains(mode)
        {
            return Err(RhiError::SwapchainError(format!(
                "display mode {} is not offered by the output",
                mode
            )));
        }
        window.set_fullscreen_mode(mode.copied());
        self.fullscreen = mode.is_some();
        Ok(())
    }

    fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    fn display_modes(&self, window: &HeadlessWindow) -> RhiResult<Vec<DisplayMode>> {
        self.shared.ensure_alive()?;
        Ok(window.display_modes().to_vec())
    }
}
