//! Presentation chain plus the render-target views of its back buffers.

use std::sync::Arc;

use tracing::{debug, info};

use gpuframe_rhi::{
    AttachmentView, Backend, DescriptorHeap as _, DescriptorHeapDesc, DescriptorHeapKind,
    Device as _, DisplayMode, Extent2D, Format, ImageHandle, PresentStatus, RhiError, RhiResult,
    SwapChain as _, SwapChainDesc,
};

/// A backend swap chain and a render-target heap with one view per buffer.
///
/// Slot `i` of the heap always views back buffer `i`. Views are rewritten
/// whenever the buffers are recreated.
pub struct SwapChain<B: Backend> {
    // Views are released before the chain that owns the images.
    rtv_heap: B::DescriptorHeap,
    chain: B::SwapChain,
    device: Arc<B::Device>,
}

impl<B: Backend> SwapChain<B> {
    /// Creates the chain for `window` and writes a view of every buffer.
    pub fn new(
        device: &Arc<B::Device>,
        queue: &B::Queue,
        window: &B::Window,
        desc: &SwapChainDesc,
    ) -> RhiResult<Self> {
        let chain = device.create_swap_chain(queue, window, desc)?;
        let rtv_heap = create_rtv_heap::<B>(device, chain.desc().buffer_count)?;

        let mut swap_chain = Self {
            rtv_heap,
            chain,
            device: device.clone(),
        };
        swap_chain.write_views()?;

        info!(
            "Swap chain ready: {} x {} buffer(s), {:?}",
            swap_chain.extent(),
            swap_chain.buffer_count(),
            swap_chain.format()
        );
        Ok(swap_chain)
    }

    fn write_views(&mut self) -> RhiResult<()> {
        let count = self.chain.desc().buffer_count;
        if self.rtv_heap.desc().capacity < count {
            self.rtv_heap = create_rtv_heap::<B>(&self.device, count)?;
        }
        for index in 0..count {
            self.device
                .create_render_target_view(&mut self.rtv_heap, index, &self.chain, index)?;
        }
        Ok(())
    }

    /// View of the buffer the next frame renders into. Re-query after every present.
    pub fn current_back_buffer_view(&self) -> RhiResult<AttachmentView> {
        let index = self.chain.current_back_buffer_index();
        self.rtv_heap.attachment(index).ok_or_else(|| {
            RhiError::Internal(format!("render-target slot {} holds no view", index))
        })
    }

    pub fn current_back_buffer(&self) -> RhiResult<ImageHandle> {
        self.chain.back_buffer(self.chain.current_back_buffer_index())
    }

    #[inline]
    pub fn current_back_buffer_index(&self) -> u32 {
        self.chain.current_back_buffer_index()
    }

    /// Presents the current buffer and advances to the next one.
    pub fn present(&mut self, queue: &B::Queue, sync_interval: u32) -> RhiResult<PresentStatus> {
        self.chain.present(queue, sync_interval)
    }

    /// Recreates the buffers at `extent`. The GPU must be idle.
    pub fn resize(&mut self, buffer_count: u32, extent: Extent2D) -> RhiResult<()> {
        self.rtv_heap.reset();
        self.chain.resize_buffers(buffer_count, extent)?;
        self.write_views()?;
        debug!(
            "Swap chain resized to {} x {} buffer(s)",
            self.extent(),
            self.buffer_count()
        );
        Ok(())
    }

    /// Enters exclusive fullscreen in `mode`, or leaves it for `None`.
    ///
    /// The buffers keep their size; the caller resizes them afterwards.
    pub fn set_fullscreen(&mut self, window: &B::Window, mode: Option<&DisplayMode>) -> RhiResult<()> {
        self.chain.set_fullscreen_state(window, mode)
    }

    #[inline]
    pub fn is_fullscreen(&self) -> bool {
        self.chain.is_fullscreen()
    }

    pub fn display_modes(&self, window: &B::Window) -> RhiResult<Vec<DisplayMode>> {
        self.chain.display_modes(window)
    }

    #[inline]
    pub fn desc(&self) -> SwapChainDesc {
        self.chain.desc()
    }

    #[inline]
    pub fn buffer_count(&self) -> u32 {
        self.chain.desc().buffer_count
    }

    #[inline]
    pub fn extent(&self) -> Extent2D {
        self.chain.desc().extent
    }

    #[inline]
    pub fn format(&self) -> Format {
        self.chain.desc().format
    }

    pub fn rtv_heap(&self) -> &B::DescriptorHeap {
        &self.rtv_heap
    }
}

fn create_rtv_heap<B: Backend>(device: &Arc<B::Device>, capacity: u32) -> RhiResult<B::DescriptorHeap> {
    device.create_descriptor_heap(&DescriptorHeapDesc {
        kind: DescriptorHeapKind::RenderTarget,
        capacity,
        shader_visible: false,
    })
}

/// The largest mode the output offers, preferring the higher refresh rate.
pub fn best_display_mode(modes: &[DisplayMode]) -> Option<DisplayMode> {
    modes.iter().copied().max_by_key(|mode| {
        (
            mode.width as u64 * mode.height as u64,
            mode.refresh_rate_millihertz,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpuframe_rhi::{DeviceDesc, WindowHandle as _};
    use gpuframe_rhi::headless::{Headless, HeadlessWindow};

    fn swap_chain(window: &HeadlessWindow, buffer_count: u32) -> SwapChain<Headless> {
        let device = Headless::create_device(window, &DeviceDesc::default()).unwrap();
        let queue = device.create_command_queue().unwrap();
        SwapChain::new(
            &device,
            &queue,
            window,
            &SwapChainDesc {
                extent: window.inner_extent(),
                buffer_count,
                format: Format::Bgra8Unorm,
                vsync: true,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_every_buffer_has_a_view() {
        let window = HeadlessWindow::new(640, 480);
        let chain = swap_chain(&window, 3);
        assert_eq!(chain.rtv_heap().desc().capacity, 3);
        for slot in 0..3 {
            let view = chain.rtv_heap().attachment(slot).unwrap();
            assert_eq!(view.extent, Extent2D::new(640, 480));
        }
    }

    #[test]
    fn test_present_advances_current_view() {
        let window = HeadlessWindow::new(640, 480);
        let device = Headless::create_device(&window, &DeviceDesc::default()).unwrap();
        let queue = device.create_command_queue().unwrap();
        let mut chain = SwapChain::<Headless>::new(
            &device,
            &queue,
            &window,
            &SwapChainDesc {
                extent: Extent2D::new(640, 480),
                buffer_count: 2,
                format: Format::Bgra8Unorm,
                vsync: false,
            },
        )
        .unwrap();

        let first = chain.current_back_buffer_view().unwrap();
        assert_eq!(chain.present(&queue, 0).unwrap(), PresentStatus::Presented);
        let second = chain.current_back_buffer_view().unwrap();
        assert_ne!(first.image, second.image);
        assert_eq!(chain.present(&queue, 0).unwrap(), PresentStatus::Presented);
        assert_eq!(chain.current_back_buffer_view().unwrap().image, first.image);
    }

    #[test]
    fn test_resize_rewrites_views() {
        let window = HeadlessWindow::new(640, 480);
        let mut chain = swap_chain(&window, 2);
        chain.resize(3, Extent2D::new(800, 600)).unwrap();

        assert_eq!(chain.buffer_count(), 3);
        assert_eq!(chain.rtv_heap().desc().capacity, 3);
        assert_eq!(
            chain.current_back_buffer_view().unwrap().extent,
            Extent2D::new(800, 600)
        );
        assert_eq!(chain.current_back_buffer_index(), 0);
    }

    #[test]
    fn test_best_display_mode() {
        let mode = |width, height, hz: u32| DisplayMode {
            width,
            height,
            refresh_rate_millihertz: hz * 1000,
            format: Format::Bgra8Unorm,
        };
        let modes = [
            mode(1280, 720, 144),
            mode(1920, 1080, 60),
            mode(1920, 1080, 120),
            mode(1600, 900, 60),
        ];
        assert_eq!(best_display_mode(&modes), Some(mode(1920, 1080, 120)));
        assert_eq!(best_display_mode(&[]), None);
    }
}
