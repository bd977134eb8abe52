//! Frame slots and their synchronization bookkeeping.
//!
//! The renderer implements the "frames in flight" pattern:
//!
//! 1. While the GPU executes frame N, the CPU records frame N+1
//! 2. Each slot has its own command allocator and constant buffer element
//! 3. A slot is reused only once the fence reaches the value recorded when
//!    its last command list was submitted
//!
//! ```text
//! slot 0: [record N  ][submit]............[wait N   ][record N+2]...
//! slot 1:             [record N+1][submit]............[wait N+1 ]...
//! ```

use std::sync::Arc;

use tracing::debug;

use gpuframe_rhi::{Backend, CommandAllocator as _, Device as _, RhiResult};

/// Per-slot resources: the command allocator backing the slot's command
/// list, and the fence value that marks the slot's last submission.
pub struct FrameContext<B: Backend> {
    allocator: B::CommandAllocator,
    fence_value: u64,
}

impl<B: Backend> FrameContext<B> {
    fn new(device: &Arc<B::Device>) -> RhiResult<Self> {
        Ok(Self {
            allocator: device.create_command_allocator()?,
            fence_value: 0,
        })
    }

    pub fn allocator(&self) -> &B::CommandAllocator {
        &self.allocator
    }

    /// Fence value of the slot's last submission; 0 if never submitted.
    pub fn fence_value(&self) -> u64 {
        self.fence_value
    }

    pub(crate) fn set_fence_value(&mut self, value: u64) {
        self.fence_value = value;
    }

    /// Reclaims the allocator. The slot's fence value must have completed.
    pub(crate) fn reset_allocator(&mut self) -> RhiResult<()> {
        self.allocator.reset()
    }
}

/// Ring of frame slots.
pub struct FrameManager<B: Backend> {
    frames: Vec<FrameContext<B>>,
    current: usize,
}

impl<B: Backend> FrameManager<B> {
    /// Creates `frames_in_flight` slots.
    ///
    /// # Errors
    ///
    /// Returns an error if a command allocator cannot be created.
    pub fn new(device: &Arc<B::Device>, frames_in_flight: usize) -> RhiResult<Self> {
        let frames = (0..frames_in_flight.max(1))
            .map(|_| FrameContext::new(device))
            .collect::<RhiResult<Vec<_>>>()?;
        debug!("Created {} frame slot(s)", frames.len());
        Ok(Self { frames, current: 0 })
    }

    #[inline]
    pub fn current(&self) -> &FrameContext<B> {
        &self.frames[self.current]
    }

    #[inline]
    pub fn current_mut(&mut self) -> &mut FrameContext<B> {
        &mut self.frames[self.current]
    }

    #[inline]
    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    /// Moves to the next slot and returns it.
    pub fn advance(&mut self) -> &FrameContext<B> {
        self.current = (self.current + 1) % self.frames.len();
        &self.frames[self.current]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpuframe_rhi::DeviceDesc;
    use gpuframe_rhi::headless::{Headless, HeadlessWindow};

    fn device() -> Arc<<Headless as Backend>::Device> {
        Headless::create_device(&HeadlessWindow::new(64, 64), &DeviceDesc::default()).unwrap()
    }

    #[test]
    fn test_ring_wraps() {
        let mut frames = FrameManager::<Headless>::new(&device(), 3).unwrap();
        assert_eq!(frames.frames_in_flight(), 3);
        let visited: Vec<usize> = (0..6)
            .map(|_| {
                frames.advance();
                frames.current_index()
            })
            .collect();
        assert_eq!(visited, vec![1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_slots_track_their_own_fence_values() {
        let mut frames = FrameManager::<Headless>::new(&device(), 2).unwrap();
        frames.current_mut().set_fence_value(1);
        frames.advance();
        assert_eq!(frames.current().fence_value(), 0);
        frames.current_mut().set_fence_value(2);
        frames.advance();
        assert_eq!(frames.current().fence_value(), 1);
    }

    #[test]
    fn test_zero_slots_is_clamped() {
        let frames = FrameManager::<Headless>::new(&device(), 0).unwrap();
        assert_eq!(frames.frames_in_flight(), 1);
    }
}
