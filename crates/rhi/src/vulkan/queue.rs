use std::sync::Arc;

use ash::vk;
use parking_lot::Mutex;
use tracing::trace;

use super::Vulkan;
use super::command::VulkanCommandList;
use super::device::VulkanDevice;
use super::sync::VulkanFence;
use crate::backend::{CommandList as _, CommandQueue};
use crate::error::{RhiError, RhiResult};

/// The graphics queue. Submissions are serialized by an internal lock since
/// Vulkan requires external synchronization of queue access.
pub struct VulkanQueue {
    device: Arc<VulkanDevice>,
    submit_lock: Mutex<()>,
}

impl VulkanQueue {
    pub(crate) fn new(device: Arc<VulkanDevice>) -> Self {
        Self {
            device,
            submit_lock: Mutex::new(()),
        }
    }

    /// Submits one batch to the graphics queue.
    pub(crate) fn submit(&self, submit: &vk::SubmitInfo<'_>) -> RhiResult<()> {
        let _guard = self.submit_lock.lock();
        // SAFETY: queue access is serialized by `submit_lock`; the submit info
        // references data owned by the caller for the duration of the call.
        unsafe {
            self.device.handle().queue_submit(
                self.device.graphics_queue(),
                std::slice::from_ref(submit),
                vk::Fence::null(),
            )?;
        }
        Ok(())
    }

    /// Runs `f` with exclusive access to the queues.
    pub(crate) fn with_queue_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.submit_lock.lock();
        f()
    }
}

impl CommandQueue<Vulkan> for VulkanQueue {
    fn execute_command_lists(&self, lists: &[&VulkanCommandList]) -> RhiResult<()> {
        if let Some(open) = lists.iter().find(|list| !list.is_closed()) {
            return Err(RhiError::InvalidArgument(format!(
                "command buffer {:?} submitted while open",
                open.handle()
            )));
        }

        let buffers: Vec<vk::CommandBuffer> = lists.iter().map(|list| list.handle()).collect();
        self.submit(&vk::SubmitInfo::default().command_buffers(&buffers))?;
        trace!("Submitted {} command list(s)", buffers.len());
        Ok(())
    }

    fn signal(&self, fence: &VulkanFence, value: u64) -> RhiResult<()> {
        let semaphores = [fence.handle()];
        let values = [value];
        let mut timeline = vk::TimelineSemaphoreSubmitInfo::default().signal_semaphore_values(&values);
        let submit = vk::SubmitInfo::default()
            .signal_semaphores(&semaphores)
            .push_next(&mut timeline);
        self.submit(&submit)?;
        trace!("Queued fence signal {}", value);
        Ok(())
    }
}
