//! Fences as timeline semaphores.

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tracing::debug;

use super::device::VulkanDevice;
use crate::backend::Fence;
use crate::error::{RhiError, RhiResult};

/// A timeline semaphore. The queue signals values, the host reads and waits.
pub struct VulkanFence {
    device: Arc<VulkanDevice>,
    semaphore: vk::Semaphore,
}

impl VulkanFence {
    pub(crate) fn new(device: Arc<VulkanDevice>, initial_value: u64) -> RhiResult<Self> {
        let mut timeline = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut timeline);

        // SAFETY: valid device and create info.
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };
        debug!("Timeline fence created at {}", initial_value);

        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Fence for VulkanFence {
    fn completed_value(&self) -> RhiResult<u64> {
        // SAFETY: the semaphore is a live timeline semaphore of this device.
        let value = unsafe { self.device.handle().get_semaphore_counter_value(self.semaphore)? };
        Ok(value)
    }

    fn wait(&self, value: u64, timeout: Option<Duration>) -> RhiResult<()> {
        let semaphores = [self.semaphore];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);
        let timeout_ns = timeout.map_or(u64::MAX, timeout_nanos);

        // SAFETY: the wait info references locals that outlive the call.
        match unsafe { self.device.handle().wait_semaphores(&wait_info, timeout_ns) } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(RhiError::Timeout(value)),
            Err(e) => Err(e.into()),
        }
    }
}

fn timeout_nanos(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
}

impl Drop for VulkanFence {
    fn drop(&mut self) {
        // SAFETY: owners wait for the fence before dropping it.
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}
