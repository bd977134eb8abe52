//! The simulated GPU timeline: a queue backed by a worker thread, and fences
//! the worker advances.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use super::Headless;
use super::command::{AllocatorState, ExecutedList, HeadlessCommandList, Recorded};
use super::device::DeviceShared;
use crate::backend::{CommandList as _, CommandQueue, Fence};
use crate::error::{RhiError, RhiResult};

/// How often a blocked fence wait re-checks for device loss.
const LOSS_POLL_INTERVAL: Duration = Duration::from_millis(5);

enum Submission {
    Execute {
        list: u64,
        commands: Vec<Recorded>,
        allocator: Arc<AllocatorState>,
    },
    Signal {
        fence: Arc<FenceState>,
        value: u64,
    },
}

/// Queue whose submissions run on a dedicated worker thread, in order.
pub struct HeadlessQueue {
    shared: Arc<DeviceShared>,
    sender: Option<Sender<Submission>>,
    worker: Option<JoinHandle<()>>,
}

impl HeadlessQueue {
    pub(crate) fn new(shared: Arc<DeviceShared>) -> RhiResult<Self> {
        let (sender, receiver) = crossbeam::channel::unbounded();
        let worker_shared = shared.clone();
        let worker = std::thread::Builder::new()
            .name("gpuframe-headless-gpu".to_string())
            .spawn(move || run_gpu(receiver, worker_shared))
            .map_err(|e| RhiError::Internal(format!("failed to start GPU worker: {}", e)))?;

        debug!("Headless command queue created");

        Ok(Self {
            shared,
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    fn submit(&self, submission: Submission) -> RhiResult<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| RhiError::Internal("queue is shutting down".to_string()))?;
        self.shared.begin_submission();
        sender.send(submission).map_err(|_| {
            self.shared.finish_submission();
            RhiError::Internal("GPU worker has exited".to_string())
        })
    }
}

impl CommandQueue<Headless> for HeadlessQueue {
    fn execute_command_lists(&self, lists: &[&HeadlessCommandList]) -> RhiResult<()> {
        self.shared.ensure_alive()?;
        if let Some(open) = lists.iter().find(|list| !list.is_closed()) {
            return Err(RhiError::InvalidArgument(format!(
                "command list {} submitted while open",
                open.id()
            )));
        }

        for list in lists {
            let allocator = list.allocator_state().clone();
            allocator.submitted();
            self.submit(Submission::Execute {
                list: list.id(),
                commands: list.recorded().to_vec(),
                allocator,
            })?;
        }
        Ok(())
    }

    fn signal(&self, fence: &HeadlessFence, value: u64) -> RhiResult<()> {
        self.shared.ensure_alive()?;
        self.submit(Submission::Signal {
            fence: fence.state.clone(),
            value,
        })
    }
}

impl Drop for HeadlessQueue {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain what is queued, then exit.
        self.sender.take();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::error!("Headless GPU worker panicked");
        }
        debug!("Headless command queue destroyed");
    }
}

fn run_gpu(receiver: Receiver<Submission>, shared: Arc<DeviceShared>) {
    for submission in receiver.iter() {
        if !shared.is_lost() {
            match submission {
                Submission::Execute {
                    list,
                    commands,
                    allocator,
                } => {
                    let latency = shared.latency();
                    if !latency.is_zero() {
                        std::thread::sleep(latency);
                    }
                    let commands = commands.into_iter().map(Recorded::resolve).collect();
                    shared.record_executed(ExecutedList { list, commands });
                    allocator.retired();
                    trace!("Executed command list {}", list);
                }
                Submission::Signal { fence, value } => {
                    fence.complete(value);
                    trace!("Fence reached {}", value);
                }
            }
        }
        shared.finish_submission();
    }
}

#[derive(Debug)]
pub(crate) struct FenceState {
    completed: Mutex<u64>,
    reached: Condvar,
}

impl FenceState {
    fn complete(&self, value: u64) {
        let mut completed = self.completed.lock();
        if value > *completed {
            *completed = value;
        }
        self.reached.notify_all();
    }
}

/// Fence advanced by the GPU worker.
#[derive(Debug)]
pub struct HeadlessFence {
    state: Arc<FenceState>,
    shared: Arc<DeviceShared>,
}

impl HeadlessFence {
    pub(crate) fn new(shared: Arc<DeviceShared>, initial_value: u64) -> Self {
        Self {
            state: Arc::new(FenceState {
                completed: Mutex::new(initial_value),
                reached: Condvar::new(),
            }),
            shared,
        }
    }
}

impl Fence for HeadlessFence {
    fn completed_value(&self) -> RhiResult<u64> {
        self.shared.ensure_alive()?;
        Ok(*self.state.completed.lock())
    }

    fn wait(&self, value: u64, timeout: Option<Duration>) -> RhiResult<()> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut completed = self.state.completed.lock();
        while *completed < value {
            self.shared.ensure_alive()?;
            let slice = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(RhiError::Timeout(value));
                    }
                    (deadline - now).min(LOSS_POLL_INTERVAL)
                }
                None => LOSS_POLL_INTERVAL,
            };
            self.state.reached.wait_for(&mut completed, slice);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CommandAllocator as _, Device as _};
    use crate::headless::HeadlessDevice;
    use crate::types::DeviceDesc;

    #[test]
    fn test_signal_advances_fence() {
        let device = HeadlessDevice::new(&DeviceDesc::default());
        let queue = device.create_command_queue().unwrap();
        let fence = device.create_fence(0).unwrap();

        queue.signal(&fence, 3).unwrap();
        fence.wait(3, Some(Duration::from_secs(5))).unwrap();
        assert_eq!(fence.completed_value().unwrap(), 3);
    }

    #[test]
    fn test_fence_never_goes_backwards() {
        let device = HeadlessDevice::new(&DeviceDesc::default());
        let queue = device.create_command_queue().unwrap();
        let fence = device.create_fence(0).unwrap();

        queue.signal(&fence, 5).unwrap();
        queue.signal(&fence, 2).unwrap();
        device.wait_idle().unwrap();
        assert_eq!(fence.completed_value().unwrap(), 5);
    }

    #[test]
    fn test_wait_times_out_while_gpu_is_busy() {
        let device = HeadlessDevice::new(&DeviceDesc::default());
        device.set_gpu_latency(Duration::from_millis(200));
        let queue = device.create_command_queue().unwrap();
        let fence = device.create_fence(0).unwrap();
        let allocator = device.create_command_allocator().unwrap();
        let mut list = device.create_command_list(&allocator).unwrap();
        list.reset(&allocator).unwrap();
        list.close().unwrap();

        queue.execute_command_lists(&[&list]).unwrap();
        queue.signal(&fence, 1).unwrap();

        let result = fence.wait(1, Some(Duration::from_millis(10)));
        assert!(matches!(result, Err(RhiError::Timeout(1))));
        fence.wait(1, None).unwrap();
    }

    #[test]
    fn test_open_list_is_rejected() {
        let device = HeadlessDevice::new(&DeviceDesc::default());
        let queue = device.create_command_queue().unwrap();
        let allocator = device.create_command_allocator().unwrap();
        let mut list = device.create_command_list(&allocator).unwrap();
        list.reset(&allocator).unwrap();

        let result = queue.execute_command_lists(&[&list]);
        assert!(matches!(result, Err(RhiError::InvalidArgument(_))));
    }

    #[test]
    fn test_allocator_reset_after_fence_completes() {
        let device = HeadlessDevice::new(&DeviceDesc::default());
        device.set_gpu_latency(Duration::from_millis(50));
        let queue = device.create_command_queue().unwrap();
        let fence = device.create_fence(0).unwrap();
        let mut allocator = device.create_command_allocator().unwrap();
        let mut list = device.create_command_list(&allocator).unwrap();
        list.reset(&allocator).unwrap();
        list.close().unwrap();

        queue.execute_command_lists(&[&list]).unwrap();
        queue.signal(&fence, 1).unwrap();
        assert!(allocator.reset().is_err());

        fence.wait(1, None).unwrap();
        assert!(allocator.reset().is_ok());
    }

    #[test]
    fn test_device_loss_fails_waits() {
        let device = HeadlessDevice::new(&DeviceDesc::default());
        let queue = device.create_command_queue().unwrap();
        let fence = device.create_fence(0).unwrap();

        device.simulate_device_loss();
        assert!(matches!(queue.signal(&fence, 1), Err(RhiError::DeviceLost)));
        assert!(matches!(fence.wait(1, None), Err(RhiError::DeviceLost)));
        assert!(matches!(fence.completed_value(), Err(RhiError::DeviceLost)));
    }
}
