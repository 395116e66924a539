//! Synchronous submission to the compute queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ash::vk;
use tracing::{error, trace};

use crate::command::CommandSequence;
use crate::context::Context;
use crate::error::{Result, VkComputeError};

/// Submits recorded sequences and blocks until the queue drains.
#[derive(Debug)]
pub struct Executor {
    ctx: Arc<Context>,
    submissions: AtomicU64,
}

impl Executor {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx, submissions: AtomicU64::new(0) }
    }

    /// Submit `sequence` once and wait for the queue to go idle.
    ///
    /// There is no timeout: a hung kernel blocks the caller.
    pub fn submit_and_wait(&self, sequence: &CommandSequence) -> Result<()> {
        let device = self.ctx.device();
        let queue = self.ctx.queue();
        let buffers = [sequence.command_buffer()];
        let submit = vk::SubmitInfo::default().command_buffers(&buffers);

        unsafe { device.queue_submit(queue, &[submit], vk::Fence::null()) }.map_err(|result| {
            error!(%result, "vkQueueSubmit failed");
            VkComputeError::SubmitFailed(result)
        })?;
        unsafe { device.queue_wait_idle(queue) }.map_err(|result| {
            error!(%result, "vkQueueWaitIdle failed");
            VkComputeError::WaitFailed(result)
        })?;

        let n = self.submissions.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(submission = n, groups = sequence.group_count(), "dispatch complete");
        Ok(())
    }

    /// Completed submissions so far.
    pub fn submissions(&self) -> u64 {
        self.submissions.load(Ordering::Relaxed)
    }
}
