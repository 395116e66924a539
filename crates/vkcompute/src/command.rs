//! Pre-recorded dispatch command buffer.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error};

use crate::binding::BindingLayout;
use crate::context::Context;
use crate::error::{Result, VkComputeError};
use crate::pipeline::KernelPipeline;

/// Reject a group count of zero or above the device's x-dimension limit.
pub fn check_group_count(group_count: u32, limits: &vk::PhysicalDeviceLimits) -> Result<()> {
    let max = limits.max_compute_work_group_count[0];
    if group_count == 0 || group_count > max {
        return Err(VkComputeError::InvalidGroupCount { group_count, max });
    }
    Ok(())
}

/// A command buffer recorded once and replayed on every submission:
/// bind pipeline, bind descriptor set 0, dispatch `(group_count_x, 1, 1)`.
pub struct CommandSequence {
    ctx: Arc<Context>,
    pipeline: Arc<KernelPipeline>,
    binding: Arc<BindingLayout>,
    group_count_x: u32,
    pool: vk::CommandPool,
    buffer: vk::CommandBuffer,
}

impl CommandSequence {
    pub fn record(
        ctx: &Arc<Context>,
        pipeline: Arc<KernelPipeline>,
        binding: Arc<BindingLayout>,
        group_count_x: u32,
    ) -> Result<Self> {
        check_group_count(group_count_x, ctx.limits()).inspect_err(|e| {
            error!(error = %e, "refusing to record dispatch");
        })?;

        let device = ctx.device();
        let mut sequence = Self {
            ctx: Arc::clone(ctx),
            pipeline,
            binding,
            group_count_x,
            pool: vk::CommandPool::null(),
            buffer: vk::CommandBuffer::null(),
        };

        let pool_info = vk::CommandPoolCreateInfo::default().queue_family_index(ctx.queue_family_index());
        sequence.pool = unsafe { device.create_command_pool(&pool_info, None) }.map_err(|result| {
            error!(%result, "vkCreateCommandPool failed");
            VkComputeError::CommandPoolCreationFailed(result)
        })?;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(sequence.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { device.allocate_command_buffers(&alloc_info) }.map_err(|result| {
            error!(%result, "vkAllocateCommandBuffers failed");
            VkComputeError::CommandAllocationFailed(result)
        })?;
        sequence.buffer = buffers[0];

        let recording_failed = |result: vk::Result| {
            error!(%result, "command buffer recording failed");
            VkComputeError::RecordingFailed(result)
        };
        let begin_info =
            vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE);
        unsafe {
            device
                .begin_command_buffer(sequence.buffer, &begin_info)
                .map_err(recording_failed)?;
            device.cmd_bind_pipeline(
                sequence.buffer,
                vk::PipelineBindPoint::COMPUTE,
                sequence.pipeline.pipeline(),
            );
            device.cmd_bind_descriptor_sets(
                sequence.buffer,
                vk::PipelineBindPoint::COMPUTE,
                sequence.pipeline.layout(),
                0,
                &[sequence.binding.descriptor_set()],
                &[],
            );
            device.cmd_dispatch(sequence.buffer, group_count_x, 1, 1);
            device.end_command_buffer(sequence.buffer).map_err(recording_failed)?;
        }

        debug!(groups = group_count_x, shape = %sequence.pipeline.shape(), "dispatch recorded");
        Ok(sequence)
    }

    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.buffer
    }

    pub fn group_count(&self) -> u32 {
        self.group_count_x
    }

    pub fn pipeline(&self) -> &Arc<KernelPipeline> {
        &self.pipeline
    }

    pub fn binding(&self) -> &Arc<BindingLayout> {
        &self.binding
    }
}

impl Drop for CommandSequence {
    fn drop(&mut self) {
        // Freeing the pool frees its command buffer.
        if self.pool != vk::CommandPool::null() {
            unsafe { self.ctx.device().destroy_command_pool(self.pool, None) };
        }
    }
}

impl std::fmt::Debug for CommandSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSequence")
            .field("group_count_x", &self.group_count_x)
            .field("shape", &self.pipeline.shape())
            .finish_non_exhaustive()
    }
}
