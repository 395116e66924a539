//! One-call assembly of a runnable compute pipeline.
//!
//! ```no_run
//! use vkcompute::{Context, DispatchShape, EngineConfig, KernelBinary, PipelineInstance, ResourceUsage};
//!
//! # fn main() -> vkcompute::Result<()> {
//! let ctx = Context::open(&EngineConfig::default())?;
//! let mut sum = PipelineInstance::builder(ctx)
//!     .resource(8, ResourceUsage::Input)
//!     .resource(8, ResourceUsage::Input)
//!     .resource(8, ResourceUsage::Output)
//!     .kernel(KernelBinary::from_path("sum.spv")?)
//!     .shape(DispatchShape::linear(8)?)
//!     .build()?;
//! let a: Vec<f32> = (0..8).map(|i| i as f32).collect();
//! let b: Vec<f32> = (0..8).map(|i| (8 - i) as f32).collect();
//! let out = sum.run(&[(0, a.as_slice()), (1, b.as_slice())], &[2])?;
//! assert_eq!(out[0], vec![8.0; 8]);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tracing::{debug, info};

use crate::binding::BindingLayout;
use crate::command::{CommandSequence, check_group_count};
use crate::context::Context;
use crate::dispatch::{DispatchShape, DivisibilityPolicy, group_count};
use crate::error::{Result, VkComputeError};
use crate::executor::Executor;
use crate::kernel::KernelBinary;
use crate::memory::MemoryAllocator;
use crate::pipeline::KernelPipeline;
use crate::resource::{ResourceDecl, ResourceSet, ResourceUsage};

/// Number of work items to cover: the explicit value, or the largest slot.
///
/// An explicit count may not exceed the largest slot.
pub fn resolve_work_items(decls: &[ResourceDecl], explicit: Option<u32>) -> Result<u32> {
    let largest = decls.iter().map(|d| d.elements).max().ok_or(VkComputeError::EmptyResourceSet)?;
    if let Some(n) = explicit {
        if n as usize > largest {
            return Err(VkComputeError::WorkItemsExceedResources { work_items: n, max: largest });
        }
        return Ok(n);
    }
    u32::try_from(largest).map_err(|_| {
        VkComputeError::InvalidConfig(format!("{largest} work items do not fit a 32-bit dispatch"))
    })
}

/// Collects resources, kernel and shape for [`PipelineInstance`].
#[derive(Debug)]
#[must_use]
pub struct PipelineInstanceBuilder {
    ctx: Arc<Context>,
    decls: Vec<ResourceDecl>,
    kernel: Option<KernelBinary>,
    shape: Option<DispatchShape>,
    work_items: Option<u32>,
    policy: DivisibilityPolicy,
}

impl PipelineInstanceBuilder {
    /// Append a slot. Slots bind in the order they are added.
    pub fn resource(mut self, elements: usize, usage: ResourceUsage) -> Self {
        self.decls.push(ResourceDecl::new(elements, usage));
        self
    }

    pub fn resources(mut self, decls: impl IntoIterator<Item = ResourceDecl>) -> Self {
        self.decls.extend(decls);
        self
    }

    pub fn kernel(mut self, kernel: KernelBinary) -> Self {
        self.kernel = Some(kernel);
        self
    }

    pub fn shape(mut self, shape: DispatchShape) -> Self {
        self.shape = Some(shape);
        self
    }

    /// Override the number of work items. Defaults to the largest slot.
    pub fn work_items(mut self, n: u32) -> Self {
        self.work_items = Some(n);
        self
    }

    pub fn divisibility(mut self, policy: DivisibilityPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Validate the request, then create every device object.
    ///
    /// Usage errors are reported before anything is allocated. A device
    /// failure part-way releases whatever was already created.
    pub fn build(self) -> Result<PipelineInstance> {
        let kernel = self.kernel.ok_or(VkComputeError::MissingBuilderField("kernel"))?;
        let shape = self.shape.ok_or(VkComputeError::MissingBuilderField("shape"))?;
        shape.validate()?;
        shape.check_limits(self.ctx.limits())?;
        if self.decls.is_empty() {
            return Err(VkComputeError::EmptyResourceSet);
        }
        let work_items = resolve_work_items(&self.decls, self.work_items)?;
        let groups = group_count(work_items, &shape, self.policy)?;
        check_group_count(groups, self.ctx.limits())?;

        let ctx = self.ctx;
        let allocator = MemoryAllocator::new(&ctx)?;
        let resources = Arc::new(ResourceSet::create(&ctx, &allocator, &self.decls)?);
        let binding = Arc::new(BindingLayout::build(&ctx, Arc::clone(&resources))?);
        let pipeline = Arc::new(KernelPipeline::build(&ctx, &binding, &kernel, shape)?);
        let sequence = CommandSequence::record(&ctx, pipeline, binding, groups)?;
        let executor = Executor::new(Arc::clone(&ctx));

        info!(
            slots = resources.len(),
            %shape,
            work_items,
            groups,
            policy = ?self.policy,
            "pipeline instance built"
        );
        Ok(PipelineInstance { resources, sequence, executor, shape, work_items, policy: self.policy })
    }
}

/// A ready-to-run kernel with its resources and recorded dispatch.
///
/// Host writes and reads happen between submissions; each submission waits
/// for the queue to drain before returning.
#[derive(Debug)]
pub struct PipelineInstance {
    // Field order is drop order: commands before the bindings they use.
    sequence: CommandSequence,
    executor: Executor,
    resources: Arc<ResourceSet>,
    shape: DispatchShape,
    work_items: u32,
    policy: DivisibilityPolicy,
}

impl PipelineInstance {
    pub fn builder(ctx: Arc<Context>) -> PipelineInstanceBuilder {
        PipelineInstanceBuilder {
            ctx,
            decls: Vec::new(),
            kernel: None,
            shape: None,
            work_items: None,
            policy: DivisibilityPolicy::default(),
        }
    }

    pub fn write(&mut self, slot: usize, data: &[f32]) -> Result<()> {
        self.resources.write_host_to_slot(slot, data)
    }

    pub fn read(&self, slot: usize) -> Result<Vec<f32>> {
        self.resources.read_slot_to_host(slot)
    }

    pub fn read_into(&self, slot: usize, out: &mut [f32]) -> Result<()> {
        self.resources.read_slot_into(slot, out)
    }

    /// Replay the recorded dispatch once and wait for it.
    pub fn submit(&mut self) -> Result<()> {
        self.executor.submit_and_wait(&self.sequence)
    }

    /// Write every `(slot, data)` pair, submit once, then read `outputs` in
    /// the order given.
    pub fn run(&mut self, inputs: &[(usize, &[f32])], outputs: &[usize]) -> Result<Vec<Vec<f32>>> {
        for (slot, data) in inputs {
            self.write(*slot, data)?;
        }
        self.submit()?;
        let results = outputs.iter().map(|&slot| self.read(slot)).collect::<Result<Vec<_>>>()?;
        debug!(inputs = inputs.len(), outputs = outputs.len(), "run complete");
        Ok(results)
    }

    pub fn resources(&self) -> &ResourceSet {
        &self.resources
    }

    pub fn shape(&self) -> DispatchShape {
        self.shape
    }

    pub fn group_count(&self) -> u32 {
        self.sequence.group_count()
    }

    pub fn work_items(&self) -> u32 {
        self.work_items
    }

    pub fn policy(&self) -> DivisibilityPolicy {
        self.policy
    }

    pub fn submissions(&self) -> u64 {
        self.executor.submissions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_items_default_to_largest_slot() {
        let decls = [
            ResourceDecl::new(33, ResourceUsage::Input),
            ResourceDecl::new(33, ResourceUsage::Output),
            ResourceDecl::new(16, ResourceUsage::Storage),
        ];
        assert_eq!(resolve_work_items(&decls, None).unwrap(), 33);
        assert_eq!(resolve_work_items(&decls, Some(32)).unwrap(), 32);
    }

    #[test]
    fn explicit_work_items_cannot_exceed_largest_slot() {
        let decls = [ResourceDecl::new(8, ResourceUsage::Input), ResourceDecl::new(8, ResourceUsage::Output)];
        let err = resolve_work_items(&decls, Some(64)).unwrap_err();
        assert!(matches!(err, VkComputeError::WorkItemsExceedResources { work_items: 64, max: 8 }));
        assert!(err.is_usage_error());
        assert_eq!(resolve_work_items(&decls, Some(8)).unwrap(), 8);
    }

    #[test]
    fn work_items_need_a_slot() {
        assert!(matches!(resolve_work_items(&[], None), Err(VkComputeError::EmptyResourceSet)));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn oversized_slot_is_usage_error() {
        let decls = [ResourceDecl::new(u32::MAX as usize + 1, ResourceUsage::Input)];
        assert!(resolve_work_items(&decls, None).unwrap_err().is_usage_error());
    }
}
