//! Compute pipeline specialized for one dispatch shape.

use std::mem::size_of;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use crate::binding::BindingLayout;
use crate::context::Context;
use crate::dispatch::DispatchShape;
use crate::error::{Result, VkComputeError};
use crate::kernel::KernelBinary;

/// Kernel entry point name.
pub const ENTRY_POINT: &std::ffi::CStr = c"main";

/// Specialization map entries for constant IDs 0, 1 and 2, laid out as three
/// consecutive `u32` values.
pub fn specialization_entries() -> [vk::SpecializationMapEntry; 3] {
    let word = size_of::<u32>();
    [0u32, 1, 2].map(|id| vk::SpecializationMapEntry {
        constant_id: id,
        offset: id * word as u32,
        size: word,
    })
}

/// Shader module, pipeline layout and compute pipeline for one kernel.
pub struct KernelPipeline {
    ctx: Arc<Context>,
    shape: DispatchShape,
    module: vk::ShaderModule,
    layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
}

impl KernelPipeline {
    /// Build a pipeline whose layout wraps `binding`'s set layout and whose
    /// workgroup size is `shape`.
    pub fn build(
        ctx: &Arc<Context>,
        binding: &BindingLayout,
        kernel: &KernelBinary,
        shape: DispatchShape,
    ) -> Result<Self> {
        shape.validate()?;
        shape.check_limits(ctx.limits()).inspect_err(|e| {
            error!(error = %e, %shape, "dispatch shape rejected");
        })?;

        let device = ctx.device();
        let mut built = Self {
            ctx: Arc::clone(ctx),
            shape,
            module: vk::ShaderModule::null(),
            layout: vk::PipelineLayout::null(),
            pipeline: vk::Pipeline::null(),
        };

        let module_info = vk::ShaderModuleCreateInfo::default().code(kernel.words());
        built.module = unsafe { device.create_shader_module(&module_info, None) }.map_err(|result| {
            error!(%result, "vkCreateShaderModule failed");
            VkComputeError::ShaderModuleInvalid(result.to_string())
        })?;
        debug!(words = kernel.words().len(), "shader module created");

        let set_layouts = [binding.set_layout()];
        let layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        built.layout = unsafe { device.create_pipeline_layout(&layout_info, None) }.map_err(|result| {
            error!(%result, "vkCreatePipelineLayout failed");
            VkComputeError::PipelineCreationFailed { stage: "pipeline layout", result }
        })?;

        let entries = specialization_entries();
        let data = shape.specialization_data();
        let specialization = vk::SpecializationInfo::default()
            .map_entries(&entries)
            .data(bytemuck::cast_slice(&data));
        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(built.module)
            .name(ENTRY_POINT)
            .specialization_info(&specialization);
        let pipeline_info = vk::ComputePipelineCreateInfo::default()
            .stage(stage)
            .layout(built.layout);

        let pipelines = unsafe {
            device.create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_, result)| {
            error!(%result, "vkCreateComputePipelines failed");
            VkComputeError::PipelineCreationFailed { stage: "compute pipeline", result }
        })?;
        built.pipeline = pipelines[0];

        info!(%shape, "compute pipeline ready");
        Ok(built)
    }

    pub fn shape(&self) -> DispatchShape {
        self.shape
    }

    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for KernelPipeline {
    fn drop(&mut self) {
        let device = self.ctx.device();
        unsafe {
            if self.pipeline != vk::Pipeline::null() {
                device.destroy_pipeline(self.pipeline, None);
            }
            if self.layout != vk::PipelineLayout::null() {
                device.destroy_pipeline_layout(self.layout, None);
            }
            if self.module != vk::ShaderModule::null() {
                device.destroy_shader_module(self.module, None);
            }
        }
    }
}

impl std::fmt::Debug for KernelPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelPipeline").field("shape", &self.shape).finish_non_exhaustive()
    }
}
