//! Descriptor set layout, pool and set exposing a [`ResourceSet`] to shaders.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error};

use crate::context::Context;
use crate::error::{Result, VkComputeError};
use crate::resource::ResourceSet;

/// Storage-buffer bindings `0..n` for one resource set.
///
/// The layout keeps its resource set alive. Binding a different set needs a
/// new `BindingLayout`.
pub struct BindingLayout {
    ctx: Arc<Context>,
    resources: Arc<ResourceSet>,
    set_layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    set: vk::DescriptorSet,
}

/// Layout bindings for `count` storage buffers visible to the compute stage.
pub fn storage_bindings(count: u32) -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
    (0..count)
        .map(|binding| {
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::COMPUTE)
        })
        .collect()
}

impl BindingLayout {
    pub fn build(ctx: &Arc<Context>, resources: Arc<ResourceSet>) -> Result<Self> {
        let device = ctx.device();
        let count = resources.len() as u32;
        let mut layout = Self {
            ctx: Arc::clone(ctx),
            resources,
            set_layout: vk::DescriptorSetLayout::null(),
            pool: vk::DescriptorPool::null(),
            set: vk::DescriptorSet::null(),
        };

        let bindings = storage_bindings(count);
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        layout.set_layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }
            .map_err(|result| {
                error!(%result, "vkCreateDescriptorSetLayout failed");
                VkComputeError::LayoutCreationFailed(result)
            })?;

        let pool_sizes = [vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::STORAGE_BUFFER)
            .descriptor_count(count)];
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(1)
            .pool_sizes(&pool_sizes);
        layout.pool = unsafe { device.create_descriptor_pool(&pool_info, None) }.map_err(|result| {
            error!(%result, "vkCreateDescriptorPool failed");
            VkComputeError::PoolCreationFailed(result)
        })?;

        let set_layouts = [layout.set_layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(layout.pool)
            .set_layouts(&set_layouts);
        let sets = unsafe { device.allocate_descriptor_sets(&alloc_info) }.map_err(|result| {
            error!(%result, "vkAllocateDescriptorSets failed");
            match result {
                vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL => {
                    VkComputeError::PoolExhausted
                }
                other => VkComputeError::SetAllocationFailed(other),
            }
        })?;
        layout.set = sets[0];

        let buffer_infos: Vec<[vk::DescriptorBufferInfo; 1]> = layout
            .resources
            .iter()
            .map(|r| {
                [vk::DescriptorBufferInfo::default()
                    .buffer(r.buffer())
                    .offset(0)
                    .range(vk::WHOLE_SIZE)]
            })
            .collect();
        let writes: Vec<vk::WriteDescriptorSet<'_>> = buffer_infos
            .iter()
            .enumerate()
            .map(|(binding, info)| {
                vk::WriteDescriptorSet::default()
                    .dst_set(layout.set)
                    .dst_binding(binding as u32)
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .buffer_info(info)
            })
            .collect();
        unsafe { device.update_descriptor_sets(&writes, &[]) };

        debug!(
            bindings = count,
            resource_set = layout.resources.id(),
            "descriptor set written"
        );
        Ok(layout)
    }

    /// Fail with `BindingMismatch` unless this layout was built for `set`.
    pub fn ensure_bound_to(&self, set: &ResourceSet) -> Result<()> {
        if set.id() == self.resources.id() {
            Ok(())
        } else {
            Err(VkComputeError::BindingMismatch { bound: self.resources.id(), given: set.id() })
        }
    }

    pub fn resources(&self) -> &Arc<ResourceSet> {
        &self.resources
    }

    pub fn set_layout(&self) -> vk::DescriptorSetLayout {
        self.set_layout
    }

    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.set
    }
}

impl Drop for BindingLayout {
    fn drop(&mut self) {
        let device = self.ctx.device();
        // Destroying the pool frees the set allocated from it.
        unsafe {
            if self.pool != vk::DescriptorPool::null() {
                device.destroy_descriptor_pool(self.pool, None);
            }
            if self.set_layout != vk::DescriptorSetLayout::null() {
                device.destroy_descriptor_set_layout(self.set_layout, None);
            }
        }
    }
}

impl std::fmt::Debug for BindingLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingLayout")
            .field("resource_set", &self.resources.id())
            .field("bindings", &self.resources.len())
            .finish_non_exhaustive()
    }
}
