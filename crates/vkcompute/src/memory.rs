//! Host-visible, host-coherent device memory.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use crate::context::Context;
use crate::error::{Result, VkComputeError};

/// Property flags every allocation must carry so the host can map it without
/// explicit flushes.
pub const REQUIRED_MEMORY_FLAGS: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

/// Index of the first memory type that is both host-visible and host-coherent.
pub fn select_memory_kind(properties: &vk::PhysicalDeviceMemoryProperties) -> Option<u32> {
    for (i, memory_type) in properties.memory_types_as_slice().iter().enumerate() {
        debug!(
            index = i,
            heap = memory_type.heap_index,
            flags = ?memory_type.property_flags,
            "memory type"
        );
        if memory_type.property_flags.contains(REQUIRED_MEMORY_FLAGS) {
            return Some(i as u32);
        }
    }
    None
}

/// Check that `kind` is one of the types allowed by a buffer's
/// `memory_type_bits`.
pub fn ensure_kind_permitted(kind: u32, type_bits: u32) -> Result<()> {
    if kind < 32 && type_bits & (1 << kind) != 0 {
        Ok(())
    } else {
        Err(VkComputeError::MemoryKindNotPermitted { kind, type_bits })
    }
}

/// Allocates and binds one memory block per buffer from the selected kind.
#[derive(Debug, Clone)]
pub struct MemoryAllocator {
    ctx: Arc<Context>,
    kind: u32,
}

impl MemoryAllocator {
    /// Select the memory kind for `ctx`. Fails with `NoSuitableMemory` when
    /// the device offers no host-visible coherent memory.
    pub fn new(ctx: &Arc<Context>) -> Result<Self> {
        let kind = select_memory_kind(ctx.memory_properties()).ok_or_else(|| {
            error!(device = %ctx.device_name(), "no host-visible coherent memory type");
            VkComputeError::NoSuitableMemory
        })?;
        info!(kind, "selected memory type");
        Ok(Self { ctx: Arc::clone(ctx), kind })
    }

    /// The memory type index used for every allocation.
    pub fn kind(&self) -> u32 {
        self.kind
    }

    /// Allocate exactly what `buffer` requires and bind it at offset 0.
    ///
    /// On bind failure the allocation is freed before returning. The buffer
    /// itself stays owned by the caller.
    pub fn allocate_and_bind(&self, buffer: vk::Buffer, element_count: usize) -> Result<vk::DeviceMemory> {
        let device = self.ctx.device();
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        ensure_kind_permitted(self.kind, requirements.memory_type_bits).inspect_err(|e| {
            error!(error = %e, "buffer cannot use the selected memory type");
        })?;

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(self.kind);
        let memory = unsafe { device.allocate_memory(&alloc_info, None) }.map_err(|result| {
            error!(%result, bytes = requirements.size, "vkAllocateMemory failed");
            VkComputeError::AllocationFailed { bytes: requirements.size, result }
        })?;

        if let Err(result) = unsafe { device.bind_buffer_memory(buffer, memory, 0) } {
            error!(%result, "vkBindBufferMemory failed");
            unsafe { device.free_memory(memory, None) };
            return Err(VkComputeError::BindFailed(result));
        }

        debug!(
            elements = element_count,
            bytes = requirements.size,
            alignment = requirements.alignment,
            "allocated and bound buffer memory"
        );
        Ok(memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (slot, f) in props.memory_types.iter_mut().zip(flags) {
            slot.property_flags = *f;
        }
        props
    }

    #[test]
    fn picks_first_visible_coherent_type() {
        let p = props(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL
                | vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);
        assert_eq!(select_memory_kind(&p), Some(2));
    }

    #[test]
    fn extra_flags_do_not_disqualify() {
        let p = props(&[vk::MemoryPropertyFlags::DEVICE_LOCAL
            | vk::MemoryPropertyFlags::HOST_VISIBLE
            | vk::MemoryPropertyFlags::HOST_COHERENT
            | vk::MemoryPropertyFlags::HOST_CACHED]);
        assert_eq!(select_memory_kind(&p), Some(0));
    }

    #[test]
    fn none_without_coherent_memory() {
        let p = props(&[vk::MemoryPropertyFlags::HOST_VISIBLE, vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        assert_eq!(select_memory_kind(&p), None);
        assert_eq!(select_memory_kind(&vk::PhysicalDeviceMemoryProperties::default()), None);
    }

    #[test]
    fn kind_must_be_in_type_bits() {
        assert!(ensure_kind_permitted(2, 0b0100).is_ok());
        let err = ensure_kind_permitted(1, 0b0100).unwrap_err();
        assert!(matches!(err, VkComputeError::MemoryKindNotPermitted { kind: 1, type_bits: 4 }));
        assert!(ensure_kind_permitted(40, u32::MAX).is_err());
    }
}
