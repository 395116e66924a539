//! Device buffers holding `f32` arrays, one per shader binding slot.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ash::vk;
use tracing::{debug, error, trace};

use crate::context::Context;
use crate::error::{Result, VkComputeError};
use crate::memory::MemoryAllocator;

/// Bytes per element. Every slot holds 32-bit floats.
pub const ELEMENT_SIZE: usize = std::mem::size_of::<f32>();

static NEXT_SET_ID: AtomicU64 = AtomicU64::new(1);

/// Role of a slot as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceUsage {
    /// Written by the host, read by the kernel.
    Input,
    /// Written by the kernel, read back by the host.
    Output,
    /// Scratch or bidirectional storage.
    #[default]
    Storage,
}

impl ResourceUsage {
    /// Vulkan buffer usage flags for this role.
    pub fn buffer_usage(self) -> vk::BufferUsageFlags {
        match self {
            ResourceUsage::Input => {
                vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            ResourceUsage::Output => {
                vk::BufferUsageFlags::STORAGE_BUFFER
                    | vk::BufferUsageFlags::TRANSFER_SRC
                    | vk::BufferUsageFlags::TRANSFER_DST
            }
            ResourceUsage::Storage => vk::BufferUsageFlags::STORAGE_BUFFER,
        }
    }
}

/// Declaration of one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDecl {
    /// Number of `f32` elements.
    pub elements: usize,
    pub usage: ResourceUsage,
    /// Free-form name used in log output.
    pub label: String,
}

impl ResourceDecl {
    pub fn new(elements: usize, usage: ResourceUsage) -> Self {
        Self { elements, usage, label: String::new() }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Buffer size in bytes.
    pub fn byte_size(&self) -> vk::DeviceSize {
        (self.elements * ELEMENT_SIZE) as vk::DeviceSize
    }
}

/// One buffer and its dedicated memory.
///
/// Dropping destroys the buffer, then frees the memory.
pub struct GpuResource {
    ctx: Arc<Context>,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    decl: ResourceDecl,
}

impl GpuResource {
    fn create(ctx: &Arc<Context>, allocator: &MemoryAllocator, slot: usize, decl: &ResourceDecl) -> Result<Self> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(decl.byte_size())
            .usage(decl.usage.buffer_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { ctx.device().create_buffer(&buffer_info, None) }.map_err(|result| {
            error!(slot, %result, "vkCreateBuffer failed");
            VkComputeError::BufferCreationFailed { slot, result }
        })?;

        let mut resource = Self {
            ctx: Arc::clone(ctx),
            buffer,
            memory: vk::DeviceMemory::null(),
            decl: decl.clone(),
        };
        resource.memory = allocator.allocate_and_bind(buffer, decl.elements)?;
        debug!(
            slot,
            label = %decl.label,
            usage = ?decl.usage,
            elements = decl.elements,
            "created resource"
        );
        Ok(resource)
    }

    pub fn buffer(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn elements(&self) -> usize {
        self.decl.elements
    }

    pub fn usage(&self) -> ResourceUsage {
        self.decl.usage
    }

    pub fn label(&self) -> &str {
        &self.decl.label
    }

    fn byte_len(&self) -> vk::DeviceSize {
        self.decl.byte_size()
    }
}

impl Drop for GpuResource {
    fn drop(&mut self) {
        let device = self.ctx.device();
        unsafe {
            if self.buffer != vk::Buffer::null() {
                device.destroy_buffer(self.buffer, None);
            }
            if self.memory != vk::DeviceMemory::null() {
                device.free_memory(self.memory, None);
            }
        }
    }
}

/// Ordered resources; position `i` is shader binding `i`.
///
/// Host transfers map and unmap the slot's memory on every call. Only one
/// thread may transfer to or from a given set at a time, and never while a
/// submission using it is in flight.
pub struct ResourceSet {
    id: u64,
    ctx: Arc<Context>,
    resources: Vec<GpuResource>,
}

impl ResourceSet {
    /// Create one buffer per declaration, in binding order.
    ///
    /// If any slot fails, the slots created so far are released and the
    /// error is returned.
    pub fn create(ctx: &Arc<Context>, allocator: &MemoryAllocator, decls: &[ResourceDecl]) -> Result<Self> {
        if decls.is_empty() {
            return Err(VkComputeError::EmptyResourceSet);
        }
        if let Some(slot) = decls.iter().position(|d| d.elements == 0) {
            return Err(VkComputeError::ZeroSizedResource { slot });
        }

        let resources = decls
            .iter()
            .enumerate()
            .map(|(slot, decl)| GpuResource::create(ctx, allocator, slot, decl))
            .collect::<Result<Vec<_>>>()?;

        let id = NEXT_SET_ID.fetch_add(1, Ordering::Relaxed);
        debug!(id, slots = resources.len(), "resource set ready");
        Ok(Self { id, ctx: Arc::clone(ctx), resources })
    }

    /// Identifier unique among the sets created by this process.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn get(&self, slot: usize) -> Result<&GpuResource> {
        self.resources
            .get(slot)
            .ok_or(VkComputeError::SlotOutOfRange { slot, len: self.resources.len() })
    }

    pub fn iter(&self) -> impl Iterator<Item = &GpuResource> {
        self.resources.iter()
    }

    pub fn element_count(&self, slot: usize) -> Result<usize> {
        Ok(self.get(slot)?.elements())
    }

    pub fn usage(&self, slot: usize) -> Result<ResourceUsage> {
        Ok(self.get(slot)?.usage())
    }

    /// Largest element count across all slots.
    pub fn max_elements(&self) -> usize {
        self.resources.iter().map(GpuResource::elements).max().unwrap_or(0)
    }

    /// Copy `data` into `slot`. The length must equal the slot's element
    /// count; on mismatch nothing is written.
    pub fn write_host_to_slot(&self, slot: usize, data: &[f32]) -> Result<()> {
        let resource = self.checked_slot(slot, data.len())?;
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let ptr = self.map(slot, resource)?;
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len());
            self.ctx.device().unmap_memory(resource.memory);
        }
        trace!(slot, elements = data.len(), "wrote host data");
        Ok(())
    }

    /// Read the whole slot into a new vector.
    pub fn read_slot_to_host(&self, slot: usize) -> Result<Vec<f32>> {
        let mut out = vec![0.0_f32; self.element_count(slot)?];
        self.read_slot_into(slot, &mut out)?;
        Ok(out)
    }

    /// Read the whole slot into `out`, whose length must match.
    pub fn read_slot_into(&self, slot: usize, out: &mut [f32]) -> Result<()> {
        let resource = self.checked_slot(slot, out.len())?;
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(out);
        let ptr = self.map(slot, resource)?;
        unsafe {
            std::ptr::copy_nonoverlapping(ptr as *const u8, bytes.as_mut_ptr(), bytes.len());
            self.ctx.device().unmap_memory(resource.memory);
        }
        trace!(slot, elements = out.len(), "read device data");
        Ok(())
    }

    fn checked_slot(&self, slot: usize, len: usize) -> Result<&GpuResource> {
        let resource = self.get(slot)?;
        if len != resource.elements() {
            return Err(VkComputeError::SizeMismatch { slot, expected: resource.elements(), actual: len });
        }
        Ok(resource)
    }

    fn map(&self, slot: usize, resource: &GpuResource) -> Result<*mut u8> {
        let ptr = unsafe {
            self.ctx.device().map_memory(
                resource.memory,
                0,
                resource.byte_len(),
                vk::MemoryMapFlags::empty(),
            )
        }
        .map_err(|result| {
            error!(slot, %result, "vkMapMemory failed");
            VkComputeError::MapFailed { slot, result }
        })?;
        Ok(ptr.cast())
    }
}

impl std::fmt::Debug for ResourceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceSet")
            .field("id", &self.id)
            .field(
                "slots",
                &self.resources.iter().map(|r| (r.usage(), r.elements())).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_size_is_four_per_element() {
        assert_eq!(ResourceDecl::new(33, ResourceUsage::Input).byte_size(), 132);
        assert_eq!(ResourceDecl::new(1, ResourceUsage::Output).byte_size(), 4);
    }

    #[test]
    fn usage_flags_always_include_storage() {
        for usage in [ResourceUsage::Input, ResourceUsage::Output, ResourceUsage::Storage] {
            assert!(usage.buffer_usage().contains(vk::BufferUsageFlags::STORAGE_BUFFER));
        }
        assert!(ResourceUsage::Output.buffer_usage().contains(vk::BufferUsageFlags::TRANSFER_SRC));
        assert!(!ResourceUsage::Input.buffer_usage().contains(vk::BufferUsageFlags::TRANSFER_SRC));
    }

    #[test]
    fn usage_parses_from_snake_case() {
        #[derive(serde::Deserialize)]
        struct Wrapper {
            usage: ResourceUsage,
        }
        let w: Wrapper = toml::from_str("usage = \"output\"").unwrap();
        assert_eq!(w.usage, ResourceUsage::Output);
    }

    #[test]
    fn decl_label() {
        let d = ResourceDecl::new(8, ResourceUsage::Storage).with_label("debug");
        assert_eq!(d.label, "debug");
        assert_eq!(d.elements, 8);
    }
}
