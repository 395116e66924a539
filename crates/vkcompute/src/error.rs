//! Error types for the dispatch engine.

use std::path::PathBuf;

use ash::vk;
use thiserror::Error;

/// Coarse classification of a [`VkComputeError`].
///
/// Capability and construction errors are fatal for the pipeline instance
/// being built; usage errors are caller bugs and never reach the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The host or device lacks a required capability (loader, device,
    /// compute queue, coherent memory).
    Capability,
    /// A Vulkan object could not be created.
    Construction,
    /// Submission, queue wait, or host mapping failed at run time.
    Execution,
    /// The caller violated an API contract.
    Usage,
    /// Reading a kernel binary or configuration file failed.
    Io,
}

/// Errors produced by the dispatch engine.
#[derive(Debug, Error)]
pub enum VkComputeError {
    // ── capability ──────────────────────────────────────────────────────
    #[error("Vulkan loader unavailable: {0}")]
    LoaderUnavailable(String),

    #[error("no Vulkan physical device found")]
    NoDeviceFound,

    #[error("no queue family with compute support")]
    NoComputeQueue,

    #[error("no memory type is both host-visible and host-coherent")]
    NoSuitableMemory,

    // ── construction ────────────────────────────────────────────────────
    #[error("vkCreateInstance failed: {0}")]
    InstanceCreationFailed(#[source] vk::Result),

    #[error("enumerating {what} failed: {result}")]
    EnumerationFailed {
        what: &'static str,
        #[source]
        result: vk::Result,
    },

    #[error("vkCreateDevice failed: {0}")]
    DeviceCreationFailed(#[source] vk::Result),

    #[error("vkCreateBuffer failed for slot {slot}: {result}")]
    BufferCreationFailed {
        slot: usize,
        #[source]
        result: vk::Result,
    },

    #[error("memory type {kind} is not allowed for this buffer (type bits {type_bits:#x})")]
    MemoryKindNotPermitted { kind: u32, type_bits: u32 },

    #[error("vkAllocateMemory failed for {bytes} bytes: {result}")]
    AllocationFailed {
        bytes: u64,
        #[source]
        result: vk::Result,
    },

    #[error("vkBindBufferMemory failed: {0}")]
    BindFailed(#[source] vk::Result),

    #[error("descriptor set layout creation failed: {0}")]
    LayoutCreationFailed(#[source] vk::Result),

    #[error("descriptor pool creation failed: {0}")]
    PoolCreationFailed(#[source] vk::Result),

    #[error("descriptor pool exhausted")]
    PoolExhausted,

    #[error("descriptor set allocation failed: {0}")]
    SetAllocationFailed(#[source] vk::Result),

    #[error("invalid shader module: {0}")]
    ShaderModuleInvalid(String),

    #[error("{stage} creation failed: {result}")]
    PipelineCreationFailed {
        stage: &'static str,
        #[source]
        result: vk::Result,
    },

    #[error("command pool creation failed: {0}")]
    CommandPoolCreationFailed(#[source] vk::Result),

    #[error("command buffer allocation failed: {0}")]
    CommandAllocationFailed(#[source] vk::Result),

    #[error("command buffer recording failed: {0}")]
    RecordingFailed(#[source] vk::Result),

    // ── execution ───────────────────────────────────────────────────────
    #[error("vkQueueSubmit failed: {0}")]
    SubmitFailed(#[source] vk::Result),

    #[error("vkQueueWaitIdle failed: {0}")]
    WaitFailed(#[source] vk::Result),

    #[error("vkMapMemory failed for slot {slot}: {result}")]
    MapFailed {
        slot: usize,
        #[source]
        result: vk::Result,
    },

    // ── usage ───────────────────────────────────────────────────────────
    #[error("slot {slot} holds {expected} elements, got {actual}")]
    SizeMismatch {
        slot: usize,
        expected: usize,
        actual: usize,
    },

    #[error("slot {slot} out of range for a set of {len} resources")]
    SlotOutOfRange { slot: usize, len: usize },

    #[error("a resource set needs at least one resource")]
    EmptyResourceSet,

    #[error("resource in slot {slot} has zero elements")]
    ZeroSizedResource { slot: usize },

    #[error("dispatch shape ({x}, {y}, {z}) must be positive in every dimension")]
    InvalidDispatchShape { x: u32, y: u32, z: u32 },

    #[error("dispatch shape exceeds device limits: {0}")]
    ShapeExceedsLimits(String),

    #[error("group count {group_count} outside 1..={max}")]
    InvalidGroupCount { group_count: u32, max: u32 },

    #[error("{work_items} work items are not divisible by workgroup size {x}")]
    IndivisibleDispatch { work_items: u32, x: u32 },

    #[error("{work_items} work items exceed the largest resource ({max} elements)")]
    WorkItemsExceedResources { work_items: u32, max: usize },

    #[error("binding layout is bound to resource set {bound}, not {given}")]
    BindingMismatch { bound: u64, given: u64 },

    #[error("device index {index} out of range ({count} devices)")]
    DeviceIndexOutOfRange { index: usize, count: usize },

    #[error("pipeline instance builder is missing {0}")]
    MissingBuilderField(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── io ──────────────────────────────────────────────────────────────
    #[error("failed to read kernel binary {}: {source}", .path.display())]
    KernelIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read config {}: {source}", .path.display())]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl VkComputeError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        use VkComputeError::*;
        match self {
            LoaderUnavailable(_) | NoDeviceFound | NoComputeQueue | NoSuitableMemory => {
                ErrorKind::Capability
            }
            InstanceCreationFailed(_)
            | EnumerationFailed { .. }
            | DeviceCreationFailed(_)
            | BufferCreationFailed { .. }
            | MemoryKindNotPermitted { .. }
            | AllocationFailed { .. }
            | BindFailed(_)
            | LayoutCreationFailed(_)
            | PoolCreationFailed(_)
            | PoolExhausted
            | SetAllocationFailed(_)
            | ShaderModuleInvalid(_)
            | PipelineCreationFailed { .. }
            | CommandPoolCreationFailed(_)
            | CommandAllocationFailed(_)
            | RecordingFailed(_) => ErrorKind::Construction,
            SubmitFailed(_) | WaitFailed(_) | MapFailed { .. } => ErrorKind::Execution,
            SizeMismatch { .. }
            | SlotOutOfRange { .. }
            | EmptyResourceSet
            | ZeroSizedResource { .. }
            | InvalidDispatchShape { .. }
            | ShapeExceedsLimits(_)
            | InvalidGroupCount { .. }
            | IndivisibleDispatch { .. }
            | WorkItemsExceedResources { .. }
            | BindingMismatch { .. }
            | DeviceIndexOutOfRange { .. }
            | MissingBuilderField(_)
            | InvalidConfig(_) => ErrorKind::Usage,
            KernelIo { .. } | ConfigIo { .. } | ConfigParse(_) => ErrorKind::Io,
        }
    }

    /// Whether this error is a caller contract violation rather than an
    /// environment or device failure.
    pub fn is_usage_error(&self) -> bool {
        self.kind() == ErrorKind::Usage
    }

    /// The raw Vulkan result code behind this error, if any.
    pub fn vk_result(&self) -> Option<vk::Result> {
        use VkComputeError::*;
        match self {
            InstanceCreationFailed(r)
            | DeviceCreationFailed(r)
            | BindFailed(r)
            | LayoutCreationFailed(r)
            | PoolCreationFailed(r)
            | SetAllocationFailed(r)
            | CommandPoolCreationFailed(r)
            | CommandAllocationFailed(r)
            | RecordingFailed(r)
            | SubmitFailed(r)
            | WaitFailed(r) => Some(*r),
            EnumerationFailed { result, .. }
            | BufferCreationFailed { result, .. }
            | AllocationFailed { result, .. }
            | PipelineCreationFailed { result, .. }
            | MapFailed { result, .. } => Some(*result),
            _ => None,
        }
    }
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, VkComputeError>;
