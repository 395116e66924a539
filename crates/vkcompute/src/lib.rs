//! Minimal Vulkan compute dispatch.
//!
//! `vkcompute` opens a device with one compute queue, backs each shader
//! binding slot with host-visible coherent memory, specializes a SPIR-V
//! kernel for a runtime workgroup size and replays one recorded dispatch as
//! often as the caller wants, copying `f32` data in and out between runs.
//!
//! Most callers only need [`PipelineInstance::builder`]. The lower-level
//! components are public for callers that share resources between kernels.

pub mod binding;
pub mod command;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod instance;
pub mod kernel;
pub mod memory;
pub mod pipeline;
pub mod resource;

pub use binding::BindingLayout;
pub use command::CommandSequence;
pub use config::EngineConfig;
pub use context::{Context, DeviceSummary, MemoryTypeSummary, QueueFamilySummary};
pub use dispatch::{DispatchShape, DivisibilityPolicy};
pub use error::{ErrorKind, Result, VkComputeError};
pub use executor::Executor;
pub use instance::{PipelineInstance, PipelineInstanceBuilder};
pub use kernel::KernelBinary;
pub use memory::MemoryAllocator;
pub use pipeline::KernelPipeline;
pub use resource::{ResourceDecl, ResourceSet, ResourceUsage};

/// Re-exported so callers can name device limits and result codes.
pub use ash::vk;
