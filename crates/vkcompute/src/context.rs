//! Vulkan instance, physical device selection and logical device.
//!
//! A [`Context`] owns the loader entry, the instance and one logical device
//! with a single compute queue. Every other component holds an
//! `Arc<Context>`, so the device is destroyed only after the last buffer,
//! pipeline and command pool that references it.

use std::ffi::{CStr, c_char};
use std::fmt;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info, warn};

use crate::config::{EngineConfig, VALIDATION_LAYER};
use crate::error::{Result, VkComputeError};
use crate::memory::select_memory_kind;

/// Return the first queue family that supports compute and exposes at least
/// one queue.
pub fn find_compute_queue_family(families: &[vk::QueueFamilyProperties]) -> Option<u32> {
    families
        .iter()
        .position(|f| f.queue_flags.contains(vk::QueueFlags::COMPUTE) && f.queue_count > 0)
        .map(|i| i as u32)
}

/// Summary of one queue family, as reported by `vkcompute info`.
#[derive(Debug, Clone)]
pub struct QueueFamilySummary {
    pub index: u32,
    pub flags: vk::QueueFlags,
    pub queue_count: u32,
}

/// Summary of one memory type.
#[derive(Debug, Clone)]
pub struct MemoryTypeSummary {
    pub index: u32,
    pub flags: vk::MemoryPropertyFlags,
    pub heap_index: u32,
}

/// Capabilities of one physical device.
#[derive(Debug, Clone)]
pub struct DeviceSummary {
    pub index: usize,
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    pub max_work_group_count: [u32; 3],
    pub max_work_group_size: [u32; 3],
    pub max_work_group_invocations: u32,
    pub queue_families: Vec<QueueFamilySummary>,
    pub memory_types: Vec<MemoryTypeSummary>,
    /// Queue family [`Context::open`] would pick on this device.
    pub compute_queue_family: Option<u32>,
    /// Memory type [`crate::MemoryAllocator`] would pick on this device.
    pub memory_kind: Option<u32>,
}

/// Open connection to one physical device and its compute queue.
pub struct Context {
    entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queue_family_index: u32,
    queue: vk::Queue,
    properties: vk::PhysicalDeviceProperties,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    device_name: String,
}

impl Context {
    /// Load Vulkan, pick `config.device_index` (the first device by default)
    /// and open a logical device with one compute queue.
    pub fn open(config: &EngineConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let entry = load_entry()?;
        let instance = create_instance(&entry, config)?;

        match open_device(&instance, config) {
            Ok(parts) => {
                info!(
                    device = %parts.device_name,
                    queue_family = parts.queue_family_index,
                    "Vulkan context ready"
                );
                Ok(Arc::new(Self {
                    entry,
                    instance,
                    physical_device: parts.physical_device,
                    device: parts.device,
                    queue_family_index: parts.queue_family_index,
                    queue: parts.queue,
                    properties: parts.properties,
                    memory_properties: parts.memory_properties,
                    device_name: parts.device_name,
                }))
            }
            Err(e) => {
                error!(error = %e, "device initialisation failed");
                unsafe { instance.destroy_instance(None) };
                Err(e)
            }
        }
    }

    /// Enumerate every physical device without opening one.
    pub fn enumerate_devices(config: &EngineConfig) -> Result<Vec<DeviceSummary>> {
        config.validate()?;
        let entry = load_entry()?;
        let instance = create_instance(&entry, config)?;
        let summaries = summarize_devices(&instance);
        unsafe { instance.destroy_instance(None) };
        summaries
    }

    /// Scan the queue families of `physical_device` for compute support.
    pub fn find_queue_family(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
    ) -> Result<u32> {
        let families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
        debug!(count = families.len(), "queue families");
        for (i, family) in families.iter().enumerate() {
            debug!(
                index = i,
                queues = family.queue_count,
                flags = ?family.queue_flags,
                "queue family"
            );
        }
        let index = find_compute_queue_family(&families).ok_or(VkComputeError::NoComputeQueue)?;
        info!(index, "selected compute queue family");
        Ok(index)
    }

    /// The logical device.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// The instance the device was created from.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// The selected physical device.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// The single compute queue.
    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.properties.limits
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// The loader entry, for callers that need global Vulkan queries.
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("device_name", &self.device_name)
            .field("queue_family_index", &self.queue_family_index)
            .finish_non_exhaustive()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                warn!(error = %e, "vkDeviceWaitIdle failed during shutdown");
            }
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
        debug!(device = %self.device_name, "Vulkan context destroyed");
    }
}

// ── construction helpers ────────────────────────────────────────────────────

struct DeviceParts {
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queue_family_index: u32,
    queue: vk::Queue,
    properties: vk::PhysicalDeviceProperties,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    device_name: String,
}

fn load_entry() -> Result<ash::Entry> {
    unsafe { ash::Entry::load() }.map_err(|e| {
        error!(error = %e, "failed to load the Vulkan loader");
        VkComputeError::LoaderUnavailable(e.to_string())
    })
}

fn create_instance(entry: &ash::Entry, config: &EngineConfig) -> Result<ash::Instance> {
    let extensions = unsafe { entry.enumerate_instance_extension_properties(None) }
        .map_err(|result| VkComputeError::EnumerationFailed {
            what: "instance extensions",
            result,
        })?;
    let layers = unsafe { entry.enumerate_instance_layer_properties() }.map_err(|result| {
        VkComputeError::EnumerationFailed { what: "instance layers", result }
    })?;

    for ext in &extensions {
        debug!(name = ?ext.extension_name_as_c_str().unwrap_or_default(), "instance extension");
    }
    for layer in &layers {
        debug!(name = ?layer.layer_name_as_c_str().unwrap_or_default(), "instance layer");
    }

    let api_version = config.packed_api_version()?;
    info!(
        major = vk::api_version_major(api_version),
        minor = vk::api_version_minor(api_version),
        "requesting Vulkan API version"
    );

    let mut enabled_extensions: Vec<*const c_char> = Vec::new();
    let mut flags = vk::InstanceCreateFlags::empty();
    let portability = vk::KHR_PORTABILITY_ENUMERATION_NAME;
    if config.portability_enumeration {
        if has_extension(&extensions, portability) {
            enabled_extensions.push(portability.as_ptr());
            flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
        } else {
            debug!("{} not offered by the loader", portability.to_string_lossy());
        }
    }

    let mut enabled_layers: Vec<*const c_char> = Vec::new();
    if config.enable_validation {
        let present = layers
            .iter()
            .any(|l| l.layer_name_as_c_str().is_ok_and(|name| name == VALIDATION_LAYER));
        if present {
            enabled_layers.push(VALIDATION_LAYER.as_ptr());
        } else {
            warn!("validation requested but {} is not installed", VALIDATION_LAYER.to_string_lossy());
        }
    }

    let app_name = std::ffi::CString::new(config.application_name.as_str())
        .map_err(|_| VkComputeError::InvalidConfig("application_name contains NUL".into()))?;
    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(1)
        .engine_name(c"vkcompute")
        .engine_version(1)
        .api_version(api_version);

    let create_info = vk::InstanceCreateInfo::default()
        .flags(flags)
        .application_info(&app_info)
        .enabled_extension_names(&enabled_extensions)
        .enabled_layer_names(&enabled_layers);

    let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(|result| {
        error!(%result, "vkCreateInstance failed");
        VkComputeError::InstanceCreationFailed(result)
    })?;
    debug!(
        extensions = enabled_extensions.len(),
        layers = enabled_layers.len(),
        "Vulkan instance created"
    );
    Ok(instance)
}

fn enumerate_physical_devices(instance: &ash::Instance) -> Result<Vec<vk::PhysicalDevice>> {
    let devices = unsafe { instance.enumerate_physical_devices() }.map_err(|result| {
        VkComputeError::EnumerationFailed { what: "physical devices", result }
    })?;
    if devices.is_empty() {
        error!("no GPU with Vulkan support found");
        return Err(VkComputeError::NoDeviceFound);
    }
    Ok(devices)
}

fn open_device(instance: &ash::Instance, config: &EngineConfig) -> Result<DeviceParts> {
    let devices = enumerate_physical_devices(instance)?;
    info!(count = devices.len(), "physical devices found");

    // First enumerated device unless configured otherwise; no suitability scoring.
    let physical_device = *devices.get(config.device_index).ok_or(
        VkComputeError::DeviceIndexOutOfRange { index: config.device_index, count: devices.len() },
    )?;

    let properties = unsafe { instance.get_physical_device_properties(physical_device) };
    let device_name = device_name(&properties);
    let limits = &properties.limits;
    info!(
        index = config.device_index,
        name = %device_name,
        device_type = ?properties.device_type,
        "selected physical device"
    );
    info!(
        x = limits.max_compute_work_group_count[0],
        y = limits.max_compute_work_group_count[1],
        z = limits.max_compute_work_group_count[2],
        "max compute workgroup count"
    );
    debug!(
        x = limits.max_compute_work_group_size[0],
        y = limits.max_compute_work_group_size[1],
        z = limits.max_compute_work_group_size[2],
        invocations = limits.max_compute_work_group_invocations,
        "max compute workgroup size"
    );

    let queue_family_index = Context::find_queue_family(instance, physical_device)?;

    let device_extensions =
        unsafe { instance.enumerate_device_extension_properties(physical_device) }.map_err(
            |result| VkComputeError::EnumerationFailed { what: "device extensions", result },
        )?;
    let mut enabled_extensions: Vec<*const c_char> = Vec::new();
    let portability_subset = vk::KHR_PORTABILITY_SUBSET_NAME;
    if has_extension(&device_extensions, portability_subset) {
        enabled_extensions.push(portability_subset.as_ptr());
    }
    debug!(count = enabled_extensions.len(), "device extensions enabled");

    let priorities = [1.0_f32];
    let queue_info = vk::DeviceQueueCreateInfo::default()
        .queue_family_index(queue_family_index)
        .queue_priorities(&priorities);
    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(std::slice::from_ref(&queue_info))
        .enabled_extension_names(&enabled_extensions);

    let device = unsafe { instance.create_device(physical_device, &create_info, None) }
        .map_err(|result| {
            error!(%result, "vkCreateDevice failed");
            VkComputeError::DeviceCreationFailed(result)
        })?;
    let queue = unsafe { device.get_device_queue(queue_family_index, 0) };
    let memory_properties =
        unsafe { instance.get_physical_device_memory_properties(physical_device) };

    Ok(DeviceParts {
        physical_device,
        device,
        queue_family_index,
        queue,
        properties,
        memory_properties,
        device_name,
    })
}

fn summarize_devices(instance: &ash::Instance) -> Result<Vec<DeviceSummary>> {
    let devices = enumerate_physical_devices(instance)?;
    Ok(devices
        .into_iter()
        .enumerate()
        .map(|(index, pd)| {
            let properties = unsafe { instance.get_physical_device_properties(pd) };
            let families = unsafe { instance.get_physical_device_queue_family_properties(pd) };
            let memory = unsafe { instance.get_physical_device_memory_properties(pd) };
            DeviceSummary {
                index,
                name: device_name(&properties),
                device_type: properties.device_type,
                api_version: properties.api_version,
                max_work_group_count: properties.limits.max_compute_work_group_count,
                max_work_group_size: properties.limits.max_compute_work_group_size,
                max_work_group_invocations: properties.limits.max_compute_work_group_invocations,
                queue_families: families
                    .iter()
                    .enumerate()
                    .map(|(i, f)| QueueFamilySummary {
                        index: i as u32,
                        flags: f.queue_flags,
                        queue_count: f.queue_count,
                    })
                    .collect(),
                memory_types: memory
                    .memory_types_as_slice()
                    .iter()
                    .enumerate()
                    .map(|(i, t)| MemoryTypeSummary {
                        index: i as u32,
                        flags: t.property_flags,
                        heap_index: t.heap_index,
                    })
                    .collect(),
                compute_queue_family: find_compute_queue_family(&families),
                memory_kind: select_memory_kind(&memory),
            }
        })
        .collect())
}

fn has_extension(available: &[vk::ExtensionProperties], name: &CStr) -> bool {
    available.iter().any(|e| e.extension_name_as_c_str().is_ok_and(|n| n == name))
}

fn device_name(properties: &vk::PhysicalDeviceProperties) -> String {
    properties
        .device_name_as_c_str()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "<unnamed device>".to_string())
}
