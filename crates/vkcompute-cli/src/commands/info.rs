//! `vkcompute info`: list physical devices and what would be selected.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use tracing::info;
use vkcompute::{DeviceSummary, vk};

use crate::config::CliConfig;

/// Show Vulkan devices, queue families and memory types
#[derive(Debug, Parser)]
pub struct InfoCommand {
    /// Also list every queue family and memory type
    #[arg(short, long)]
    pub verbose: bool,
}

impl InfoCommand {
    pub fn execute(&self, config: &CliConfig) -> Result<()> {
        let devices = vkcompute::Context::enumerate_devices(&config.engine)
            .context("failed to enumerate Vulkan devices")?;
        info!(count = devices.len(), "enumerated physical devices");

        let mut out = std::io::stdout().lock();
        for device in &devices {
            write_device(&mut out, device, config.engine.device_index, self.verbose)?;
        }
        Ok(())
    }
}

fn write_device(out: &mut impl Write, device: &DeviceSummary, selected: usize, verbose: bool) -> Result<()> {
    let marker = if device.index == selected { style("*").green().bold() } else { style(" ") };
    writeln!(
        out,
        "{marker} [{}] {} ({:?}, Vulkan {}.{}.{})",
        device.index,
        style(&device.name).bold(),
        device.device_type,
        vk::api_version_major(device.api_version),
        vk::api_version_minor(device.api_version),
        vk::api_version_patch(device.api_version),
    )?;
    writeln!(
        out,
        "      workgroup count {:?}, size {:?}, invocations {}",
        device.max_work_group_count, device.max_work_group_size, device.max_work_group_invocations
    )?;
    writeln!(
        out,
        "      compute queue family: {}, coherent memory type: {}",
        describe(device.compute_queue_family),
        describe(device.memory_kind)
    )?;

    if verbose {
        for family in &device.queue_families {
            writeln!(
                out,
                "      queue family {}: {} queue(s), {:?}",
                family.index, family.queue_count, family.flags
            )?;
        }
        for memory in &device.memory_types {
            writeln!(out, "      memory type {} (heap {}): {:?}", memory.index, memory.heap_index, memory.flags)?;
        }
    }
    Ok(())
}

fn describe(index: Option<u32>) -> String {
    index.map_or_else(|| "none".to_string(), |i| i.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vkcompute::{MemoryTypeSummary, QueueFamilySummary};

    fn summary() -> DeviceSummary {
        DeviceSummary {
            index: 0,
            name: "llvmpipe".to_string(),
            device_type: vk::PhysicalDeviceType::CPU,
            api_version: vk::API_VERSION_1_3,
            max_work_group_count: [65535, 65535, 65535],
            max_work_group_size: [1024, 1024, 1024],
            max_work_group_invocations: 1024,
            queue_families: vec![QueueFamilySummary {
                index: 0,
                flags: vk::QueueFlags::COMPUTE,
                queue_count: 1,
            }],
            memory_types: vec![MemoryTypeSummary {
                index: 0,
                flags: vk::MemoryPropertyFlags::HOST_VISIBLE,
                heap_index: 0,
            }],
            compute_queue_family: Some(0),
            memory_kind: None,
        }
    }

    #[test]
    fn selected_device_is_marked() {
        console::set_colors_enabled(false);
        let mut buf = Vec::new();
        write_device(&mut buf, &summary(), 0, false).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("* [0] llvmpipe"));
        assert!(text.contains("Vulkan 1.3.0"));
        assert!(text.contains("coherent memory type: none"));
        assert!(!text.contains("queue family 0:"));
    }

    #[test]
    fn verbose_lists_families_and_memory() {
        console::set_colors_enabled(false);
        let mut buf = Vec::new();
        write_device(&mut buf, &summary(), 1, true).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("  [0]"));
        assert!(text.contains("queue family 0: 1 queue(s)"));
        assert!(text.contains("memory type 0 (heap 0)"));
    }
}
