//! Engine configuration.
//!
//! [`EngineConfig`] controls instance and device creation. It can be built in
//! code or loaded from TOML:
//!
//! ```toml
//! application_name = "softmax-demo"
//! api_version = "1.3"
//! enable_validation = true
//! device_index = 0
//! ```

use std::path::Path;

use ash::vk;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VkComputeError};

/// Name of the Khronos validation layer enabled by `enable_validation`.
pub const VALIDATION_LAYER: &std::ffi::CStr = c"VK_LAYER_KHRONOS_validation";

/// Configuration for Vulkan instance and device creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Application name reported to the Vulkan loader.
    pub application_name: String,
    /// Requested API version as `"major.minor"`.
    pub api_version: String,
    /// Enable the Khronos validation layer when it is installed.
    pub enable_validation: bool,
    /// Index into the enumerated physical devices (0 = first).
    pub device_index: usize,
    /// Request `VK_KHR_portability_enumeration` when the loader offers it.
    pub portability_enumeration: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            application_name: "vkcompute".to_string(),
            api_version: "1.2".to_string(),
            enable_validation: false,
            device_index: 0,
            portability_enumeration: true,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| VkComputeError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check field values without touching the device.
    pub fn validate(&self) -> Result<()> {
        if self.application_name.is_empty() {
            return Err(VkComputeError::InvalidConfig(
                "application_name must not be empty".to_string(),
            ));
        }
        if self.application_name.contains('\0') {
            return Err(VkComputeError::InvalidConfig(
                "application_name must not contain NUL".to_string(),
            ));
        }
        self.packed_api_version()?;
        Ok(())
    }

    /// The configured API version packed with `vk::make_api_version`.
    pub fn packed_api_version(&self) -> Result<u32> {
        let (major, minor) = parse_api_version(&self.api_version)?;
        Ok(vk::make_api_version(0, major, minor, 0))
    }
}

fn parse_api_version(text: &str) -> Result<(u32, u32)> {
    let invalid = || {
        VkComputeError::InvalidConfig(format!(
            "api_version must look like \"1.2\", got {text:?}"
        ))
    };
    let (major, minor) = text.trim().split_once('.').ok_or_else(invalid)?;
    let major: u32 = major.parse().map_err(|_| invalid())?;
    let minor: u32 = minor.parse().map_err(|_| invalid())?;
    if major != 1 || minor > 4 {
        return Err(invalid());
    }
    Ok((major, minor))
}
