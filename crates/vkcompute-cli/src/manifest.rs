//! Run manifests for `vkcompute run`.
//!
//! ```toml
//! kernel = "softmax.spv"
//! workgroup = [33, 1, 1]
//! iterations = 2
//!
//! [[resource]]
//! label = "input"
//! elements = 33
//! usage = "input"
//! fill = "ramp"
//!
//! [[resource]]
//! label = "output"
//! elements = 33
//! usage = "output"
//!
//! [[resource]]
//! label = "debug"
//! elements = 16
//! usage = "storage"
//! fill = { value = -1.0 }
//! print = true
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use vkcompute::{DispatchShape, DivisibilityPolicy, ResourceDecl, ResourceUsage};

/// Initial contents of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fill {
    #[default]
    Zeros,
    /// `0, 1, 2, ..`
    Ramp,
    /// `n, n-1, .., 1`
    ReverseRamp,
    /// Every element set to the same value.
    Value(f32),
}

impl Fill {
    pub fn generate(self, n: usize) -> Vec<f32> {
        match self {
            Fill::Zeros => vec![0.0; n],
            Fill::Ramp => (0..n).map(|i| i as f32).collect(),
            Fill::ReverseRamp => (0..n).map(|i| (n - i) as f32).collect(),
            Fill::Value(v) => vec![v; n],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceSpec {
    #[serde(default)]
    pub label: String,
    pub elements: usize,
    #[serde(default)]
    pub usage: ResourceUsage,
    #[serde(default)]
    pub fill: Fill,
    /// Print after each iteration. Defaults to true for output slots.
    pub print: Option<bool>,
}

impl ResourceSpec {
    pub fn should_print(&self) -> bool {
        self.print.unwrap_or(self.usage == ResourceUsage::Output)
    }

    pub fn decl(&self) -> ResourceDecl {
        ResourceDecl::new(self.elements, self.usage).with_label(self.label.clone())
    }
}

fn default_workgroup() -> [u32; 3] {
    [1, 1, 1]
}

fn default_iterations() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunManifest {
    /// Kernel path, relative to the manifest's directory.
    pub kernel: PathBuf,
    #[serde(default = "default_workgroup")]
    pub workgroup: [u32; 3],
    pub work_items: Option<u32>,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default)]
    pub divisibility: DivisibilityPolicy,
    #[serde(rename = "resource", default)]
    pub resources: Vec<ResourceSpec>,
}

impl RunManifest {
    /// Parse and validate; `kernel` is resolved against `base_dir`.
    pub fn from_toml_str(text: &str, base_dir: &Path) -> Result<Self> {
        let mut manifest: Self = toml::from_str(text).context("malformed run manifest")?;
        if manifest.kernel.is_relative() {
            manifest.kernel = base_dir.join(&manifest.kernel);
        }
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        let base = path.parent().unwrap_or(Path::new("."));
        Self::from_toml_str(&text, base).with_context(|| format!("invalid manifest {}", path.display()))
    }

    pub fn shape(&self) -> Result<DispatchShape> {
        let [x, y, z] = self.workgroup;
        Ok(DispatchShape::new(x, y, z)?)
    }

    fn validate(&self) -> Result<()> {
        if self.resources.is_empty() {
            bail!("manifest declares no [[resource]] entries");
        }
        if let Some(i) = self.resources.iter().position(|r| r.elements == 0) {
            bail!("resource {i} has zero elements");
        }
        if self.iterations == 0 {
            bail!("iterations must be at least 1");
        }
        self.shape()?;
        Ok(())
    }
}
