//! `vkcompute run`: execute a kernel described by a TOML manifest.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};
use vkcompute::{KernelBinary, PipelineInstance};

use super::{open_context, print_values};
use crate::config::CliConfig;
use crate::manifest::RunManifest;

/// Run a kernel described by a manifest file
#[derive(Debug, Parser)]
pub struct RunCommand {
    /// Run manifest (TOML)
    #[arg(short, long, value_name = "PATH")]
    pub manifest: PathBuf,

    /// Override the manifest's iteration count
    #[arg(short, long)]
    pub iterations: Option<u32>,
}

impl RunCommand {
    pub fn execute(&self, config: &CliConfig) -> Result<()> {
        let manifest = RunManifest::from_file(&self.manifest)?;
        let iterations = self.iterations.unwrap_or(manifest.iterations);
        let kernel = KernelBinary::from_path(&manifest.kernel)?;
        let shape = manifest.shape()?;
        debug!(kernel = %manifest.kernel.display(), %shape, slots = manifest.resources.len(), "manifest loaded");

        let ctx = open_context(&config.engine)?;
        let mut builder = PipelineInstance::builder(ctx)
            .resources(manifest.resources.iter().map(|r| r.decl()))
            .kernel(kernel)
            .shape(shape)
            .divisibility(manifest.divisibility);
        if let Some(n) = manifest.work_items {
            builder = builder.work_items(n);
        }
        let mut instance = builder.build().context("failed to build pipeline from manifest")?;

        for (slot, resource) in manifest.resources.iter().enumerate() {
            instance.write(slot, &resource.fill.generate(resource.elements))?;
        }

        let mut out = std::io::stdout().lock();
        for iteration in 1..=iterations {
            instance.submit()?;
            info!(iteration, groups = instance.group_count(), "dispatch complete");
            for (slot, resource) in manifest.resources.iter().enumerate() {
                if !resource.should_print() {
                    continue;
                }
                let title = if resource.label.is_empty() {
                    format!("slot {slot} (iteration {iteration})")
                } else {
                    format!("{} (iteration {iteration})", resource.label)
                };
                print_values(&mut out, &title, &instance.read(slot)?, 8)?;
            }
        }
        Ok(())
    }
}
