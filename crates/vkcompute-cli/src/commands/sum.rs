//! `vkcompute sum`: elementwise sum of a ramp and a reversed ramp.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use vkcompute::{DispatchShape, KernelBinary, PipelineInstance, ResourceUsage};

use super::{PolicyArg, open_context, print_values};
use crate::config::CliConfig;
use crate::manifest::Fill;

/// Run an `out = a + b` kernel on A = 0..n and B = n..1
#[derive(Debug, Parser)]
pub struct SumCommand {
    /// SPIR-V kernel with bindings a, b, out
    #[arg(short, long, value_name = "PATH")]
    pub kernel: PathBuf,

    /// Elements per buffer
    #[arg(short = 'n', long, default_value_t = 8)]
    pub elements: usize,

    /// Workgroup width (defaults to the element count)
    #[arg(short, long)]
    pub workgroup: Option<u32>,

    /// Number of dispatches
    #[arg(short, long, default_value_t = 1)]
    pub iterations: u32,

    /// What to do when the element count is not a multiple of the workgroup width
    #[arg(long, value_enum, default_value_t = PolicyArg::Reject)]
    pub divisibility: PolicyArg,
}

impl SumCommand {
    pub fn execute(&self, config: &CliConfig) -> Result<()> {
        let kernel = KernelBinary::from_path(&self.kernel)?;
        let width = match self.workgroup {
            Some(w) => w,
            None => u32::try_from(self.elements).context("element count does not fit a workgroup")?,
        };
        let ctx = open_context(&config.engine)?;
        let mut instance = PipelineInstance::builder(ctx)
            .resource(self.elements, ResourceUsage::Input)
            .resource(self.elements, ResourceUsage::Input)
            .resource(self.elements, ResourceUsage::Output)
            .kernel(kernel)
            .shape(DispatchShape::linear(width)?)
            .divisibility(self.divisibility.into())
            .build()
            .context("failed to build sum pipeline")?;

        let a = Fill::Ramp.generate(self.elements);
        let b = Fill::ReverseRamp.generate(self.elements);
        instance.write(2, &Fill::Zeros.generate(self.elements))?;

        let mut out = std::io::stdout().lock();
        for iteration in 1..=self.iterations {
            let results = instance.run(&[(0, a.as_slice()), (1, b.as_slice())], &[2])?;
            info!(iteration, groups = instance.group_count(), "dispatch complete");
            print_values(&mut out, &format!("Output (iteration {iteration})"), &results[0], 8)?;
        }
        Ok(())
    }
}
