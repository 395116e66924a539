//! `vkcompute softmax`: the softmax demo with input, output and debug slots.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use vkcompute::{DispatchShape, KernelBinary, PipelineInstance, ResourceUsage};

use super::{PolicyArg, open_context, print_values};
use crate::config::CliConfig;
use crate::manifest::Fill;

/// Run a softmax kernel over 0..n, printing output and debug buffers
#[derive(Debug, Parser)]
pub struct SoftmaxCommand {
    /// SPIR-V kernel with bindings input, output, debug
    #[arg(short, long, value_name = "PATH")]
    pub kernel: PathBuf,

    /// Elements in the input and output buffers
    #[arg(short = 'n', long, default_value_t = 33)]
    pub elements: usize,

    /// Elements in the debug buffer
    #[arg(long, default_value_t = 16)]
    pub debug_elements: usize,

    /// Workgroup width (defaults to the element count)
    #[arg(short, long)]
    pub workgroup: Option<u32>,

    /// Number of dispatches when not interactive
    #[arg(long, default_value_t = 1)]
    pub iterations: u32,

    /// Re-dispatch on every line read from stdin until `q`
    #[arg(short = 'I', long)]
    pub interactive: bool,

    /// What to do when the element count is not a multiple of the workgroup width
    #[arg(long, value_enum, default_value_t = PolicyArg::Reject)]
    pub divisibility: PolicyArg,
}

/// Whether a line typed at the prompt asks to quit.
pub fn is_quit(line: &str) -> bool {
    line.trim() == "q"
}

impl SoftmaxCommand {
    pub fn execute(&self, config: &CliConfig) -> Result<()> {
        let kernel = KernelBinary::from_path(&self.kernel)?;
        let width = match self.workgroup {
            Some(w) => w,
            None => u32::try_from(self.elements).context("element count does not fit a workgroup")?,
        };
        let ctx = open_context(&config.engine)?;
        let mut instance = PipelineInstance::builder(ctx)
            .resource(self.elements, ResourceUsage::Input)
            .resource(self.elements, ResourceUsage::Output)
            .resource(self.debug_elements, ResourceUsage::Storage)
            .kernel(kernel)
            .shape(DispatchShape::linear(width)?)
            .work_items(u32::try_from(self.elements).context("element count does not fit a dispatch")?)
            .divisibility(self.divisibility.into())
            .build()
            .context("failed to build softmax pipeline")?;

        let input = Fill::Ramp.generate(self.elements);
        instance.write(0, &input)?;
        instance.write(1, &Fill::Zeros.generate(self.elements))?;
        instance.write(2, &Fill::Zeros.generate(self.debug_elements))?;

        let mut out = std::io::stdout().lock();
        let mut iteration = 0u32;
        let mut lines = std::io::stdin().lock().lines();
        loop {
            iteration += 1;
            instance.submit()?;
            info!(iteration, groups = instance.group_count(), "dispatch complete");
            print_values(&mut out, "Input", &input, 8)?;
            print_values(&mut out, "Debug", &instance.read(2)?, 4)?;
            print_values(&mut out, "Output", &instance.read(1)?, 8)?;

            if self.interactive {
                write!(out, "Press q to quit, enter to continue > ")?;
                out.flush()?;
                let Some(line) = lines.next() else { break };
                if is_quit(&line?) {
                    break;
                }
            } else if iteration >= self.iterations {
                break;
            }
        }
        info!(iterations = iteration, "done");
        Ok(())
    }
}
