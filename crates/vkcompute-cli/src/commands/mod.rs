//! Subcommand implementations.

pub mod info;
pub mod run;
pub mod softmax;
pub mod sum;

pub use info::InfoCommand;
pub use run::RunCommand;
pub use softmax::SoftmaxCommand;
pub use sum::SumCommand;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use console::style;
use vkcompute::{Context, DivisibilityPolicy, EngineConfig};

/// `--divisibility` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum PolicyArg {
    #[default]
    Reject,
    Truncate,
    RoundUp,
}

impl From<PolicyArg> for DivisibilityPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Reject => DivisibilityPolicy::Reject,
            PolicyArg::Truncate => DivisibilityPolicy::Truncate,
            PolicyArg::RoundUp => DivisibilityPolicy::RoundUp,
        }
    }
}

pub(crate) fn open_context(config: &EngineConfig) -> Result<Arc<Context>> {
    Context::open(config).context("failed to initialise Vulkan")
}

/// Print `values` under a heading, `per_row` values per line.
pub(crate) fn print_values(out: &mut impl Write, title: &str, values: &[f32], per_row: usize) -> Result<()> {
    writeln!(out, "{}", style(title).bold())?;
    for row in values.chunks(per_row.max(1)) {
        let line: Vec<String> = row.iter().map(|v| format!("{v:>10.4}")).collect();
        writeln!(out, "  {}", line.join(" "))?;
    }
    Ok(())
}
