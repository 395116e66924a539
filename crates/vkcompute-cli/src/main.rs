//! vkcompute CLI
//!
//! Inspect Vulkan devices and run compute kernels through the `vkcompute`
//! dispatch engine.

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use vkcompute_cli::commands::{InfoCommand, RunCommand, SoftmaxCommand, SumCommand};
use vkcompute_cli::config::{CliConfig, LogFormat, LoggingConfig, Overrides};
use vkcompute_cli::exit::{EXIT_USAGE, exit_code_for};

/// vkcompute - minimal Vulkan compute dispatch
#[derive(Parser)]
#[command(name = "vkcompute")]
#[command(about = "Run SPIR-V compute kernels on a Vulkan device")]
#[command(long_about = r#"
Run SPIR-V compute kernels on a Vulkan device.

Examples:
  # List devices and the one that would be used
  vkcompute info --verbose

  # Elementwise sum demo
  vkcompute sum --kernel sum.spv --elements 8

  # Softmax demo, re-dispatching until `q`
  vkcompute softmax --kernel softmax.spv --interactive

  # Generic manifest-driven run
  vkcompute run --manifest softmax.toml
"#)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Log level or EnvFilter directive (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum, value_name = "FORMAT", global = true)]
    log_format: Option<LogFormat>,

    /// Physical device index (0 = first enumerated)
    #[arg(short, long, value_name = "N", global = true)]
    device_index: Option<usize>,

    /// Enable the Khronos validation layer
    #[arg(long, global = true)]
    validation: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show Vulkan devices
    Info(InfoCommand),

    /// Elementwise sum demo
    Sum(SumCommand),

    /// Softmax demo
    Softmax(SoftmaxCommand),

    /// Run a kernel from a manifest
    Run(RunCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match CliConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(EXIT_USAGE);
        }
    };
    config.apply(&Overrides {
        log_level: cli.log_level.clone(),
        log_format: cli.log_format,
        device_index: cli.device_index,
        validation: cli.validation,
    });

    setup_logging(&config.logging);

    let result = match &cli.command {
        Some(Commands::Info(cmd)) => cmd.execute(&config),
        Some(Commands::Sum(cmd)) => cmd.execute(&config),
        Some(Commands::Softmax(cmd)) => cmd.execute(&config),
        Some(Commands::Run(cmd)) => cmd.execute(&config),
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        for cause in e.chain().skip(1) {
            error!("  Caused by: {}", cause);
        }
        std::process::exit(exit_code_for(&e));
    }

    Ok(())
}

fn setup_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => subscriber.json().with_timer(tracing_subscriber::fmt::time::uptime()).init(),
        LogFormat::Compact => subscriber.compact().init(),
        LogFormat::Pretty => subscriber.pretty().init(),
    }
}
