//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Cellpilot - run workbook operations with retries and liveness checks
#[derive(Parser, Debug)]
#[command(name = "cellpilot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a cellpilot config file
    #[arg(short, long, global = true)]
    pub config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a task against a workbook
    Run(RunArgs),

    /// List the task catalog
    Tasks(TasksArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Show version information
    Version(VersionArgs),
}

// Run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Task name (see `cellpilot tasks`)
    pub task: String,

    /// Workbook the task operates on
    #[arg(short, long)]
    pub workbook: Utf8PathBuf,

    /// Override the retry attempt budget
    #[arg(long)]
    pub attempts: Option<u32>,

    /// Override the task's transient failure rate (0.0 - 1.0)
    #[arg(long)]
    pub fail_rate: Option<f64>,

    /// Make every call fail with a non-retryable error
    #[arg(long)]
    pub permanent: bool,

    /// Override how long one call takes, in milliseconds
    #[arg(long)]
    pub duration_ms: Option<u64>,

    /// Seed failures and jitter for a reproducible run
    #[arg(long)]
    pub seed: Option<u64>,
}

// Tasks command
#[derive(Args, Debug)]
pub struct TasksArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// Config commands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Write a starter config file
    Init(ConfigInitArgs),

    /// Validate the configuration
    Validate(ConfigValidateArgs),

    /// Show resolved configuration
    Show(ConfigShowArgs),
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Output file path (default: ~/.cellpilot/config.yaml)
    #[arg(short, long)]
    pub output: Option<Utf8PathBuf>,

    /// Overwrite existing file
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct ConfigValidateArgs {
    /// Path to config file (default: the global config plus --config)
    #[arg(short, long)]
    pub file: Option<Utf8PathBuf>,
}

#[derive(Args, Debug)]
pub struct ConfigShowArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// Version command
#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
