use anyhow::Result;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use crate::model::Version;
use crate::planner::Strategy;

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = env!("CARGO_PKG_DESCRIPTION"),
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the ordered upgrade plan for a cluster
    Plan(PlanArgs),

    /// Create and dispatch an upgrade for a cluster
    Upgrade(UpgradeArgs),

    /// Validate the given YAML manifest
    Validate(ValidateArgs),

    /// List the registered upgrade drivers
    Drivers(DriversArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

impl Commands {
    /// Log level requested by the subcommand's arguments.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Plan(opts) => opts.log_level,
            Self::Upgrade(opts) => opts.log_level,
            Self::Validate(opts) => opts.log_level,
            Self::Drivers(opts) => opts.log_level,
            Self::Completions(_) => LogLevel::Info,
        }
    }
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Path to the YAML manifest
    #[arg(short, long, default_value = "rollout.yaml")]
    pub file: Utf8PathBuf,

    /// Cluster name from the manifest topology
    #[arg(short, long)]
    pub cluster: String,

    /// Override the manifest's planning strategy
    #[arg(short, long)]
    pub strategy: Option<Strategy>,

    /// Set the log level
    #[arg(short, long, default_value = "info")]
    pub log_level: LogLevel,
}

#[derive(Args, Debug)]
pub struct UpgradeArgs {
    /// Path to the YAML manifest
    #[arg(short, long, default_value = "rollout.yaml")]
    pub file: Utf8PathBuf,

    /// Cluster name from the manifest topology
    #[arg(short, long)]
    pub cluster: String,

    /// Target version to upgrade to
    #[arg(short, long)]
    pub to: Version,

    /// Override the manifest's driver name
    #[arg(short, long)]
    pub driver: Option<String>,

    /// Driver parameter override as key=value (repeatable)
    #[arg(short, long = "param")]
    pub param: Vec<String>,

    /// Override the manifest's planning strategy
    #[arg(short, long)]
    pub strategy: Option<Strategy>,

    /// Block until the dispatched chain finishes instead of detaching
    #[arg(short, long)]
    pub wait: bool,

    /// Set the log level
    #[arg(short, long, default_value = "info")]
    pub log_level: LogLevel,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the YAML manifest to validate
    #[arg(short, long, default_value = "rollout.yaml")]
    pub file: Utf8PathBuf,

    /// Set the log level
    #[arg(short, long, default_value = "info")]
    pub log_level: LogLevel,
}

#[derive(Args, Debug)]
pub struct DriversArgs {
    /// Set the log level
    #[arg(short, long, default_value = "info")]
    pub log_level: LogLevel,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Represents log levels for controlling the verbosity of logging output.
///
/// Maps directly to the log levels used by the `tracing` crate.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

pub fn parse_args() -> Result<Cli> {
    Ok(Cli::parse())
}
