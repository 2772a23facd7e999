//! CLI command definitions and dispatch for the `glacium` binary.
//!
//! Uses clap derive macros for argument parsing. Commands are grouped by
//! noun (`glacium project new`, `glacium job run`).

pub mod job;
pub mod pipeline;
pub mod project;
pub mod recipe;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use console::style;
use glacium_observe::LogFormat;
use glacium_types::job::JobStatus;

/// Dependency-aware job orchestration for simulation projects.
#[derive(Parser)]
#[command(name = "glacium", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log line format on stderr.
    #[arg(long, value_enum, default_value_t = LogFormatArg::Pretty, global = true)]
    pub log_format: LogFormatArg,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Configuration file to use instead of `$GLACIUM_HOME/glacium.toml`.
    #[arg(long, env = "GLACIUM_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create and list projects.
    Project {
        #[command(subcommand)]
        action: project::ProjectCommand,
    },

    /// Inspect, run and edit the jobs of a project.
    Job {
        #[command(subcommand)]
        action: job::JobCommand,
    },

    /// List recipes and apply them to projects.
    Recipe {
        #[command(subcommand)]
        action: recipe::RecipeCommand,
    },

    /// Preview and execute pipeline layout files.
    Pipeline {
        #[command(subcommand)]
        action: pipeline::PipelineCommand,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Output switches shared by every command.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

impl Output {
    /// Styled text is printed only when neither `--json` nor `--quiet` is set.
    pub fn styled(self) -> bool {
        !self.json && !self.quiet
    }
}

/// Parse `key=value`. Values are read as JSON when they parse (`4`,
/// `true`, `[1,2]`) and kept as strings otherwise.
pub fn parse_param(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in '{raw}'"));
    }
    let value = serde_json::from_str(value.trim())
        .unwrap_or_else(|_| serde_json::Value::String(value.trim().to_string()));
    Ok((key.to_string(), value))
}

/// Colored status label for tables and progress lines.
pub fn styled_status(status: JobStatus) -> String {
    let label = status.to_string();
    match status {
        JobStatus::Done => style(label).green().to_string(),
        JobStatus::Failed => style(label).red().bold().to_string(),
        JobStatus::Running => style(label).cyan().to_string(),
        JobStatus::Skipped => style(label).yellow().to_string(),
        JobStatus::Pending => style(label).dim().to_string(),
    }
}
