//! CLI pipeline subcommands: preview and execute layout files.
//!
//! A layout file lists runs; `after` references earlier runs by 1-based
//! position or uuid:
//!
//! ```yaml
//! runs:
//!   - case: wing
//!     parameters: { aoa: 0 }
//!     jobs: [SOLVE]
//!     tags: [aoa=0]
//!   - parameters: { aoa: 4 }
//!     jobs: [SOLVE, POST]
//!     after: [1]
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use glacium_core::event::EventBus;
use glacium_core::pipeline::{Pipeline, PipelineExecutor, PipelineOptions};
use glacium_infra::materializer::FsMaterializer;
use glacium_infra::timing::TimingLog;
use glacium_types::run::{RunResult, RunStatus};

use super::Output;
use crate::state::AppState;

#[derive(Subcommand)]
pub enum PipelineCommand {
    /// Print the runs a layout file expands to.
    Preview {
        /// Pipeline layout YAML file.
        layout: PathBuf,
    },

    /// Materialize and execute every run of a layout file.
    Run {
        /// Pipeline layout YAML file.
        layout: PathBuf,

        /// Runs executing at once (defaults to `default_concurrency`).
        #[arg(long, short)]
        concurrency: Option<usize>,

        /// Create projects and resolve job order without executing jobs.
        #[arg(long)]
        dry_run: bool,
    },
}

pub async fn handle_pipeline_command(
    cmd: PipelineCommand,
    state: &AppState,
    out: Output,
) -> Result<()> {
    match cmd {
        PipelineCommand::Preview { layout } => handle_preview(&layout, out).await,
        PipelineCommand::Run {
            layout,
            concurrency,
            dry_run,
        } => handle_run(state, &layout, concurrency, dry_run, out).await,
    }
}

async fn load_pipeline(path: &Path) -> Result<Pipeline> {
    let yaml = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read layout {}", path.display()))?;
    Pipeline::load_layout(&yaml).with_context(|| format!("Invalid layout {}", path.display()))
}

async fn handle_preview(path: &Path, out: Output) -> Result<()> {
    let pipeline = load_pipeline(path).await?;
    let order = pipeline.execution_order()?;

    if out.json {
        let layout = pipeline.to_layout();
        println!("{}", serde_json::to_string_pretty(&layout)?);
        return Ok(());
    }
    if !out.quiet {
        println!(
            "# {} run(s), execution order: {}",
            pipeline.len(),
            order
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    print!("{}", pipeline.preview()?);
    Ok(())
}

async fn handle_run(
    state: &AppState,
    path: &Path,
    concurrency: Option<usize>,
    dry_run: bool,
    out: Output,
) -> Result<()> {
    let pipeline = load_pipeline(path).await?;
    let options = PipelineOptions {
        concurrency: concurrency.unwrap_or(state.config.default_concurrency),
        dry_run,
    };

    let bus = EventBus::default();
    let timing = TimingLog::new(state.projects.runs_root()).spawn(&bus);
    let executor = PipelineExecutor::new(
        Arc::new(FsMaterializer::new(state.projects.clone())),
        Arc::clone(&state.jobs),
        bus,
    );

    let spinner = out.styled().then(|| {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(format!(
            "Executing {} run(s), concurrency {}",
            pipeline.len(),
            options.concurrency.max(1)
        ));
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    });

    let results = executor.execute(&pipeline, options).await;
    drop(executor);
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    if let Err(e) = timing.await {
        tracing::warn!(error = %e, "timing log task failed");
    }

    let results = results.context("Pipeline could not be scheduled")?;
    print_results(&results, out)?;

    let failed = results.iter().filter(|r| !r.status.is_success()).count();
    if failed > 0 {
        bail!("{failed} of {} run(s) did not succeed", results.len());
    }
    Ok(())
}

fn status_cell(status: RunStatus) -> Cell {
    let cell = Cell::new(status);
    match status {
        RunStatus::Succeeded => cell.fg(Color::Green),
        RunStatus::Planned => cell.fg(Color::Cyan),
        RunStatus::Failed => cell.fg(Color::Red),
        RunStatus::DependencyFailed => cell.fg(Color::Yellow),
    }
}

fn print_results(results: &[RunResult], out: Output) -> Result<()> {
    if out.json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }
    if out.quiet {
        for r in results {
            println!("{}\t{}", r.run_id, r.status);
        }
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Run").fg(Color::Cyan),
            Cell::new("Tags"),
            Cell::new("Project"),
            Cell::new("Status"),
            Cell::new("Jobs"),
            Cell::new("Error"),
        ]);

    for r in results {
        let jobs = r
            .jobs
            .iter()
            .map(|j| format!("{}={}", j.name, j.status))
            .collect::<Vec<_>>()
            .join(" ");
        let error = r
            .error
            .clone()
            .or_else(|| {
                r.jobs
                    .iter()
                    .find_map(|j| j.error.as_ref().map(|e| format!("{}: {e}", j.name)))
            })
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(r.run_id),
            Cell::new(r.tags.iter().cloned().collect::<Vec<_>>().join(", ")),
            Cell::new(r.project.as_deref().unwrap_or("-")),
            status_cell(r.status),
            Cell::new(jobs),
            Cell::new(error),
        ]);
    }

    let succeeded = results.iter().filter(|r| r.status.is_success()).count();
    println!();
    println!("{table}");
    println!(
        "  {} {succeeded}/{} run(s) succeeded",
        if succeeded == results.len() {
            style("*").green().bold()
        } else {
            style("!").red().bold()
        },
        results.len()
    );
    println!();
    Ok(())
}
