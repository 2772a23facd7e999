//! CLI job subcommands: list, run, reset, add and remove jobs of a project.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use glacium_core::event::EventBus;
use glacium_core::workflow::RunSummary;
use glacium_infra::timing::TimingLog;
use glacium_types::event::JobEvent;
use glacium_types::job::{JobRef, JobStatus};

use super::{Output, styled_status};
use crate::state::AppState;

#[derive(Subcommand)]
pub enum JobCommand {
    /// List the jobs of a project with status and dependencies.
    #[command(alias = "ls")]
    List {
        /// Project uid.
        project: String,
    },

    /// Run pending and failed jobs. Named jobs are reset first and run
    /// together with their unfinished dependencies.
    Run {
        /// Project uid.
        project: String,

        /// Job names to run (omit to run the whole project).
        jobs: Vec<String>,
    },

    /// Put a job back to PENDING.
    Reset {
        /// Project uid.
        project: String,

        /// Job name or 1-based index.
        job: JobRef,
    },

    /// Add a registered job and its missing dependencies.
    Add {
        /// Project uid.
        project: String,

        /// Registered job name.
        name: String,
    },

    /// Remove a job no other job depends on.
    #[command(alias = "rm")]
    Remove {
        /// Project uid.
        project: String,

        /// Job name or 1-based index.
        job: JobRef,

        /// Skip the confirmation prompt.
        #[arg(long, short)]
        force: bool,
    },
}

pub async fn handle_job_command(cmd: JobCommand, state: &AppState, out: Output) -> Result<()> {
    match cmd {
        JobCommand::List { project } => handle_list(state, &project, out).await,
        JobCommand::Run { project, jobs } => handle_run(state, &project, jobs, out).await,
        JobCommand::Reset { project, job } => handle_reset(state, &project, &job, out).await,
        JobCommand::Add { project, name } => handle_add(state, &project, &name, out).await,
        JobCommand::Remove {
            project,
            job,
            force,
        } => handle_remove(state, &project, &job, force, out).await,
    }
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

async fn handle_list(state: &AppState, uid: &str, out: Output) -> Result<()> {
    let (meta, manager) = state.open_project(uid, EventBus::default()).await?;
    let listings = manager.list_jobs();

    if out.json {
        let out: Vec<_> = listings
            .iter()
            .map(|l| {
                serde_json::json!({
                    "index": l.index,
                    "name": l.name,
                    "status": l.status,
                    "deps": meta.job(&l.name).map(|s| s.deps.clone()).unwrap_or_default(),
                    "registered": state.jobs.contains(&l.name),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if out.quiet {
        for l in &listings {
            println!("{}\t{}", l.name, l.status);
        }
        return Ok(());
    }

    if listings.is_empty() {
        println!();
        println!("  Project '{uid}' has no jobs.");
        println!(
            "  Add one with: {}",
            style(format!("glacium job add {uid} <NAME>")).dim()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#"),
            Cell::new("Job").fg(Color::Cyan),
            Cell::new("Status"),
            Cell::new("Depends on"),
        ]);

    for l in &listings {
        let deps = meta
            .job(&l.name)
            .map(|s| s.deps.join(", "))
            .unwrap_or_default();
        let name = if state.jobs.contains(&l.name) {
            Cell::new(&l.name)
        } else {
            Cell::new(format!("{} (unregistered)", l.name)).fg(Color::Yellow)
        };
        table.add_row(vec![
            Cell::new(l.index),
            name,
            Cell::new(styled_status(l.status)),
            Cell::new(if deps.is_empty() { "-".to_string() } else { deps }),
        ]);
    }

    println!();
    println!("  {} {}", style("Project").bold(), style(&meta.uid).cyan());
    println!("{table}");
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

async fn handle_run(state: &AppState, uid: &str, jobs: Vec<String>, out: Output) -> Result<()> {
    let bus = EventBus::default();
    let timing = TimingLog::new(state.projects.runs_root()).spawn(&bus);
    let progress = out.styled().then(|| spawn_progress(&bus));

    let (_meta, mut manager) = state.open_project(uid, bus).await?;
    let names = (!jobs.is_empty()).then_some(jobs);
    let result = manager.run(names.as_deref()).await;

    // Closing every sender lets the subscribers drain and stop.
    drop(manager);
    finish_subscribers(timing, progress).await;

    let summary = result.with_context(|| format!("Failed to run project '{uid}'"))?;
    print_summary(uid, &summary, out)?;

    let failed = summary.count(JobStatus::Failed);
    if failed > 0 {
        bail!("{failed} job(s) failed in project '{uid}'");
    }
    Ok(())
}

async fn finish_subscribers(timing: JoinHandle<()>, progress: Option<JoinHandle<()>>) {
    if let Err(e) = timing.await {
        tracing::warn!(error = %e, "timing log task failed");
    }
    if let Some(progress) = progress {
        if let Err(e) = progress.await {
            tracing::warn!(error = %e, "progress task failed");
        }
    }
}

/// Spinner naming the running job, one line per finished or skipped job.
fn spawn_progress(bus: &EventBus) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));

    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(JobEvent::Started { job, position, .. }) => {
                    spinner.set_message(format!("[{position}] {job}"));
                }
                Ok(JobEvent::Finished {
                    job,
                    status,
                    started_at,
                    at,
                    error,
                    ..
                }) => {
                    let seconds = (at - started_at).num_milliseconds() as f64 / 1000.0;
                    spinner.println(format!(
                        "  {} {job} {}",
                        styled_status(status),
                        style(format!("({seconds:.1}s)")).dim()
                    ));
                    if let Some(error) = error {
                        spinner.println(format!("      {}", style(error).red()));
                    }
                }
                Ok(JobEvent::Skipped { job, .. }) => {
                    spinner.println(format!(
                        "  {} {job} {}",
                        styled_status(JobStatus::Skipped),
                        style("(dependency not done)").dim()
                    ));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
        spinner.finish_and_clear();
    })
}

fn print_summary(uid: &str, summary: &RunSummary, out: Output) -> Result<()> {
    if out.json {
        let out = serde_json::json!({
            "project": uid,
            "success": summary.is_success(),
            "counts": summary.counts(),
            "jobs": summary.outcomes,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }
    if out.quiet {
        return Ok(());
    }

    println!();
    if summary.outcomes.is_empty() {
        println!("  Nothing to run in '{uid}': every job is done.");
    } else {
        let counts = summary
            .counts()
            .into_iter()
            .map(|(status, n)| format!("{n} {}", status.to_lowercase()))
            .collect::<Vec<_>>()
            .join(", ");
        let marker = if summary.is_success() {
            style("*").green().bold()
        } else {
            style("!").red().bold()
        };
        println!("  {marker} {counts}");
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Reset / Add / Remove
// ---------------------------------------------------------------------------

async fn handle_reset(state: &AppState, uid: &str, job: &JobRef, out: Output) -> Result<()> {
    let (_meta, mut manager) = state.open_project(uid, EventBus::default()).await?;
    let name = manager
        .reset_job(job)
        .await
        .with_context(|| format!("Failed to reset job {job}"))?;

    if out.json {
        println!("{}", serde_json::json!({ "reset": name }));
    } else if !out.quiet {
        println!(
            "  {} Reset '{}' to {}",
            style("*").green().bold(),
            style(&name).cyan(),
            styled_status(JobStatus::Pending)
        );
    }
    Ok(())
}

async fn handle_add(state: &AppState, uid: &str, name: &str, out: Output) -> Result<()> {
    let (mut meta, mut manager) = state.open_project(uid, EventBus::default()).await?;
    let added = manager
        .add_job(name)
        .await
        .with_context(|| format!("Failed to add job '{name}'"))?;
    state.save_specs(&mut meta, &manager).await?;

    if out.json {
        println!("{}", serde_json::json!({ "added": added }));
    } else if !out.quiet {
        if added.is_empty() {
            println!("  '{}' is already part of the project.", style(name).cyan());
        } else {
            println!(
                "  {} Added {}",
                style("*").green().bold(),
                style(added.join(", ")).cyan()
            );
        }
    }
    Ok(())
}

async fn handle_remove(
    state: &AppState,
    uid: &str,
    job: &JobRef,
    force: bool,
    out: Output,
) -> Result<()> {
    let (mut meta, mut manager) = state.open_project(uid, EventBus::default()).await?;
    let target = manager.resolve_ref(job)?;

    if !force && out.styled() {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Remove job '{}' from project '{uid}'?",
                style(&target).red().bold()
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    let removed = manager
        .remove_job(&JobRef::Name(target))
        .await
        .with_context(|| format!("Failed to remove job {job}"))?;
    state.save_specs(&mut meta, &manager).await?;

    if out.json {
        println!("{}", serde_json::json!({ "removed": removed }));
    } else if !out.quiet {
        println!(
            "  {} Removed '{}'",
            style("*").green().bold(),
            style(&removed).cyan()
        );
    }
    Ok(())
}
