//! CLI project subcommands: create a project directory and list existing ones.

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use glacium_core::event::EventBus;
use glacium_core::repository::StatusStore;
use glacium_infra::filesystem::NewProject;
use glacium_types::job::JobStatus;
use glacium_types::recipe::split_chain;

use super::{Output, parse_param};
use crate::state::AppState;

#[derive(Subcommand)]
pub enum ProjectCommand {
    /// Create a project from a recipe and/or explicit jobs.
    New {
        /// Project name (used in the uid suffix).
        name: String,

        /// Recipe reference, chains joined with `+` (e.g. "prep+solver").
        #[arg(long, short)]
        recipe: Option<String>,

        /// Case selector stored with the project.
        #[arg(long)]
        case: Option<String>,

        /// Parameter as key=value; repeatable.
        #[arg(long = "param", short, value_parser = parse_param)]
        params: Vec<(String, serde_json::Value)>,

        /// Additional registered job to add; repeatable.
        #[arg(long = "job", short)]
        jobs: Vec<String>,
    },

    /// List projects under the runs root.
    #[command(alias = "ls")]
    List,
}

pub async fn handle_project_command(
    cmd: ProjectCommand,
    state: &AppState,
    out: Output,
) -> Result<()> {
    match cmd {
        ProjectCommand::New {
            name,
            recipe,
            case,
            params,
            jobs,
        } => handle_new(state, name, recipe, case, params, jobs, out).await,
        ProjectCommand::List => handle_list(state, out).await,
    }
}

// ---------------------------------------------------------------------------
// New
// ---------------------------------------------------------------------------

async fn handle_new(
    state: &AppState,
    name: String,
    recipe: Option<String>,
    case: Option<String>,
    params: Vec<(String, serde_json::Value)>,
    jobs: Vec<String>,
    out: Output,
) -> Result<()> {
    let mut new = NewProject::new(name);
    new.case = case;
    new.recipe = recipe.clone();
    new.parameters = params.into_iter().collect();

    let mut meta = state
        .projects
        .create(new)
        .await
        .context("Failed to create project")?;
    let mut manager = state.open_manager(&meta, EventBus::default()).await?;

    if let Some(reference) = recipe.as_deref() {
        let members = split_chain(reference);
        manager
            .sync_recipes(&state.recipes, &members)
            .await
            .with_context(|| format!("Failed to apply recipe '{reference}'"))?;
    }
    for job in &jobs {
        manager
            .add_job(job)
            .await
            .with_context(|| format!("Failed to add job '{job}'"))?;
    }
    state.save_specs(&mut meta, &manager).await?;

    if out.json {
        let out = serde_json::json!({
            "uid": meta.uid,
            "name": meta.name,
            "root": state.projects.project_dir(&meta.uid).display().to_string(),
            "recipe": meta.recipe,
            "jobs": meta.job_names().collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if !out.quiet {
        println!();
        println!(
            "  {} Created project '{}'",
            style("*").green().bold(),
            style(&meta.name).cyan()
        );
        println!("  UID:  {}", meta.uid);
        println!("  Root: {}", state.projects.project_dir(&meta.uid).display());
        println!("  Jobs: {}", meta.job_names().collect::<Vec<_>>().join(", "));
        println!();
    } else {
        println!("{}", meta.uid);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

async fn handle_list(state: &AppState, out: Output) -> Result<()> {
    let projects = state
        .projects
        .list()
        .await
        .context("Failed to list projects")?;

    let mut rows = Vec::with_capacity(projects.len());
    for meta in &projects {
        let statuses = state
            .projects
            .status_store(&meta.uid)
            .load()
            .await
            .ok()
            .flatten();
        let done = statuses
            .as_ref()
            .map(|s| s.iter().filter(|(_, st)| *st == JobStatus::Done).count())
            .unwrap_or(0);
        let failed = statuses
            .as_ref()
            .map(|s| s.iter().filter(|(_, st)| *st == JobStatus::Failed).count())
            .unwrap_or(0);
        rows.push((meta, done, failed));
    }

    if out.json {
        let out: Vec<_> = rows
            .iter()
            .map(|(meta, done, failed)| {
                serde_json::json!({
                    "uid": meta.uid,
                    "name": meta.name,
                    "recipe": meta.recipe,
                    "jobs": meta.jobs.len(),
                    "done": done,
                    "failed": failed,
                    "created_at": meta.created_at.to_rfc3339(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if rows.is_empty() {
        if !out.quiet {
            println!();
            println!("  No projects yet.");
            println!(
                "  Create one with: {}",
                style("glacium project new <name> --recipe <recipe>").dim()
            );
            println!();
        }
        return Ok(());
    }

    if out.quiet {
        for (meta, ..) in &rows {
            println!("{}", meta.uid);
        }
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("UID").fg(Color::Cyan),
            Cell::new("Name"),
            Cell::new("Recipe"),
            Cell::new("Jobs"),
            Cell::new("Done"),
            Cell::new("Failed"),
        ]);

    for (meta, done, failed) in &rows {
        let failed_cell = if *failed > 0 {
            Cell::new(failed).fg(Color::Red)
        } else {
            Cell::new(failed)
        };
        table.add_row(vec![
            Cell::new(&meta.uid),
            Cell::new(&meta.name),
            Cell::new(meta.recipe.as_deref().unwrap_or("-")),
            Cell::new(meta.jobs.len()),
            Cell::new(done),
            failed_cell,
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}
