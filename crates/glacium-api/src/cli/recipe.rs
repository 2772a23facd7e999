//! CLI recipe subcommands.

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use glacium_core::event::EventBus;
use glacium_core::job::ProjectContext;
use glacium_types::recipe::split_chain;

use super::Output;
use crate::state::AppState;

#[derive(Subcommand)]
pub enum RecipeCommand {
    /// List registered recipes.
    #[command(alias = "ls")]
    List,

    /// Add the jobs a recipe defines but the project lacks.
    Sync {
        /// Project uid.
        project: String,

        /// Recipe reference, chains joined with `+`.
        recipe: String,
    },
}

pub async fn handle_recipe_command(
    cmd: RecipeCommand,
    state: &AppState,
    out: Output,
) -> Result<()> {
    match cmd {
        RecipeCommand::List => handle_list(state, out),
        RecipeCommand::Sync { project, recipe } => handle_sync(state, &project, &recipe, out).await,
    }
}

fn handle_list(state: &AppState, out: Output) -> Result<()> {
    // Job lists of config recipes do not depend on the project.
    let probe = ProjectContext::new("", state.projects.runs_root());
    let recipes: Vec<_> = state
        .recipes
        .names()
        .into_iter()
        .map(|name| {
            let jobs = state
                .recipes
                .build(name, &probe)
                .map(|specs| specs.into_iter().map(|s| s.name).collect::<Vec<_>>())
                .unwrap_or_default();
            (name, state.recipes.describe(name).unwrap_or_default(), jobs)
        })
        .collect();

    if out.json {
        let out: Vec<_> = recipes
            .iter()
            .map(|(name, description, jobs)| {
                serde_json::json!({
                    "name": name,
                    "description": description,
                    "jobs": jobs,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if out.quiet {
        for (name, ..) in &recipes {
            println!("{name}");
        }
        return Ok(());
    }

    if recipes.is_empty() {
        println!();
        println!("  No recipes registered.");
        println!(
            "  Define one under {} in {}",
            style("[[recipes]]").dim(),
            style(state.data_dir.join("glacium.toml").display()).dim()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Recipe").fg(Color::Cyan),
            Cell::new("Description"),
            Cell::new("Jobs"),
        ]);
    for (name, description, jobs) in &recipes {
        table.add_row(vec![
            Cell::new(name),
            Cell::new(description),
            Cell::new(jobs.join(", ")),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

async fn handle_sync(state: &AppState, uid: &str, reference: &str, out: Output) -> Result<()> {
    let members = split_chain(reference);
    if members.is_empty() {
        bail!("Empty recipe reference '{reference}'");
    }

    let (mut meta, mut manager) = state.open_project(uid, EventBus::default()).await?;
    let added = manager
        .sync_recipes(&state.recipes, &members)
        .await
        .with_context(|| format!("Failed to sync recipe '{reference}' into '{uid}'"))?;
    if meta.recipe.is_none() {
        meta.recipe = Some(reference.to_string());
    }
    state.save_specs(&mut meta, &manager).await?;

    if out.json {
        println!("{}", serde_json::json!({ "project": uid, "added": added }));
    } else if !out.quiet {
        if added.is_empty() {
            println!("  Project '{uid}' already has every job of '{reference}'.");
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
