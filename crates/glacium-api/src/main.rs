//! glacium CLI entry point.
//!
//! Binary name: `glacium`
//!
//! Parses CLI arguments, sets up tracing, loads configuration and
//! registries, then dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;
use glacium_observe::{TracingOptions, init_tracing, shutdown_tracing, verbosity_filter};

use cli::{Cli, Commands, Output};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = TracingOptions {
        filter: verbosity_filter(cli.verbose, cli.quiet).to_string(),
        format: cli.log_format.into(),
        otel: cli.otel,
    };
    if let Err(e) = init_tracing(&options) {
        eprintln!("Warning: failed to initialize tracing: {e}");
    }

    let result = dispatch(cli).await;
    shutdown_tracing();
    result
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "glacium", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init(cli.config.as_deref()).await?;
    let out = Output {
        json: cli.json,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Project { action } => {
            cli::project::handle_project_command(action, &state, out).await
        }
        Commands::Job { action } => cli::job::handle_job_command(action, &state, out).await,
        Commands::Recipe { action } => {
            cli::recipe::handle_recipe_command(action, &state, out).await
        }
        Commands::Pipeline { action } => {
            cli::pipeline::handle_pipeline_command(action, &state, out).await
        }
        Commands::Completions { .. } => Ok(()),
    }
}
