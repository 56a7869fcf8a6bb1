//! evalflow CLI entry point.
//!
//! Binary name: `evalflow`
//!
//! Parses CLI arguments, initializes tracing, the checkpoint database and the
//! provider registry, then dispatches to the appropriate command handler.

mod cli;
mod state;

use clap::Parser;
use evalflow_observe::tracing_setup::{TracingOptions, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&TracingOptions {
        enable_otel: cli.otel,
        json: cli.log_json,
        default_filter: cli.log_filter().to_string(),
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let state = AppState::init().await?;
    let json = cli.json;

    match cli.command {
        Commands::Start(args) => cli::run::start(&state, args, json).await?,
        Commands::Review(args) => cli::run::review(&state, args, json).await?,
        Commands::Score(args) => cli::run::score(&state, args, json).await?,
        Commands::Cancel { thread_id } => cli::run::cancel(&state, &thread_id, json).await?,
        Commands::State { thread_id } => cli::run::show_state(&state, &thread_id, json).await?,
        Commands::List { status, limit } => {
            cli::run::list_threads(&state, status, limit, json).await?;
        }
        Commands::Config => cli::config::show_config(&state, json)?,
    }

    Ok(())
}
