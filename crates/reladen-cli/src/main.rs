//! Reladen CLI - headless host for the simulation core
//!
//! Runs sync passes and scheduler ticks against the local database, for
//! servers and for inspecting a device's store from the terminal.

mod cli;
mod commands;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::common::{load_config, resolve_db_path};
use crate::commands::outbox::{run_conflicts, run_outbox};
use crate::commands::run::run_host;
use crate::commands::sync::run_sync;
use crate::commands::tick::run_tick;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("reladen=info,reladen_core=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let db_path = resolve_db_path(cli.db_path, &config);

    match cli.command {
        Commands::Sync => run_sync(&config, &db_path).await?,
        Commands::Tick => run_tick(&config, &db_path).await?,
        Commands::Outbox { list, json } => run_outbox(list, json, &db_path).await?,
        Commands::Conflicts { limit, json } => run_conflicts(limit, json, &db_path).await?,
        Commands::Run => run_host(&config, &db_path).await?,
    }

    Ok(())
}
