use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "reladen")]
#[command(about = "Headless host for the Reladen simulation core")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// JSON configuration file; `RELADEN_*` environment variables otherwise
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Push pending local changes and pull cloud changes once
    Sync,
    /// Run one conversation scheduler tick
    Tick,
    /// Show pending and failed outbox entries
    Outbox {
        /// List every pending entry
        #[arg(long)]
        list: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show recent last-writer-wins conflicts
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the scheduler and periodic sync until interrupted
    Run,
}
