use std::io;

use reladen_core::scheduler::GeneratorError;
use reladen_core::sync::CloudError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] reladen_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Generator(#[from] GeneratorError),
    #[error(transparent)]
    Cloud(#[from] CloudError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Tick failed: {0}")]
    TickFailed(String),
    #[error("Scheduler halted: {0}")]
    Halted(String),
    #[error(
        "Sync is not configured. Set RELADEN_CLOUD_URL and RELADEN_CLOUD_ANON_KEY, or sync.cloudUrl and sync.anonKey in the config file."
    )]
    SyncNotConfigured,
    #[error(
        "Generator is not configured. Set RELADEN_GENERATOR_URL, or generator.endpoint in the config file."
    )]
    GeneratorNotConfigured,
}
