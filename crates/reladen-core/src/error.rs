//! Error types for reladen-core

use thiserror::Error;

use crate::scheduler::GeneratorError;
use crate::sync::CloudError;

/// Result type alias using reladen-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in reladen-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Conversation generator failure
    #[error("Generator error: {0}")]
    Generator(#[from] GeneratorError),

    /// Cloud table API failure
    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),
}

impl Error {
    /// Whether this error means the caller is no longer authorized and
    /// retrying cannot succeed until re-initialization.
    pub const fn is_unauthenticated(&self) -> bool {
        match self {
            Self::Generator(error) => error.is_unauthenticated(),
            Self::Cloud(error) => error.is_unauthenticated(),
            _ => false,
        }
    }
}
