//! CLI-specific error types
//!
//! All CLI errors end the process with exit code 1. Display output starts
//! with the error code string.

use std::io;

use thiserror::Error;

use crate::store::StoreError;

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    /// Bad or missing configuration, or an argument the shard rejects
    #[error("SHARD_CLI_CONFIG_ERROR: {0}")]
    Config(String),

    /// Writing the response failed
    #[error("SHARD_CLI_IO_ERROR: {0}")]
    Io(String),

    /// The shard could not be opened or read
    #[error("SHARD_CLI_STORE_ERROR: {0}")]
    Store(String),
}

impl CliError {
    pub fn code_str(&self) -> &'static str {
        match self {
            Self::Config(_) => "SHARD_CLI_CONFIG_ERROR",
            Self::Io(_) => "SHARD_CLI_IO_ERROR",
            Self::Store(_) => "SHARD_CLI_STORE_ERROR",
        }
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::Io(format!("JSON error: {}", e))
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        let message = format!("{} ({})", e, e.code());
        match e {
            StoreError::InvalidConfig(_) | StoreError::UnknownBackend(_) => Self::Config(message),
            _ => Self::Store(message),
        }
    }
}
