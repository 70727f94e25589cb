//! Error types for CLI operations.

use contracts::ContractError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration loading or validation error
    #[error("Invalid configuration: {0}")]
    Config(#[source] ContractError),

    /// Manager operation error
    #[error("Session failed: {message}")]
    Session {
        message: String,
        #[source]
        source: ContractError,
    },

    /// Metrics exporter or runtime setup error
    #[error("Setup failed: {0}")]
    Setup(#[from] anyhow::Error),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn session(message: impl Into<String>, source: ContractError) -> Self {
        Self::Session {
            message: message.into(),
            source,
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Attach a description to a failed manager operation
pub trait SessionContext<T> {
    fn session_context(self, message: impl Into<String>) -> Result<T>;
}

impl<T> SessionContext<T> for std::result::Result<T, ContractError> {
    fn session_context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| CliError::session(message, e))
    }
}
