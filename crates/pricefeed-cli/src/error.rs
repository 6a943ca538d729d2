//! CLI error types.

use thiserror::Error;

/// CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// No asset ids given.
    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Price source could not be opened.
    #[error("Price source error: {0}")]
    Source(String),

    /// The subscription ended with an error.
    #[error("Subscription failed: {0}")]
    Subscription(String),
}

/// CLI result type.
pub type CliResult<T> = Result<T, CliError>;
