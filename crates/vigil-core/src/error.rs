//! Error types for vigil-core

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine error types
#[derive(Debug, Error)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Malformed schedule expression or timezone
    #[error("invalid schedule expression '{expression}': {message}")]
    Schedule {
        /// The expression as supplied
        expression: String,
        /// What was wrong with it
        message: String,
    },

    /// No job definition matches the requested id
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub(crate) fn schedule(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schedule {
            expression: expression.into(),
            message: message.into(),
        }
    }
}
