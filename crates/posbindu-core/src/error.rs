//! Error types for posbindu-core

use std::time::Duration;

use thiserror::Error;

/// Result type alias using posbindu-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in posbindu-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Remote rejected the payload shape or a business rule
    #[error("Validation error: {0}")]
    Validation(String),

    /// Remote could not be reached, or answered with a server failure
    #[error("Network error: {0}")]
    Network(String),

    /// Remote call exceeded the request timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Bearer credential missing, invalid, or expired
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Local store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Every patient code candidate collided with an existing code
    #[error("Could not generate a unique patient code after {attempts} attempts")]
    CodeExhausted { attempts: usize },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Network and timeout failures are worth another attempt through the queue.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }

    /// Failures of the local store rather than the remote.
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::LibSql(_) | Self::Io(_))
    }

    pub const fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}
