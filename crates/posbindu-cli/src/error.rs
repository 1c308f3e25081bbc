use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] posbindu_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Patient not found for code: {0}")]
    PatientNotFound(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error("Sync pass aborted: {0}")]
    SyncAborted(String),
    #[error("Cannot sync while offline")]
    Offline,
    #[error(
        "Remote is not configured. Run `posbindu config init --api-base-url <URL>` or set POSBINDU_API_URL."
    )]
    RemoteNotConfigured,
}
