//! Domain errors for the Dragoman translation orchestrator.

use thiserror::Error;

use crate::domain::models::LeaseHolder;

/// Domain-level errors that can occur while driving the conversational surface.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Ownership denied: runtime lease is not available to {requester}")]
    OwnershipDenied { requester: LeaseHolder },

    #[error("Runtime launch failed: {0}")]
    LaunchFailed(String),

    #[error("Runtime install failed: {0}")]
    InstallFailed(String),

    #[error("Failed to write prompt into the interface: {0}")]
    UploadFailed(String),

    #[error("Failed to submit the prompt: {0}")]
    SendFailed(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Turn did not complete within {elapsed_secs}s")]
    TurnTimeout { elapsed_secs: u64 },

    #[error("Cancellation requested")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("I/O error: {0}")]
    Io(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Io(err.to_string())
    }
}
