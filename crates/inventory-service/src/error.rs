//! Error types

use crate::validation::ValidationErrors;

/// Service errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Storage layer failure
    #[error(transparent)]
    Storage(#[from] inventory_storage_sqlite::Error),

    /// Settings form rejected
    #[error("Invalid settings: {0}")]
    Validation(ValidationErrors),

    /// Export or file-copy failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Background task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// Action needs an item that has not been loaded (or no longer exists)
    #[error("Item not found: {0}")]
    NotFound(i64),
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Task(err.to_string())
    }
}

impl From<ValidationErrors> for Error {
    fn from(errors: ValidationErrors) -> Self {
        Error::Validation(errors)
    }
}

impl Error {
    /// User-facing message; secure-storage failures get the fixed wording.
    pub fn user_message(&self) -> String {
        match self {
            Error::Storage(e) if e.is_key_store_failure() => {
                "Cannot access secure storage".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
