//! Error types

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Platform secure storage could not be reached
    #[error("Cannot access secure storage: {0}")]
    KeyStoreUnavailable(String),

    /// Encrypted store could not be opened with the current key
    #[error("Store initialization failed: {0}")]
    StoreInit(String),

    /// Item write rejected by schema constraints
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Encryption error
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Store was closed while still in use
    #[error("Store is closed")]
    Closed,

    /// Background query task failed
    #[error("Background task failed: {0}")]
    Task(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Map a SQLite constraint failure to [`Error::ConstraintViolation`],
    /// passing every other error through unchanged.
    pub(crate) fn from_write(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref failure, ref message)
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Error::ConstraintViolation(
                    message
                        .clone()
                        .unwrap_or_else(|| failure.to_string()),
                )
            }
            other => Error::Database(other),
        }
    }

    /// Whether this error is fatal to any crypto-dependent operation.
    pub fn is_key_store_failure(&self) -> bool {
        matches!(self, Error::KeyStoreUnavailable(_))
    }
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
