//! Store error types.

use thiserror::Error;

/// Event store error type.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Executor connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Event payload is not a JSON object
    #[error("Invalid event: {0}")]
    InvalidEvent(String),
}

impl StoreError {
    /// True when the failure came from the persistence layer (the event is lost).
    pub fn is_io_failure(&self) -> bool {
        matches!(
            self,
            StoreError::Sqlite(_) | StoreError::Connection(_) | StoreError::Io(_)
        )
    }
}

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;
