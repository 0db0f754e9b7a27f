//! Ingest error types.

use thiserror::Error;

/// Errors raised while preparing or sending a batch.
///
/// Network failures are not errors here; the transport reports them as a
/// [`crate::FlushOutcome`].
#[derive(Error, Debug)]
pub enum IngestError {
    /// A stored payload could not be embedded in the batch
    #[error("Cannot encode event {id}: {reason}")]
    Encode { id: i64, reason: String },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Gzip compression failed
    #[error("Compression error: {0}")]
    Compression(#[from] std::io::Error),

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint is not a usable URL
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Result type alias using IngestError.
pub type IngestResult<T> = Result<T, IngestError>;
