//! Agent error types.

use thiserror::Error;

/// Errors raised while setting up the agent.
///
/// Capture and flush never return these; they log and carry on.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Configuration error
    #[error("Config error: {0}")]
    Config(#[from] telemetry_config::ConfigError),

    /// Event store error
    #[error("Store error: {0}")]
    Store(#[from] telemetry_queue::StoreError),

    /// Ingest client error
    #[error("Ingest error: {0}")]
    Ingest(#[from] telemetry_ingest::IngestError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type alias using AgentError.
pub type AgentResult<T> = Result<T, AgentError>;
