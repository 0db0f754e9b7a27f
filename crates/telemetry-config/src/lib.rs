//! Configuration, file system layout, and logging for the FoxTelemetry agent.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    TelemetryConfig, DEFAULT_BATCH_SIZE, DEFAULT_LOG_LEVEL, DEFAULT_MAX_QUEUE_BYTES,
    DEFAULT_MAX_QUEUE_EVENTS, DEFAULT_MAX_STACK_FRAMES, DEFAULT_TIMEOUT_SECS,
};
pub use error::{ConfigError, ConfigResult};
pub use logging::{init_logging, init_logging_with, parse_level, LogConfig, LogFormat};
pub use paths::Paths;
