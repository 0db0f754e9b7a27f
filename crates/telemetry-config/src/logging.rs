//! Logging initialization for the agent and its tools.
//!
//! Library code only emits `tracing` events; binaries call `init_logging`
//! once at startup. `RUST_LOG` always wins over the configured level.

use tracing_subscriber::EnvFilter;

/// Output format of the diagnostic log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Compact human-readable lines.
    #[default]
    Compact,
    /// One JSON object per line.
    Json,
}

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level filter (e.g., "debug", "info", "warn").
    pub default_level: String,
    /// Output format.
    pub format: LogFormat,
    /// Include the event target (module path) in each line.
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: "info".into(),
            format: LogFormat::Compact,
            with_target: true,
        }
    }
}

/// Initialize logging to stderr at the given default level.
///
/// ```ignore
/// init_logging("info");
/// tracing::info!("agent started");
/// ```
pub fn init_logging(level: &str) {
    init_logging_with(LogConfig {
        default_level: level.into(),
        ..Default::default()
    });
}

/// Initialize logging with a custom configuration.
///
/// Returns false when a global subscriber was already installed.
pub fn init_logging_with(config: LogConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(parse_level(&config.default_level).as_str()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_writer(std::io::stderr);

    let result = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.is_ok()
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
