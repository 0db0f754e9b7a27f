//! Agent configuration.
//!
//! The configuration file is a JSON document with a single `foxTelemetry`
//! object:
//!
//! ```json
//! {
//!   "foxTelemetry": {
//!     "projectId": "proj_123",
//!     "appId": "app_456",
//!     "packageName": "com.example.app",
//!     "endpoint": "https://ingest.example.com/v1/events",
//!     "ingestKey": "fk_live_abc",
//!     "environment": "production"
//!   }
//! }
//! ```

use crate::{ConfigError, ConfigResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";
/// Default maximum number of stack frames recorded per exception.
pub const DEFAULT_MAX_STACK_FRAMES: usize = 80;
/// Default ceiling on queued events.
pub const DEFAULT_MAX_QUEUE_EVENTS: u64 = 10_000;
/// Default ceiling on queued payload bytes (10 MiB).
pub const DEFAULT_MAX_QUEUE_BYTES: u64 = 10 * 1024 * 1024;
/// Default number of events per upload.
pub const DEFAULT_BATCH_SIZE: usize = 50;
/// Default connect and request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 8;

/// Environment variable overriding the log level.
const ENV_LOG_LEVEL: &str = "FOXTEL_LOG_LEVEL";
/// Environment variable overriding the environment tag.
const ENV_ENVIRONMENT: &str = "FOXTEL_ENVIRONMENT";

/// Telemetry agent configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryConfig {
    /// Project identifier attached to every batch.
    pub project_id: String,
    /// Application identifier attached to every batch.
    pub app_id: String,
    /// Package name of the host application.
    pub package_name: String,
    /// Ingestion endpoint URL.
    pub endpoint: String,
    /// Tenant credential sent in the ingest-key header.
    pub ingest_key: String,
    /// Deployment environment tag (e.g. "production").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// Application user identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Install a panic hook that reports uncaught panics.
    #[serde(default = "default_true")]
    pub enable_crash_capture: bool,
    /// Maximum stack frames recorded per exception.
    #[serde(default = "default_max_stack_frames")]
    pub max_stack_frames: usize,
    /// Allow plaintext `http://` endpoints.
    #[serde(default)]
    pub allow_http: bool,
    /// Retention ceiling on queued events.
    #[serde(default = "default_max_queue_events")]
    pub max_queue_events: u64,
    /// Retention ceiling on queued payload bytes.
    #[serde(default = "default_max_queue_bytes")]
    pub max_queue_bytes: u64,
    /// Events per upload.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Connect and request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// On-disk wrapper: the agent's settings live under a `foxTelemetry` key.
#[derive(Debug, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(rename = "foxTelemetry")]
    fox_telemetry: TelemetryConfig,
}

fn default_true() -> bool {
    true
}

fn default_max_stack_frames() -> usize {
    DEFAULT_MAX_STACK_FRAMES
}

fn default_max_queue_events() -> u64 {
    DEFAULT_MAX_QUEUE_EVENTS
}

fn default_max_queue_bytes() -> u64 {
    DEFAULT_MAX_QUEUE_BYTES
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl TelemetryConfig {
    /// Create a configuration from the required identifiers, with defaults for
    /// everything else.
    pub fn new(
        project_id: impl Into<String>,
        app_id: impl Into<String>,
        package_name: impl Into<String>,
        endpoint: impl Into<String>,
        ingest_key: impl Into<String>,
    ) -> ConfigResult<Self> {
        let mut config = Self {
            project_id: project_id.into(),
            app_id: app_id.into(),
            package_name: package_name.into(),
            endpoint: endpoint.into(),
            ingest_key: ingest_key.into(),
            environment: None,
            user_id: None,
            enable_crash_capture: true,
            max_stack_frames: DEFAULT_MAX_STACK_FRAMES,
            allow_http: false,
            max_queue_events: DEFAULT_MAX_QUEUE_EVENTS,
            max_queue_bytes: DEFAULT_MAX_QUEUE_BYTES,
            batch_size: DEFAULT_BATCH_SIZE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load the configuration file from its standard location, then apply
    /// environment overrides.
    pub fn load(paths: &Paths) -> ConfigResult<Self> {
        Self::load_path(&paths.config_file())
    }

    /// Load configuration from `path`, then apply environment overrides.
    pub fn load_path(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::Invalid(format!(
                "no configuration file at {}",
                path.display()
            )));
        }

        let mut config = Self::load_from_file(path)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Parse and validate a `{"foxTelemetry": {...}}` document.
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        let file: ConfigFile = serde_json::from_str(content)?;
        let mut config = file.fox_telemetry;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to its standard location.
    pub fn save(&self, paths: &Paths) -> ConfigResult<()> {
        paths.ensure_dirs()?;
        let file = ConfigFile {
            fox_telemetry: self.clone(),
        };
        let content = serde_json::to_string_pretty(&file)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Check required fields and clamp numeric settings into range.
    pub fn validate(&mut self) -> ConfigResult<()> {
        require("projectId", &self.project_id)?;
        require("appId", &self.app_id)?;
        require("packageName", &self.package_name)?;
        require("endpoint", &self.endpoint)?;
        require("ingestKey", &self.ingest_key)?;
        self.endpoint_url()?;

        self.max_stack_frames = self.max_stack_frames.max(1);
        self.batch_size = self.batch_size.max(1);
        self.timeout_secs = self.timeout_secs.max(1);
        Ok(())
    }

    /// Get the endpoint as a parsed URL.
    pub fn endpoint_url(&self) -> ConfigResult<Url> {
        Url::parse(self.endpoint.trim()).map_err(ConfigError::from)
    }

    /// Return a copy with a different user identifier.
    pub fn with_user_id(&self, user_id: Option<String>) -> Self {
        Self {
            user_id,
            ..self.clone()
        }
    }

    /// Override settings from environment-style variables.
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(ENV_LOG_LEVEL).and_then(non_empty) {
            self.log_level = level;
        }
        if let Some(environment) = lookup(ENV_ENVIRONMENT).and_then(non_empty) {
            self.environment = Some(environment);
        }
    }
}

fn require(name: &str, value: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{name} required")));
    }
    Ok(())
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
