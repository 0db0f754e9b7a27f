//! File system paths for the telemetry agent.

use crate::{ConfigError, ConfigResult};
use std::path::PathBuf;

/// Directory name under the home directory.
const BASE_DIR_NAME: &str = ".foxtelemetry";
/// Configuration file name.
const CONFIG_FILE_NAME: &str = "foxtelemetry.json";
/// SQLite queue database file name.
const QUEUE_DATABASE_NAME: &str = "queue.sqlite";
/// Line-delimited JSON queue written by agents before the SQLite store existed.
const LEGACY_QUEUE_NAME: &str = "foxtelemetry-queue.jsonl";
/// Install identifier file name.
const INSTALL_ID_NAME: &str = "install_id";

/// Manages file system paths for the agent.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for all agent state (~/.foxtelemetry)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.foxtelemetry`.
    pub fn new() -> ConfigResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| ConfigError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(BASE_DIR_NAME),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory.
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (`<base>/foxtelemetry.json`).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join(CONFIG_FILE_NAME)
    }

    /// Get the queue database path (`<base>/queue.sqlite`).
    pub fn queue_database_file(&self) -> PathBuf {
        self.base_dir.join(QUEUE_DATABASE_NAME)
    }

    /// Get the legacy JSONL queue path (`<base>/foxtelemetry-queue.jsonl`).
    pub fn legacy_queue_file(&self) -> PathBuf {
        self.base_dir.join(LEGACY_QUEUE_NAME)
    }

    /// Get the install identifier path (`<base>/install_id`).
    pub fn install_id_file(&self) -> PathBuf {
        self.base_dir.join(INSTALL_ID_NAME)
    }

    /// Ensure the base directory exists.
    pub fn ensure_dirs(&self) -> ConfigResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_with_base_dir() {
        let base = PathBuf::from("/tmp/test-foxtelemetry");
        let paths = Paths::with_base_dir(base.clone());

        assert_eq!(paths.base_dir(), &base);
        assert_eq!(paths.config_file(), base.join("foxtelemetry.json"));
        assert_eq!(paths.queue_database_file(), base.join("queue.sqlite"));
        assert_eq!(
            paths.legacy_queue_file(),
            base.join("foxtelemetry-queue.jsonl")
        );
        assert_eq!(paths.install_id_file(), base.join("install_id"));
    }

    #[test]
    fn test_paths_default() {
        let paths = Paths::new().unwrap();
        let home = dirs::home_dir().unwrap();

        assert_eq!(paths.base_dir(), &home.join(".foxtelemetry"));
    }

    #[test]
    fn test_ensure_dirs_idempotent() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("agent");
        let paths = Paths::with_base_dir(base.clone());

        assert!(!base.exists());

        paths.ensure_dirs().unwrap();
        paths.ensure_dirs().unwrap();

        assert!(base.is_dir());
    }
}
