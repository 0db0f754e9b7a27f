//! Stable per-installation identifier.

use parking_lot::Mutex;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

static CREATE_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Backing storage for the install id.
pub trait InstallIdStorage: Send + Sync {
    /// Stored value, if any.
    fn get(&self) -> io::Result<Option<String>>;
    /// Persist a new value.
    fn set(&self, id: &str) -> io::Result<()>;
}

/// Install id kept in a small text file.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl InstallIdStorage for FileStorage {
    fn get(&self) -> io::Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set(&self, id: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, id)?;
        std::fs::rename(&tmp, &self.path)
    }
}

/// Return the stored install id, generating and persisting a UUID when the
/// stored value is missing or blank. The id is never logged.
pub fn get_or_create(storage: &dyn InstallIdStorage) -> io::Result<String> {
    let _guard = CREATE_LOCK.lock();

    if let Some(existing) = storage.get()? {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }

    let id = Uuid::new_v4().to_string();
    storage.set(&id)?;
    debug!("Generated new install id");
    Ok(id)
}
