//! Settings store backends.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::info;

use crate::error::{GateError, Result};

/// Single-value settings persistence.
pub trait SettingsStore: Send + Sync {
    /// Current settings value.
    fn get(&self) -> String;

    /// Replaces the settings value.
    fn put(&self, value: &str) -> Result<()>;
}

// == Memory Store ==
/// Settings held only in memory; lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    value: Mutex<String>,
}

impl MemoryStore {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            value: Mutex::new(initial.into()),
        }
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self) -> String {
        self.value.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn put(&self, value: &str) -> Result<()> {
        *self.value.lock().unwrap_or_else(|e| e.into_inner()) = value.to_string();
        Ok(())
    }
}

// == File Store ==
/// Settings mirrored to a file.
///
/// The file is read once at construction; afterwards the in-memory copy is
/// authoritative and every `put` rewrites the file.
#[derive(Debug)]
pub struct FileStore {
    value: Mutex<String>,
    path: PathBuf,
}

impl FileStore {
    /// Loads `path`, treating a missing file as empty settings.
    ///
    /// # Errors
    /// `GateError::Config` if the file exists but cannot be read.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let value = match std::fs::read_to_string(&path) {
            Ok(value) => value,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(GateError::Config(format!(
                    "cannot read settings file {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        info!("Loaded settings from {}", path.display());
        Ok(Self {
            value: Mutex::new(value),
            path,
        })
    }
}

impl SettingsStore for FileStore {
    fn get(&self) -> String {
        self.value.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn put(&self, value: &str) -> Result<()> {
        let mut current = self.value.lock().unwrap_or_else(|e| e.into_inner());
        // Memory is updated even if the write fails.
        *current = value.to_string();

        std::fs::write(&self.path, value).map_err(|e| {
            GateError::Storage(format!(
                "cannot write settings file {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new("alpha");
        assert_eq!(store.get(), "alpha");

        store.put("alpha;beta").unwrap();
        assert_eq!(store.get(), "alpha;beta");
    }

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("settings.txt")).unwrap();

        assert_eq!(store.get(), "");
    }

    #[test]
    fn test_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.txt");

        let store = FileStore::open(&path).unwrap();
        store.put("alpha;beta").unwrap();

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get(), "alpha;beta");
    }

    #[test]
    fn test_file_store_unreadable_is_config_error() {
        let dir = tempfile::tempdir().unwrap();

        // A directory cannot be read as a string
        let result = FileStore::open(dir.path());
        assert!(matches!(result, Err(GateError::Config(_))));
    }

    #[test]
    fn test_file_store_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("settings.txt");
        let store = FileStore::open(&path).unwrap();

        assert!(matches!(store.put("x"), Err(GateError::Storage(_))));
    }
}
