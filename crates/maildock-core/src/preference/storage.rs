//! Durable key-value storage for preferences.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{StorageError, StorageResult};

/// String-valued durable storage.
pub trait PreferenceStorage: Send + Sync + 'static {
    /// Reads `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn load(&self, key: &str) -> StorageResult<Option<String>>;

    /// Writes `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store refuses the write.
    fn store(&self, key: &str, value: &str) -> StorageResult<()>;
}

/// Preferences kept as a flat JSON object in a file.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    /// Uses the file at `path`. It is created on the first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `settings.json` in the platform config directory.
    #[must_use]
    pub fn default_location() -> Self {
        let path = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("maildock")
            .join("settings.json");
        Self::new(path)
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> StorageResult<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(Map::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }
}

impl PreferenceStorage for JsonFileStorage {
    fn load(&self, key: &str) -> StorageResult<Option<String>> {
        let document = self.read_document()?;
        Ok(document
            .get(key)
            .and_then(Value::as_str)
            .map(ToString::to_string))
    }

    fn store(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut document = self.read_document().unwrap_or_else(|err| {
            warn!(path = ?self.path, error = %err, "replacing unreadable settings file");
            Map::new()
        });
        document.insert(key.to_string(), Value::String(value.to_string()));

        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let contents = serde_json::to_string_pretty(&document)?;
        std::fs::write(&self.path, contents)?;
        debug!(path = ?self.path, key, "preference saved");
        Ok(())
    }
}

/// In-memory storage, for tests and profiles without a writable disk.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
}

impl MemoryStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later read and write fail, or succeed again.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> StorageResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("storage quota exceeded".to_string()));
        }
        Ok(())
    }
}

impl PreferenceStorage for MemoryStorage {
    fn load(&self, key: &str) -> StorageResult<Option<String>> {
        self.check()?;
        Ok(self
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn store(&self, key: &str, value: &str) -> StorageResult<()> {
        self.check()?;
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
