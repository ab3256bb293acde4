//! Last-known-position persistence.
//!
//! Handlers cache their most recent fix in a key-value store keyed by
//! handler name so `get_last_position` survives a daemon restart. The store
//! format is private to this module.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::position::{Accuracy, AccuracyLevel, Position};

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read store {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write store {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt store {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Serialized form of a fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFix {
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub climb: Option<f64>,
    #[serde(default)]
    pub accuracy_level: AccuracyLevel,
    #[serde(default)]
    pub horizontal: f64,
    #[serde(default)]
    pub vertical: f64,
}

impl StoredFix {
    pub fn new(position: &Position, accuracy: &Accuracy) -> Self {
        Self {
            timestamp: position.timestamp(),
            latitude: position.latitude(),
            longitude: position.longitude(),
            altitude: position.altitude(),
            speed: position.speed(),
            direction: position.direction(),
            climb: position.climb(),
            accuracy_level: accuracy.level,
            horizontal: accuracy.horizontal,
            vertical: accuracy.vertical,
        }
    }

    /// Rebuild the fix. Returns `None` if the stored coordinates are invalid.
    pub fn to_fix(&self) -> Option<(Position, Accuracy)> {
        let mut position = Position::new(self.timestamp, self.latitude, self.longitude)?;
        if let Some(v) = self.altitude {
            position = position.with_altitude(v);
        }
        if let Some(v) = self.speed {
            position = position.with_speed(v);
        }
        if let Some(v) = self.direction {
            position = position.with_direction(v);
        }
        if let Some(v) = self.climb {
            position = position.with_climb(v);
        }
        Some((
            position,
            Accuracy::new(self.accuracy_level, self.horizontal, self.vertical),
        ))
    }
}

/// Key-value store for last-known fixes.
pub trait PositionStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<StoredFix>, StoreError>;
    fn put(&self, key: &str, fix: &StoredFix) -> Result<(), StoreError>;
    /// Returns whether the key existed.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

/// In-memory store, used when persistence is disabled and in tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredFix>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PositionStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<StoredFix>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put(&self, key: &str, fix: &StoredFix) -> Result<(), StoreError> {
        self.entries.lock().insert(key.to_string(), fix.clone());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.lock().remove(key).is_some())
    }
}

/// Store backed by a single JSON document.
///
/// The whole map is loaded on open and rewritten on every change through a
/// temporary file and rename, so a crash never leaves a half-written file.
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, StoredFix>>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => HashMap::new(),
            Ok(content) => {
                serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
                    path: path.clone(),
                    source,
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(source) => return Err(StoreError::Read { path, source }),
        };

        tracing::debug!(path = %path.display(), entries = entries.len(), "Position store opened");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &HashMap<String, StoredFix>) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let json = serde_json::to_string_pretty(entries).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json).map_err(write_err)?;
        std::fs::rename(&tmp, &self.path).map_err(write_err)
    }
}

impl PositionStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<StoredFix>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put(&self, key: &str, fix: &StoredFix) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), fix.clone());
        self.flush(&entries)
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock();
        let existed = entries.remove(key).is_some();
        if existed {
            self.flush(&entries)?;
        }
        Ok(existed)
    }
}
