//! Persisted per-plugin settings.
//!
//! Settings are a JSON object per plugin. The registry keeps each plugin's
//! `enabled` flag here; plugins store whatever else they need.

use crate::edit::{atomic_write, EditError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Key under which the registry stores a plugin's enabled state.
pub const ENABLED_KEY: &str = "enabled";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write settings to {path}: {source}")]
    Write { path: PathBuf, source: EditError },

    #[error("invalid settings JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// On-disk layout: `{ "plugins": { "<name>": { ... } } }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub plugins: BTreeMap<String, Map<String, Value>>,
}

impl SettingsFile {
    fn get(&self, plugin: &str, key: &str) -> Option<Value> {
        self.plugins.get(plugin)?.get(key).cloned()
    }

    fn set(&mut self, plugin: &str, key: &str, value: Value) {
        self.plugins
            .entry(plugin.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }
}

/// Key-value storage for plugin settings.
pub trait SettingsStore {
    fn get(&self, plugin: &str, key: &str) -> Option<Value>;

    fn set(&mut self, plugin: &str, key: &str, value: Value) -> Result<(), SettingsError>;

    /// Persisted enabled flag, `None` when the user never toggled the plugin.
    fn is_enabled(&self, plugin: &str) -> Option<bool> {
        self.get(plugin, ENABLED_KEY)?.as_bool()
    }

    fn set_enabled(&mut self, plugin: &str, enabled: bool) -> Result<(), SettingsError> {
        self.set(plugin, ENABLED_KEY, Value::Bool(enabled))
    }
}

/// Settings kept in memory only.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: SettingsFile,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> &SettingsFile {
        &self.data
    }
}

/// In-memory copy of already-read settings; later changes are not written
/// anywhere.
impl From<SettingsFile> for MemoryStore {
    fn from(data: SettingsFile) -> Self {
        Self { data }
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, plugin: &str, key: &str) -> Option<Value> {
        self.data.get(plugin, key)
    }

    fn set(&mut self, plugin: &str, key: &str, value: Value) -> Result<(), SettingsError> {
        self.data.set(plugin, key, value);
        Ok(())
    }
}

/// Settings persisted to a JSON file, rewritten atomically on every change.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    data: SettingsFile,
}

impl JsonFileStore {
    /// Open a settings file. A missing file starts out empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref().to_path_buf();
        let data = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => SettingsFile::default(),
            Ok(contents) => {
                serde_json::from_str(&contents).map_err(|source| SettingsError::Json {
                    path: path.clone(),
                    source,
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SettingsFile::default(),
            Err(source) => return Err(SettingsError::Read { path, source }),
        };
        Ok(Self { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> &SettingsFile {
        &self.data
    }

    fn persist(&self) -> Result<(), SettingsError> {
        let json = serde_json::to_string_pretty(&self.data).map_err(|source| SettingsError::Json {
            path: self.path.clone(),
            source,
        })?;
        atomic_write(&self.path, json.as_bytes()).map_err(|source| SettingsError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

impl SettingsStore for JsonFileStore {
    fn get(&self, plugin: &str, key: &str) -> Option<Value> {
        self.data.get(plugin, key)
    }

    fn set(&mut self, plugin: &str, key: &str, value: Value) -> Result<(), SettingsError> {
        self.data.set(plugin, key, value);
        self.persist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_store_roundtrip() {
        let mut store = MemoryStore::new();
        assert_eq!(store.is_enabled("NoTrack"), None);
        store.set_enabled("NoTrack", true).unwrap();
        store.set("NoTrack", "level", json!(3)).unwrap();
        assert_eq!(store.is_enabled("NoTrack"), Some(true));
        assert_eq!(store.get("NoTrack", "level"), Some(json!(3)));
        assert_eq!(store.get("Other", "level"), None);
    }

    #[test]
    fn test_json_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut store = JsonFileStore::open(&path).unwrap();
        store.set_enabled("NoTrack", false).unwrap();
        store.set("NoTrack", "mode", json!("strict")).unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.is_enabled("NoTrack"), Some(false));
        assert_eq!(reopened.get("NoTrack", "mode"), Some(json!("strict")));

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["plugins"]["NoTrack"]["enabled"], json!(false));
    }

    #[test]
    fn test_memory_copy_of_file_store_never_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let original = r#"{ "plugins": { "NoTrack": { "enabled": false } } }"#;
        fs::write(&path, original).unwrap();

        let file = JsonFileStore::open(&path).unwrap();
        let mut copy = MemoryStore::from(file.snapshot().clone());
        assert_eq!(copy.is_enabled("NoTrack"), Some(false));
        copy.set_enabled("NoTrack", true).unwrap();
        copy.set_enabled("Other", true).unwrap();

        assert_eq!(copy.is_enabled("NoTrack"), Some(true));
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_json_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            JsonFileStore::open(&path),
            Err(SettingsError::Json { .. })
        ));
    }
}
