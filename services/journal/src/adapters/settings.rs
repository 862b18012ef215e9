//! services/journal/src/adapters/settings.rs
//!
//! File-backed implementation of the `KeyValueStore` port: a flat JSON object
//! of string keys to string values, rewritten in full on every `set`.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use for_me_core::ports::{KeyValueStore, PortError, PortResult};
use tracing::{info, warn};

pub struct JsonFileSettings {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl JsonFileSettings {
    /// Opens the settings file, creating an empty store when it does not exist.
    ///
    /// A file that is not a JSON object of strings is treated as empty and
    /// overwritten by the next `set`.
    pub fn open(path: impl AsRef<Path>) -> PortResult<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Ignoring unreadable settings file {}: {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No settings file at {}; starting empty.", path.display());
                BTreeMap::new()
            }
            Err(e) => return Err(PortError::Storage(e.to_string())),
        };
        Ok(Self { path, values: Mutex::new(values) })
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> PortResult<()> {
        let json = serde_json::to_string_pretty(values).map_err(|e| PortError::Storage(e.to_string()))?;
        // Staged write, then an atomic rename over the old file.
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, json).map_err(|e| PortError::Storage(e.to_string()))?;
        fs::rename(&staging, &self.path).map_err(|e| PortError::Storage(e.to_string()))
    }
}

impl KeyValueStore for JsonFileSettings {
    fn get(&self, key: &str) -> PortResult<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|_| PortError::Storage("settings lock poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> PortResult<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| PortError::Storage("settings lock poisoned".to_string()))?;
        let mut next = values.clone();
        next.insert(key.to_string(), value.to_string());
        self.persist(&next)?;
        *values = next;
        Ok(())
    }
}
