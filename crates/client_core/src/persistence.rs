//! Durable storage for the one persisted client setting: the backend base
//! address.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, Context, Result};
use tracing::{debug, warn};

pub const API_BASE_URL_KEY: &str = "api_base_url";
const SETTINGS_DIR_NAME: &str = "gramgateway";
const SETTINGS_FILE_NAME: &str = "settings.json";

/// Key/value string slot.
pub trait SettingsStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn save(&self, key: &str, value: &str) -> Result<()>;
}

/// JSON object on disk, one string per key.
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config_dir>/gramgateway/settings.json`.
    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| anyhow!("no config or home directory available"))?;
        Ok(base.join(SETTINGS_DIR_NAME).join(SETTINGS_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read '{}'", self.path.display()))
            }
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse settings file '{}'", self.path.display()))
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        // An unreadable file is replaced rather than blocking the write.
        let mut entries = self.read_all().unwrap_or_default();
        entries.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create settings directory '{}'", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(&entries)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("failed to write '{}'", self.path.display()))
    }
}

#[derive(Default)]
pub struct MemorySettingsStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("settings lock poisoned"))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Side-effect listener for endpoint changes. Persistence is not critical:
/// every failure is logged and swallowed.
#[derive(Clone)]
pub struct PersistenceBridge {
    store: Arc<dyn SettingsStore>,
}

impl PersistenceBridge {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    pub fn restore_endpoint(&self) -> Option<String> {
        match self.store.load(API_BASE_URL_KEY) {
            Ok(Some(value)) if !value.trim().is_empty() => {
                debug!(base_url = %value, "restored persisted api base url");
                Some(value)
            }
            Ok(_) => None,
            Err(err) => {
                warn!(error = %err, "failed to read persisted api base url");
                None
            }
        }
    }

    pub fn persist_endpoint(&self, base_url: &str) {
        if let Err(err) = self.store.save(API_BASE_URL_KEY, base_url) {
            warn!(error = %err, "failed to persist api base url");
        }
    }
}
