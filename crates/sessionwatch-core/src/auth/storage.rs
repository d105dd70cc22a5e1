//! Durable key-value storage backends for the credential record.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use keyring::Entry;
use tracing::warn;

use crate::utils::lock;

/// Keychain service name for the keyring-backed store
const SERVICE_NAME: &str = "sessionwatch";

/// File name for the persisted record in the storage directory
const STORE_FILE: &str = "credentials.json";

/// Durable key-value storage for session credentials.
///
/// Calls on the same key are ordered; `clear` removes the whole namespace
/// as one logical step. Implementations log failures and report affected
/// keys as absent instead of surfacing errors, so broken storage degrades
/// to a signed-out session.
pub trait StorageBackend: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
    fn clear(&self);

    /// Write several keys as one logical step where the backend supports
    /// it. The default falls back to ordered single-key writes.
    fn set_many(&self, entries: &[(&str, &str)]) {
        for (key, value) in entries {
            self.set(key, value);
        }
    }
}

/// Ephemeral backend for tests and hosts without durable storage.
#[derive(Default)]
pub struct MemoryStore {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.map).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        lock(&self.map).insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        lock(&self.map).remove(key);
    }

    fn clear(&self) {
        lock(&self.map).clear();
    }

    fn set_many(&self, entries: &[(&str, &str)]) {
        let mut map = lock(&self.map);
        for (key, value) in entries {
            map.insert(key.to_string(), value.to_string());
        }
    }
}

/// Backend persisting the record as a JSON document on disk.
///
/// The document is loaded once at open and flushed whole on every
/// mutation, so multi-key writes are never observable half-done across
/// restarts.
pub struct FileStore {
    path: PathBuf,
    map: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Open a store backed by `credentials.json` under `dir`. Unreadable
    /// or corrupt files are logged and start empty.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let path = dir.into().join(STORE_FILE);
        let map = match Self::read_document(&path) {
            Ok(map) => map,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unreadable credential store, starting empty");
                HashMap::new()
            }
        };
        Self {
            path,
            map: Mutex::new(map),
        }
    }

    /// Open a store under the platform cache directory.
    pub fn open_default(app_name: &str) -> Result<Self> {
        let dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?
            .join(app_name);
        Ok(Self::open(dir))
    }

    fn read_document(path: &Path) -> Result<HashMap<String, String>> {
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let contents =
            std::fs::read_to_string(path).context("Failed to read credential store")?;
        serde_json::from_str(&contents).context("Failed to parse credential store")
    }

    fn flush(&self, map: &HashMap<String, String>) {
        let write = || -> Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let contents = serde_json::to_string_pretty(map)?;
            std::fs::write(&self.path, contents)?;
            Ok(())
        };
        if let Err(err) = write() {
            warn!(path = %self.path.display(), error = %err, "failed to persist credential store");
        }
    }
}

impl StorageBackend for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.map).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut map = lock(&self.map);
        map.insert(key.to_string(), value.to_string());
        self.flush(&map);
    }

    fn remove(&self, key: &str) {
        let mut map = lock(&self.map);
        map.remove(key);
        self.flush(&map);
    }

    fn clear(&self) {
        let mut map = lock(&self.map);
        map.clear();
        self.flush(&map);
    }

    fn set_many(&self, entries: &[(&str, &str)]) {
        let mut map = lock(&self.map);
        for (key, value) in entries {
            map.insert(key.to_string(), value.to_string());
        }
        self.flush(&map);
    }
}

/// Backend keeping the whole record as one JSON document in a single OS
/// keychain entry.
pub struct KeyringStore {
    account: String,
    map: Mutex<HashMap<String, String>>,
}

impl KeyringStore {
    /// Open the keychain entry for `account`, loading any existing record.
    /// Unreadable entries are logged and start empty.
    pub fn open(account: &str) -> Self {
        let map = match Self::read_entry(account) {
            Ok(map) => map,
            Err(err) => {
                warn!(account, error = %err, "unreadable keychain record, starting empty");
                HashMap::new()
            }
        };
        Self {
            account: account.to_string(),
            map: Mutex::new(map),
        }
    }

    fn entry(account: &str) -> Result<Entry> {
        Entry::new(SERVICE_NAME, account).context("Failed to create keyring entry")
    }

    fn read_entry(account: &str) -> Result<HashMap<String, String>> {
        let entry = Self::entry(account)?;
        match entry.get_password() {
            Ok(document) => {
                serde_json::from_str(&document).context("Failed to parse keychain record")
            }
            Err(keyring::Error::NoEntry) => Ok(HashMap::new()),
            Err(err) => Err(err).context("Failed to read keychain record"),
        }
    }

    fn flush(&self, map: &HashMap<String, String>) {
        let write = || -> Result<()> {
            let entry = Self::entry(&self.account)?;
            if map.is_empty() {
                match entry.delete_credential() {
                    Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                    Err(err) => Err(err).context("Failed to delete keychain record"),
                }
            } else {
                let document = serde_json::to_string(map)?;
                entry
                    .set_password(&document)
                    .context("Failed to store keychain record")
            }
        };
        if let Err(err) = write() {
            warn!(account = %self.account, error = %err, "failed to persist keychain record");
        }
    }
}

impl StorageBackend for KeyringStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.map).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut map = lock(&self.map);
        map.insert(key.to_string(), value.to_string());
        self.flush(&map);
    }

    fn remove(&self, key: &str) {
        let mut map = lock(&self.map);
        map.remove(key);
        self.flush(&map);
    }

    fn clear(&self) {
        let mut map = lock(&self.map);
        map.clear();
        self.flush(&map);
    }

    fn set_many(&self, entries: &[(&str, &str)]) {
        let mut map = lock(&self.map);
        for (key, value) in entries {
            map.insert(key.to_string(), value.to_string());
        }
        self.flush(&map);
    }
}
