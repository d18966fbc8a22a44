//! Durable client storage.
//!
//! Only the last-connected address is ever persisted; chain id and signer are
//! re-derived from the wallet after a restart.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::error::WalletError;

/// Key under which the last-connected address is stored.
pub const LAST_ACCOUNT_KEY: &str = "hedera_account";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, WalletError>;
    fn set(&self, key: &str, value: &str) -> Result<(), WalletError>;
    fn remove(&self, key: &str) -> Result<(), WalletError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, WalletError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), WalletError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), WalletError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// JSON object on disk, rewritten atomically on every change.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, WalletError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                WalletError::StorageError(format!("create {}: {e}", parent.display()))
            })?;
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    /// `<state_dir>/wallet-session.json`
    pub fn in_dir(state_dir: &Path) -> Result<Self, WalletError> {
        Self::open(state_dir.join("wallet-session.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<BTreeMap<String, String>, WalletError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(WalletError::StorageError(format!(
                "read {}: {e}",
                self.path.display()
            ))),
        }
    }

    /// Entries to modify. An unparsable file is discarded so the store can
    /// still be written (and cleared) afterwards; the flag reports that.
    fn read_for_update(&self) -> Result<(BTreeMap<String, String>, bool), WalletError> {
        match self.read() {
            Ok(entries) => Ok((entries, false)),
            Err(WalletError::SerializationError(e)) => {
                tracing::warn!(path = %self.path.display(), "Discarding corrupt session file: {e}");
                Ok((BTreeMap::new(), true))
            }
            Err(e) => Err(e),
        }
    }

    fn write(&self, entries: &BTreeMap<String, String>) -> Result<(), WalletError> {
        let tmp = self.path.with_extension("json.tmp");
        let raw = serde_json::to_vec_pretty(entries)?;
        std::fs::write(&tmp, raw)
            .and_then(|()| std::fs::rename(&tmp, &self.path))
            .map_err(|e| WalletError::StorageError(format!("write {}: {e}", self.path.display())))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, WalletError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), WalletError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut entries, _) = self.read_for_update()?;
        entries.insert(key.to_string(), value.to_string());
        self.write(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), WalletError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut entries, discarded) = self.read_for_update()?;
        if entries.remove(key).is_some() || discarded {
            self.write(&entries)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert_eq!(store.get(LAST_ACCOUNT_KEY).unwrap(), None);
        store.set(LAST_ACCOUNT_KEY, "0xabc").unwrap();
        assert_eq!(store.get(LAST_ACCOUNT_KEY).unwrap().as_deref(), Some("0xabc"));
        store.remove(LAST_ACCOUNT_KEY).unwrap();
        assert_eq!(store.get(LAST_ACCOUNT_KEY).unwrap(), None);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::in_dir(dir.path()).unwrap();
        store.set(LAST_ACCOUNT_KEY, "0xabc").unwrap();
        store.set("theme", "dark").unwrap();
        drop(store);

        let reopened = FileStore::in_dir(dir.path()).unwrap();
        assert_eq!(reopened.get(LAST_ACCOUNT_KEY).unwrap().as_deref(), Some("0xabc"));

        reopened.remove(LAST_ACCOUNT_KEY).unwrap();
        let again = FileStore::in_dir(dir.path()).unwrap();
        assert_eq!(again.get(LAST_ACCOUNT_KEY).unwrap(), None);
        assert_eq!(again.get("theme").unwrap().as_deref(), Some("dark"));
    }

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("nested/state.json")).unwrap();
        assert_eq!(store.get(LAST_ACCOUNT_KEY).unwrap(), None);
        store.remove(LAST_ACCOUNT_KEY).unwrap();
    }

    #[test]
    fn test_file_store_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::in_dir(dir.path()).unwrap();
        std::fs::write(store.path(), "{not json").unwrap();
        assert!(store.get(LAST_ACCOUNT_KEY).is_err());
    }

    #[test]
    fn test_file_store_recovers_from_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::in_dir(dir.path()).unwrap();
        std::fs::write(store.path(), "{not json").unwrap();

        store.remove(LAST_ACCOUNT_KEY).unwrap();
        assert_eq!(store.get(LAST_ACCOUNT_KEY).unwrap(), None);

        std::fs::write(store.path(), "[1, 2").unwrap();
        store.set(LAST_ACCOUNT_KEY, "0xabc").unwrap();
        assert_eq!(store.get(LAST_ACCOUNT_KEY).unwrap().as_deref(), Some("0xabc"));
    }
}
