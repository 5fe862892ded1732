use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use keyring::Entry;
use tracing::debug;

use crate::error::{ApiError, Result};

/// Storage key for the cached resource manifest
pub const MANIFEST_KEY: &str = "base_resource.manifest";
/// Storage key for the manifest cache ETag
pub const MANIFEST_ETAG_KEY: &str = "base_resource.manifest_etag";
/// Secure-storage key for the access token
pub const ACCESS_TOKEN_KEY: &str = "auth.access_token";
/// Secure-storage key for the refresh token
pub const REFRESH_TOKEN_KEY: &str = "auth.refresh_token";
/// Secure-storage key for the company slug
pub const COMPANY_KEY: &str = "auth.company";

/// Platform-neutral key/value storage.
///
/// The manifest cache and the token store both read and write through this
/// trait; the platform implementation is injected at the composition root.
pub trait Storage: Send + Sync {
    /// Get a stored value, `None` if the key has never been set
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Store a value under a key, overwriting any previous value
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a key (idempotent)
    fn delete_item(&self, key: &str) -> Result<()>;
}

/// In-memory storage, used in tests and as an ephemeral fallback
#[derive(Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let items = self
            .items
            .lock()
            .map_err(|_| ApiError::Storage("storage lock poisoned".to_string()))?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self
            .items
            .lock()
            .map_err(|_| ApiError::Storage("storage lock poisoned".to_string()))?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete_item(&self, key: &str) -> Result<()> {
        let mut items = self
            .items
            .lock()
            .map_err(|_| ApiError::Storage("storage lock poisoned".to_string()))?;
        items.remove(key);
        Ok(())
    }
}

/// File-backed storage for non-secret local state (manifest cache, ETag).
///
/// One file per key under the given directory; key characters outside
/// `[A-Za-z0-9._-]` are replaced so keys cannot escape the directory.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileStorage { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(safe)
    }
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ApiError::Storage(format!("read {}: {}", key, e))),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| ApiError::Storage(format!("create dir: {}", e)))?;
        std::fs::write(self.path_for(key), value)
            .map_err(|e| ApiError::Storage(format!("write {}: {}", key, e)))
    }

    fn delete_item(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ApiError::Storage(format!("delete {}: {}", key, e))),
        }
    }
}

/// Secure storage backed by the platform keychain
/// (macOS Keychain, Windows Credential Manager, Linux Secret Service)
pub struct KeychainStorage {
    service_name: String,
}

impl KeychainStorage {
    /// Create a keychain storage scoped to a service name
    pub fn new(service_name: impl Into<String>) -> Self {
        KeychainStorage {
            service_name: service_name.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service_name, key)
            .map_err(|e| ApiError::Storage(format!("keychain entry for {}: {}", key, e)))
    }
}

impl Storage for KeychainStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let entry = self.entry(key)?;
        match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(ApiError::Storage(format!("keychain read {}: {}", key, e))),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        debug!(service = %self.service_name, key = %key, "storing secret in keychain");
        let entry = self.entry(key)?;
        entry
            .set_password(value)
            .map_err(|e| ApiError::Storage(format!("keychain write {}: {}", key, e)))
    }

    fn delete_item(&self, key: &str) -> Result<()> {
        let entry = self.entry(key)?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(ApiError::Storage(format!("keychain delete {}: {}", key, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_roundtrip() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get_item("k").unwrap(), None);

        storage.set_item("k", "v1").unwrap();
        assert_eq!(storage.get_item("k").unwrap(), Some("v1".to_string()));

        storage.set_item("k", "v2").unwrap();
        assert_eq!(storage.get_item("k").unwrap(), Some("v2".to_string()));

        storage.delete_item("k").unwrap();
        assert_eq!(storage.get_item("k").unwrap(), None);
        // delete is idempotent
        storage.delete_item("k").unwrap();
    }

    #[test]
    fn test_file_storage_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());

        assert_eq!(storage.get_item(MANIFEST_KEY).unwrap(), None);
        storage.set_item(MANIFEST_KEY, "{\"a\":1}").unwrap();
        assert_eq!(
            storage.get_item(MANIFEST_KEY).unwrap(),
            Some("{\"a\":1}".to_string())
        );
        storage.delete_item(MANIFEST_KEY).unwrap();
        assert_eq!(storage.get_item(MANIFEST_KEY).unwrap(), None);
    }

    #[test]
    fn test_file_storage_sanitizes_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());

        storage.set_item("../escape/attempt", "x").unwrap();
        assert_eq!(
            storage.get_item("../escape/attempt").unwrap(),
            Some("x".to_string())
        );
        // nothing written outside the storage dir
        assert!(!dir.path().parent().unwrap().join("attempt").exists());
    }
}
