//! Durable key-value storage for the session.
//!
//! The session store mirrors its token pair and profile into a
//! `DurableStore` so a later process can pick the session back up.
//! `FileStore` keeps the entries in a JSON file in the cache directory;
//! `MemoryStore` keeps them for the lifetime of the value only.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

/// Storage keys written by the session store.
pub mod keys {
    pub const ACCESS: &str = "user.access";
    pub const REFRESH: &str = "user.refresh";
    pub const ID: &str = "user.id";
    pub const EMAIL: &str = "user.email";
    pub const NAME: &str = "user.name";
    pub const IS_STAFF: &str = "user.is_staff";

    pub const ALL: [&str; 6] = [ACCESS, REFRESH, ID, EMAIL, NAME, IS_STAFF];
}

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

pub trait DurableStore: Send {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Remove every entry.
    fn clear(&mut self) -> Result<()>;

    fn is_empty(&self) -> bool;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Entries persisted as a flat JSON object in `<dir>/session.json`.
/// Every write rewrites the whole file.
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStore {
    /// Open the store in `dir`, loading existing entries.
    /// An unreadable session file is discarded so the session starts anonymous.
    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(SESSION_FILE);
        let mut entries = BTreeMap::new();
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read session file {}", path.display()))?;
            match serde_json::from_str(&contents) {
                Ok(parsed) => entries = parsed,
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "Discarding unreadable session file");
                    std::fs::remove_file(&path).context("Failed to remove session file")?;
                }
            }
        }
        debug!(path = %path.display(), entries = entries.len(), "Session store opened");
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&self.entries)?;
        write_private(&self.path, contents.as_bytes())
            .with_context(|| format!("Failed to write session file {}", self.path.display()))
    }
}

/// Write a file readable by the owner only; it holds bearer tokens.
#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, contents)
}

impl DurableStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        self.save()
    }

    fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("Failed to remove session file")?;
        }
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = FileStore::open(dir.path()).unwrap();
            store.set(keys::ACCESS, "AAA").unwrap();
            store.set(keys::REFRESH, "RRR").unwrap();
        }

        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.get(keys::ACCESS).as_deref(), Some("AAA"));
        assert_eq!(store.get(keys::REFRESH).as_deref(), Some("RRR"));
        assert_eq!(store.get(keys::EMAIL), None);
    }

    #[test]
    fn test_file_store_clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path()).unwrap();
        store.set(keys::ACCESS, "AAA").unwrap();
        assert!(store.path().exists());

        store.clear().unwrap();
        assert!(store.is_empty());
        assert!(!store.path().exists());

        let reopened = FileStore::open(dir.path()).unwrap();
        assert!(reopened.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SESSION_FILE), "{not json").unwrap();

        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.is_empty());
        assert!(!dir.path().join(SESSION_FILE).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_session_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path()).unwrap();
        store.set(keys::ACCESS, "AAA").unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryStore::new();
        assert!(store.is_empty());
        store.set(keys::ID, "7").unwrap();
        assert_eq!(store.get(keys::ID).as_deref(), Some("7"));
        store.clear().unwrap();
        assert!(store.is_empty());
    }
}
