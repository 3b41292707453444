//! File-backed store: one `<key>.json` document per key under a root
//! directory.
//!
//! Writes are atomic (temp file + rename in the same directory) so a crash
//! mid-write never leaves a truncated document behind. Reads are defensive:
//! an unreadable or empty file behaves like a missing key.

use std::io::Write;
use std::path::{Path, PathBuf};

use fs_err as fs;
use serde_json::Value;
use tempfile::NamedTempFile;

use tabstash_protocol::StorageEstimate;

use super::KeyValueStore;
use crate::{Result, StashError};

/// Filesystem-backed [`KeyValueStore`].
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    /// Quota reported through [`KeyValueStore::estimate`]; the filesystem
    /// has no meaningful quota of its own.
    quota_bytes: u64,
}

impl FileStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>, quota_bytes: u64) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StashError::Io {
            context: format!("create store root {}", root.display()),
            source: e,
        })?;
        Ok(FileStore { root, quota_bytes })
    }

    /// Default storage root: `~/.tabstash`.
    pub fn default_root() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".tabstash"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.key_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|e| StashError::Io {
            context: format!("read {}", path.display()),
            source: e,
        })?;
        if content.trim().is_empty() {
            tracing::warn!(key, "Empty store file, treating as missing");
            return Ok(None);
        }
        match serde_json::from_str(&content) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(key, error = %e, "Unparseable store file, treating as missing");
                Ok(None)
            }
        }
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let path = self.key_path(key);
        let content =
            serde_json::to_string_pretty(&value).map_err(|e| StashError::Json {
                context: format!("serialize {key}"),
                source: e,
            })?;

        let mut temp_file = NamedTempFile::new_in(&self.root).map_err(|e| StashError::Io {
            context: format!("temp file for {key}"),
            source: e,
        })?;
        temp_file
            .write_all(content.as_bytes())
            .and_then(|_| temp_file.flush())
            .map_err(|e| StashError::Io {
                context: format!("write temp file for {key}"),
                source: e,
            })?;
        temp_file.persist(&path).map_err(|e| StashError::Io {
            context: format!("persist {}", path.display()),
            source: e.error,
        })?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.key_path(key);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| StashError::Io {
                context: format!("remove {}", path.display()),
                source: e,
            })?;
        }
        Ok(())
    }

    fn estimate(&self) -> Option<StorageEstimate> {
        let entries = fs::read_dir(&self.root).ok()?;
        let used_bytes = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.metadata().ok())
            .filter(|meta| meta.is_file())
            .map(|meta| meta.len())
            .sum();
        Some(StorageEstimate {
            quota_bytes: self.quota_bytes,
            used_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_store(dir: &Path) -> FileStore {
        FileStore::open(dir.join("store"), 1024).unwrap()
    }

    #[test]
    fn open_creates_root() {
        let temp = tempdir().unwrap();
        let store = open_store(temp.path());
        assert!(store.root().exists());
    }

    #[test]
    fn get_missing_key_is_none() {
        let temp = tempdir().unwrap();
        let store = open_store(temp.path());
        assert!(store.get("absent").unwrap().is_none());
    }

    #[test]
    fn set_then_get_round_trips() {
        let temp = tempdir().unwrap();
        let store = open_store(temp.path());
        store.set("snapshots", serde_json::json!({"v": 1})).unwrap();
        assert_eq!(
            store.get("snapshots").unwrap(),
            Some(serde_json::json!({"v": 1}))
        );
    }

    #[test]
    fn empty_file_reads_as_missing() {
        let temp = tempdir().unwrap();
        let store = open_store(temp.path());
        fs::write(store.root().join("broken.json"), "").unwrap();
        assert!(store.get("broken").unwrap().is_none());
    }

    #[test]
    fn corrupt_file_reads_as_missing() {
        let temp = tempdir().unwrap();
        let store = open_store(temp.path());
        fs::write(store.root().join("broken.json"), "{not json").unwrap();
        assert!(store.get("broken").unwrap().is_none());
    }

    #[test]
    fn remove_deletes_file() {
        let temp = tempdir().unwrap();
        let store = open_store(temp.path());
        store.set("k", serde_json::json!(true)).unwrap();
        store.remove("k").unwrap();
        assert!(store.get("k").unwrap().is_none());
    }

    #[test]
    fn estimate_counts_file_sizes() {
        let temp = tempdir().unwrap();
        let store = open_store(temp.path());
        store.set("k", serde_json::json!({"payload": "xxxx"})).unwrap();
        let estimate = store.estimate().unwrap();
        assert_eq!(estimate.quota_bytes, 1024);
        assert!(estimate.used_bytes > 0);
    }
}
