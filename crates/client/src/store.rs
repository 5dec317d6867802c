//! Durable storage for the last observed ledger version.
//!
//! Lets a restarted process resume near where it left off instead of
//! replaying from zero.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use jobwatch_core::Version;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

pub trait VersionStore: Send + Sync {
    /// Last saved version, or `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<Version>, ClientError>;

    fn save(&self, version: Version) -> Result<(), ClientError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedVersion {
    version: Version,
    saved_at: DateTime<Utc>,
}

/// JSON file store. Writes go to a temp file that is renamed into place.
#[derive(Debug, Clone)]
pub struct FileVersionStore {
    path: PathBuf,
}

impl FileVersionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data dir>/jobwatch/watch-version.json`, if the platform has a data dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join("jobwatch").join("watch-version.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VersionStore for FileVersionStore {
    fn load(&self) -> Result<Option<Version>, ClientError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ClientError::store(&self.path, e)),
        };
        let persisted: PersistedVersion = serde_json::from_str(&content)?;
        Ok(Some(persisted.version))
    }

    fn save(&self, version: Version) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ClientError::store(parent, e))?;
        }
        let content = serde_json::to_string(&PersistedVersion {
            version,
            saved_at: Utc::now(),
        })?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content).map_err(|e| ClientError::store(&tmp_path, e))?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| ClientError::store(&self.path, e))
    }
}

/// In-process store, for tests and clients that opt out of persistence.
#[derive(Debug, Default)]
pub struct MemoryVersionStore {
    version: Mutex<Option<Version>>,
}

impl MemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(version: Version) -> Self {
        Self {
            version: Mutex::new(Some(version)),
        }
    }
}

impl VersionStore for MemoryVersionStore {
    fn load(&self) -> Result<Option<Version>, ClientError> {
        Ok(*self.version.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn save(&self, version: Version) -> Result<(), ClientError> {
        *self.version.lock().unwrap_or_else(|e| e.into_inner()) = Some(version);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileVersionStore::new(dir.path().join("v.json"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("v.json");

        FileVersionStore::new(&path).save(41).unwrap();
        FileVersionStore::new(&path).save(42).unwrap();

        assert_eq!(FileVersionStore::new(&path).load().unwrap(), Some(42));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            FileVersionStore::new(&path).load(),
            Err(ClientError::Encoding(_))
        ));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryVersionStore::new();
        assert_eq!(store.load().unwrap(), None);
        store.save(7).unwrap();
        assert_eq!(store.load().unwrap(), Some(7));
        assert_eq!(MemoryVersionStore::with_version(3).load().unwrap(), Some(3));
    }
}
