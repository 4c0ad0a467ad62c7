//! JSON file-backed secret storage.
//!
//! Secrets are kept in a single JSON document, by default at
//! `~/.local/share/keyturn/secrets.json` on Linux (the platform data
//! directory elsewhere).
//!
//! Every `set` takes an exclusive lock on a sibling `.lock` file, re-reads
//! the document, applies the change and replaces the file atomically via a
//! temporary file in the same directory. On Unix the file is owner-only
//! (`0600`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::{Secret, SecretStore, StoreError};

/// One stored value plus when it was last written.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileEntry {
    value: Secret,
    updated_at: DateTime<Utc>,
}

/// On-disk document format.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileStoreData {
    /// Version of the store format (for future migrations).
    version: u32,

    entries: BTreeMap<String, FileEntry>,
}

impl Default for FileStoreData {
    fn default() -> Self {
        Self {
            version: 1,
            entries: BTreeMap::new(),
        }
    }
}

/// Exclusive advisory lock, released on drop.
struct FileLock(File);

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.0);
    }
}

fn backend(message: String) -> StoreError {
    StoreError::Backend { message }
}

/// Disk-backed secret store.
///
/// Reads are served from the document as of the last load or write by this
/// instance. Writes merge into whatever is on disk at the time, so several
/// processes can share one file without losing each other's entries.
pub struct FileStore {
    path: PathBuf,
    data: RwLock<FileStoreData>,
}

impl FileStore {
    /// Default location of the secrets file.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        let dirs = directories::ProjectDirs::from("dev", "keyturn", "keyturn")
            .ok_or_else(|| backend("platform data directory not available".to_string()))?;

        Ok(dirs.data_dir().join("secrets.json"))
    }

    /// Load the store from a specific path.
    ///
    /// Creates parent directories if they don't exist. A missing file is an
    /// empty store.
    pub fn load_from_path(path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| backend(format!("failed to create {:?}: {}", parent, e)))?;
        }

        let data = Self::read_data(&path)?;

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// When `key` was last written, if it exists.
    pub fn updated_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.data.read().entries.get(key).map(|e| e.updated_at)
    }

    /// Get the storage path for this store.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn read_data(path: &Path) -> Result<FileStoreData, StoreError> {
        if !path.exists() {
            return Ok(FileStoreData::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| backend(format!("failed to read {:?}: {}", path, e)))?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn dir(&self) -> &Path {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn lock(&self) -> Result<FileLock, StoreError> {
        let path = self.lock_path();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| backend(format!("failed to open {:?}: {}", path, e)))?;

        file.lock_exclusive()
            .map_err(|e| backend(format!("failed to lock {:?}: {}", path, e)))?;

        Ok(FileLock(file))
    }

    /// Replace the document on disk. Either the old or the new document is
    /// visible at `path`, never a partial write.
    fn save(&self, data: &FileStoreData) -> Result<(), StoreError> {
        let contents = serde_json::to_vec_pretty(data)?;
        let dir = self.dir();

        let mut temp = NamedTempFile::new_in(dir)
            .map_err(|e| backend(format!("failed to create temporary file in {:?}: {}", dir, e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            temp.as_file()
                .set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(|e| backend(format!("failed to restrict {:?}: {}", temp.path(), e)))?;
        }

        temp.write_all(&contents)
            .map_err(|e| backend(format!("failed to write {:?}: {}", temp.path(), e)))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| backend(format!("failed to sync {:?}: {}", temp.path(), e)))?;

        temp.persist(&self.path)
            .map_err(|e| backend(format!("failed to replace {:?}: {}", self.path, e.error)))?;
        Ok(())
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .field("keys_count", &self.data.read().entries.len())
            .finish()
    }
}

#[async_trait]
impl SecretStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError> {
        Ok(self.data.read().entries.get(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError> {
        let write_failed = |e: StoreError| StoreError::Write {
            key: key.to_string(),
            message: e.to_string(),
        };

        let mut cached = self.data.write();
        let _lock = self.lock().map_err(write_failed)?;

        // Merge into the current file, which another process may have changed.
        let mut data = Self::read_data(&self.path).map_err(write_failed)?;
        data.entries.insert(
            key.to_string(),
            FileEntry {
                value: secret.clone(),
                updated_at: Utc::now(),
            },
        );

        self.save(&data).map_err(write_failed)?;
        *cached = data;
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .data
            .read()
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
