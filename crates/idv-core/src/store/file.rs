//! File-backed profile storage
//!
//! One file per key under a profile directory. Entries survive process
//! restarts, and separate processes pointed at the same directory share
//! them. Writes go through a temporary file and a rename so readers never
//! see a partial entry; takes claim the file by renaming it away first, so
//! only one reader wins.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;

use super::{ProfileStorage, StoreError};

static CLAIM_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Directory-backed profile storage
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open storage rooted at `dir`, creating it if needed
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }

    fn scratch_path(&self, key_path: &Path, purpose: &str) -> PathBuf {
        let n = CLAIM_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut name = key_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.{}.{}", purpose, std::process::id(), n));
        self.dir.join(name)
    }
}

#[async_trait]
impl ProfileStorage for FileStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_item(&self, key: &str, value: String) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp = self.scratch_path(&path, "tmp");
        fs::write(&tmp, value).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<bool, StoreError> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn take_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key);
        let claimed = self.scratch_path(&path, "claim");

        match fs::rename(&path, &claimed).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let value = fs::read_to_string(&claimed).await;
        fs::remove_file(&claimed).await?;
        Ok(Some(value?))
    }
}
