use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tether_core::error::CacheError;
use tokio::fs;
use tracing::{debug, warn};

use super::CacheStore;
use crate::response::CacheResponse;

const ENTRY_EXTENSION: &str = "json";

/// On-disk entry: the key is kept next to the response because file names are hashes.
#[derive(Serialize, Deserialize)]
struct StoredEntry {
    key: String,
    response: CacheResponse,
}

/// File-backed partitions.
///
/// Each partition is a directory under the root; each entry is a JSON file
/// named after the SHA-256 of its key. Writes go to a temp file that is then
/// renamed over the entry.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    root: PathBuf,
}

impl FileCacheStore {
    /// Opens (and creates) the store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), "Opened cache store");
        Ok(Self { root })
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn partition_dir(&self, partition: &str) -> Result<PathBuf, CacheError> {
        let valid = !partition.is_empty()
            && !partition.starts_with('.')
            && partition
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(CacheError::Storage {
                reason: format!("invalid partition name '{partition}'"),
            });
        }
        Ok(self.root.join(partition))
    }

    fn entry_file(key: &str) -> String {
        format!("{}.{ENTRY_EXTENSION}", hex::encode(Sha256::digest(key.as_bytes())))
    }

    async fn read_entry(path: &Path) -> Result<Option<StoredEntry>, CacheError> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn partitions(&self) -> Result<Vec<String>, CacheError> {
        let mut names = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            if entry.file_type().await?.is_dir()
                && let Some(name) = entry.file_name().to_str()
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete_partition(&self, partition: &str) -> Result<bool, CacheError> {
        let dir = self.partition_dir(partition)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, partition: &str, key: &str) -> Result<Option<CacheResponse>, CacheError> {
        let path = self.partition_dir(partition)?.join(Self::entry_file(key));
        Ok(Self::read_entry(&path).await?.map(|entry| entry.response))
    }

    async fn put(
        &self,
        partition: &str,
        key: &str,
        response: &CacheResponse,
    ) -> Result<(), CacheError> {
        let dir = self.partition_dir(partition)?;
        fs::create_dir_all(&dir).await?;

        let file = Self::entry_file(key);
        let content = serde_json::to_vec(&StoredEntry {
            key: key.to_string(),
            response: response.clone(),
        })?;
        let temp_path = dir.join(format!(".{file}.{}.tmp", uuid::Uuid::new_v4()));
        fs::write(&temp_path, content).await?;
        if let Err(e) = fs::rename(&temp_path, dir.join(&file)).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete(&self, partition: &str, key: &str) -> Result<bool, CacheError> {
        let path = self.partition_dir(partition)?.join(Self::entry_file(key));
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self, partition: &str) -> Result<Vec<String>, CacheError> {
        let dir = self.partition_dir(partition)?;
        let mut listing = match fs::read_dir(&dir).await {
            Ok(listing) => listing,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = listing.next_entry().await? {
            let path = entry.path();
            let is_entry = path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION)
                && !entry.file_name().to_string_lossy().starts_with('.');
            if !is_entry {
                continue;
            }
            match Self::read_entry(&path).await {
                Ok(Some(stored)) => keys.push(stored.key),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable cache entry"),
            }
        }
        keys.sort();
        Ok(keys)
    }
}
