//! Background sync registrations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tether_core::error::CacheError;
use tokio::sync::Mutex;
use tracing::debug;

use crate::response::CacheResponse;
use crate::storage::CacheStore;

/// Reserved key of the registrations in the API partition.
pub const SYNC_TAGS_KEY: &str = "/__tether/sync-tags";

/// Work deferred until connectivity returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SyncTag {
    /// Replay the offline command queue.
    #[serde(rename = "background-sync-commands")]
    Commands,
    /// Send the performance counters to the backend.
    #[serde(rename = "background-sync-analytics")]
    Analytics,
}

impl SyncTag {
    /// Wire name of the tag.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commands => "background-sync-commands",
            Self::Analytics => "background-sync-analytics",
        }
    }
}

impl fmt::Display for SyncTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "background-sync-commands" => Ok(Self::Commands),
            "background-sync-analytics" => Ok(Self::Analytics),
            other => Err(format!("unknown sync tag '{other}'")),
        }
    }
}

/// Persisted set of pending [`SyncTag`]s.
pub struct SyncRegistry {
    store: Arc<dyn CacheStore>,
    partition: String,
    lock: Mutex<()>,
}

impl SyncRegistry {
    /// Creates a registry persisting into `partition`.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, partition: impl Into<String>) -> Self {
        Self {
            store,
            partition: partition.into(),
            lock: Mutex::new(()),
        }
    }

    /// Registers `tag`. Registering a pending tag again is a no-op.
    pub async fn register(&self, tag: SyncTag) -> Result<(), CacheError> {
        let _guard = self.lock.lock().await;
        let mut tags = self.load().await?;
        if tags.insert(tag) {
            self.save(&tags).await?;
            debug!(tag = %tag, "Registered background sync");
        }
        Ok(())
    }

    /// Removes and returns every pending tag.
    pub async fn take_pending(&self) -> Result<Vec<SyncTag>, CacheError> {
        let _guard = self.lock.lock().await;
        let tags = self.load().await?;
        if !tags.is_empty() {
            self.store.delete(&self.partition, SYNC_TAGS_KEY).await?;
        }
        Ok(tags.into_iter().collect())
    }

    /// Pending tags without removing them.
    pub async fn pending(&self) -> Result<Vec<SyncTag>, CacheError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.into_iter().collect())
    }

    async fn load(&self) -> Result<BTreeSet<SyncTag>, CacheError> {
        match self.store.get(&self.partition, SYNC_TAGS_KEY).await? {
            Some(entry) => entry.json_body(),
            None => Ok(BTreeSet::new()),
        }
    }

    async fn save(&self, tags: &BTreeSet<SyncTag>) -> Result<(), CacheError> {
        let value = serde_json::to_value(tags)?;
        self.store
            .put(&self.partition, SYNC_TAGS_KEY, &CacheResponse::json(200, &value))
            .await
    }
}

impl fmt::Debug for SyncRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncRegistry")
            .field("partition", &self.partition)
            .finish_non_exhaustive()
    }
}
