use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use tether_core::error::CacheError;

use super::CacheStore;
use crate::response::CacheResponse;

/// In-memory partitions. Contents are lost when the store is dropped.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    partitions: DashMap<String, BTreeMap<String, CacheResponse>>,
}

impl MemoryCacheStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn partitions(&self) -> Result<Vec<String>, CacheError> {
        let mut names: Vec<String> = self.partitions.iter().map(|e| e.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn delete_partition(&self, partition: &str) -> Result<bool, CacheError> {
        Ok(self.partitions.remove(partition).is_some())
    }

    async fn get(&self, partition: &str, key: &str) -> Result<Option<CacheResponse>, CacheError> {
        Ok(self
            .partitions
            .get(partition)
            .and_then(|entries| entries.get(key).cloned()))
    }

    async fn put(
        &self,
        partition: &str,
        key: &str,
        response: &CacheResponse,
    ) -> Result<(), CacheError> {
        self.partitions
            .entry(partition.to_string())
            .or_default()
            .insert(key.to_string(), response.clone());
        Ok(())
    }

    async fn delete(&self, partition: &str, key: &str) -> Result<bool, CacheError> {
        Ok(self
            .partitions
            .get_mut(partition)
            .is_some_and(|mut entries| entries.remove(key).is_some()))
    }

    async fn keys(&self, partition: &str) -> Result<Vec<String>, CacheError> {
        Ok(self
            .partitions
            .get(partition)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryCacheStore::new();
        let response = CacheResponse::text(200, "body");

        store.put("tether-api-v1", "/api/a", &response).await.unwrap();
        assert_eq!(
            store.get("tether-api-v1", "/api/a").await.unwrap(),
            Some(response)
        );
        assert!(store.get("tether-api-v1", "/api/b").await.unwrap().is_none());
        assert!(store.get("other", "/api/a").await.unwrap().is_none());

        assert!(store.delete("tether-api-v1", "/api/a").await.unwrap());
        assert!(!store.delete("tether-api-v1", "/api/a").await.unwrap());
    }

    #[tokio::test]
    async fn test_partitions_and_keys_sorted() {
        let store = MemoryCacheStore::new();
        let response = CacheResponse::new(200);
        store.put("b", "/z", &response).await.unwrap();
        store.put("b", "/a", &response).await.unwrap();
        store.put("a", "/x", &response).await.unwrap();

        assert_eq!(store.partitions().await.unwrap(), vec!["a", "b"]);
        assert_eq!(store.keys("b").await.unwrap(), vec!["/a", "/z"]);
        assert!(store.keys("missing").await.unwrap().is_empty());

        assert!(store.delete_partition("a").await.unwrap());
        assert!(!store.delete_partition("a").await.unwrap());
        assert_eq!(store.partitions().await.unwrap(), vec!["b"]);
    }
}
