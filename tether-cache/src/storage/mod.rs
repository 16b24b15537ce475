//! Durable cache partitions.
//!
//! This module provides:
//! - `CacheStore` trait for pluggable partition storage
//! - `MemoryCacheStore` for tests and ephemeral proxies
//! - `FileCacheStore` keeping one directory per partition and one file per entry
//!
//! Entries are immutable once written. `put` replaces the whole entry, so a
//! reader never observes a half-written response.

mod file;
mod memory;

pub use file::FileCacheStore;
pub use memory::MemoryCacheStore;

use async_trait::async_trait;
use tether_core::error::CacheError;

use crate::response::CacheResponse;

/// Named partitions of request-keyed responses.
///
/// Partitions come into existence on their first `put`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Names of the existing partitions, sorted.
    ///
    /// # Errors
    ///
    /// Returns error if the backing storage cannot be listed.
    async fn partitions(&self) -> Result<Vec<String>, CacheError>;

    /// Deletes a partition with all its entries. Returns false if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns error if the backing storage fails.
    async fn delete_partition(&self, partition: &str) -> Result<bool, CacheError>;

    /// Looks up `key` in `partition`.
    ///
    /// # Errors
    ///
    /// Returns error if the entry exists but cannot be read.
    async fn get(&self, partition: &str, key: &str) -> Result<Option<CacheResponse>, CacheError>;

    /// Stores `response` under `key`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns error if the entry cannot be written.
    async fn put(
        &self,
        partition: &str,
        key: &str,
        response: &CacheResponse,
    ) -> Result<(), CacheError>;

    /// Removes `key`. Returns false if it was not present.
    ///
    /// # Errors
    ///
    /// Returns error if the backing storage fails.
    async fn delete(&self, partition: &str, key: &str) -> Result<bool, CacheError>;

    /// Keys stored in `partition`, sorted. Empty for a missing partition.
    ///
    /// # Errors
    ///
    /// Returns error if the partition cannot be listed.
    async fn keys(&self, partition: &str) -> Result<Vec<String>, CacheError>;
}
