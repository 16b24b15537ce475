//! Persisted worker performance counters.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tether_core::error::CacheError;
use tokio::sync::Mutex;

use crate::response::CacheResponse;
use crate::storage::CacheStore;

/// Reserved key of the counters in the API partition.
pub const METRICS_KEY: &str = "/__tether/metrics";

/// Counters reported by `PERFORMANCE_METRICS` and synced to `/api/analytics`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    /// Responses served from a partition.
    pub cache_hits: u64,
    /// Lookups that found nothing.
    pub cache_misses: u64,
    /// Requests sent to the network.
    pub network_requests: u64,
    /// Responses produced by the offline handler.
    pub offline_requests: u64,
}

/// Which counter to bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    /// A partition hit.
    CacheHit,
    /// A partition miss.
    CacheMiss,
    /// A network request.
    NetworkRequest,
    /// An offline response.
    OfflineRequest,
}

/// Reads and writes [`PerformanceMetrics`] through the store on every update,
/// so the counters outlive the worker.
pub struct PerformanceLedger {
    store: Arc<dyn CacheStore>,
    partition: String,
    lock: Mutex<()>,
}

impl PerformanceLedger {
    /// Creates a ledger persisting into `partition`.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, partition: impl Into<String>) -> Self {
        Self {
            store,
            partition: partition.into(),
            lock: Mutex::new(()),
        }
    }

    /// Increments `counter` and persists the result.
    pub async fn record(&self, counter: Counter) -> Result<PerformanceMetrics, CacheError> {
        let _guard = self.lock.lock().await;
        let mut metrics = self.load().await?;
        match counter {
            Counter::CacheHit => metrics.cache_hits += 1,
            Counter::CacheMiss => metrics.cache_misses += 1,
            Counter::NetworkRequest => metrics.network_requests += 1,
            Counter::OfflineRequest => metrics.offline_requests += 1,
        }
        self.save(&metrics).await?;
        Ok(metrics)
    }

    /// Current counters.
    pub async fn snapshot(&self) -> Result<PerformanceMetrics, CacheError> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    /// Zeroes every counter.
    pub async fn reset(&self) -> Result<(), CacheError> {
        let _guard = self.lock.lock().await;
        self.save(&PerformanceMetrics::default()).await
    }

    async fn load(&self) -> Result<PerformanceMetrics, CacheError> {
        match self.store.get(&self.partition, METRICS_KEY).await? {
            Some(entry) => entry.json_body(),
            None => Ok(PerformanceMetrics::default()),
        }
    }

    async fn save(&self, metrics: &PerformanceMetrics) -> Result<(), CacheError> {
        let value = serde_json::to_value(metrics)?;
        self.store
            .put(&self.partition, METRICS_KEY, &CacheResponse::json(200, &value))
            .await
    }
}

impl std::fmt::Debug for PerformanceLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceLedger")
            .field("partition", &self.partition)
            .finish_non_exhaustive()
    }
}
