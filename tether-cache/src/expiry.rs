//! Periodic eviction of stale API responses.

use std::sync::Arc;
use std::time::Duration;
use tether_core::error::CacheError;
use tether_core::types::Timestamp;
use tether_telemetry::metrics::TetherMetrics;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use crate::storage::CacheStore;

/// Evicts every entry of `partition` whose cached-at time is more than
/// `max_age` before `now`. Entries without the annotation are kept.
///
/// Returns the number of evicted entries.
pub async fn sweep_expired(
    store: &dyn CacheStore,
    partition: &str,
    max_age: Duration,
    now: Timestamp,
) -> Result<u64, CacheError> {
    let mut evicted = 0;
    for key in store.keys(partition).await? {
        let Some(entry) = store.get(partition, &key).await? else {
            continue;
        };
        let Some(cached_at) = entry.cached_at() else {
            continue;
        };
        if cached_at.elapsed_until(now) > max_age && store.delete(partition, &key).await? {
            debug!(key = %key, cached_at = %cached_at, "Expired cache entry removed");
            evicted += 1;
        }
    }
    if evicted > 0 {
        TetherMetrics::cache_evictions(evicted);
        info!(partition, evicted, "Expiry sweep finished");
    }
    Ok(evicted)
}

/// Runs [`sweep_expired`] on a fixed period. The first sweep happens one
/// period after start.
pub struct ExpirySweeper {
    store: Arc<dyn CacheStore>,
    partition: String,
    max_age: Duration,
    period: Duration,
}

impl ExpirySweeper {
    /// Creates a sweeper for `partition`.
    #[must_use]
    pub fn new(
        store: Arc<dyn CacheStore>,
        partition: impl Into<String>,
        max_age: Duration,
        period: Duration,
    ) -> Self {
        Self {
            store,
            partition: partition.into(),
            max_age,
            period,
        }
    }

    /// Spawns the periodic sweep. Abort the handle to stop it.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.period, self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = sweep_expired(
                    self.store.as_ref(),
                    &self.partition,
                    self.max_age,
                    Timestamp::now(),
                )
                .await
                {
                    warn!(partition = %self.partition, error = %e, "Expiry sweep failed");
                }
            }
        })
    }
}

impl std::fmt::Debug for ExpirySweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpirySweeper")
            .field("partition", &self.partition)
            .field("max_age", &self.max_age)
            .field("period", &self.period)
            .finish_non_exhaustive()
    }
}
