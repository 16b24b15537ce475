//! The HTTP cache router: strategy selection, strategy execution and the
//! offline fallback.

use std::sync::Arc;
use tether_core::error::{CacheError, TetherError};
use tether_core::types::Timestamp;
use tether_telemetry::metrics::TetherMetrics;
use tether_telemetry::spans::cache_route_span;
use tracing::{Instrument, debug, warn};

use crate::config::PartitionNames;
use crate::fetcher::Fetcher;
use crate::offline::{self, OFFLINE_PAGE_KEY};
use crate::performance::{Counter, PerformanceLedger};
use crate::request::CacheRequest;
use crate::response::{CacheResponse, ResponseSource, Routed};
use crate::storage::CacheStore;
use crate::strategy::{Partition, Route, RouteTable, Strategy};

/// Routes every request through a caching strategy.
///
/// [`handle`](Self::handle) always yields a response: when a strategy runs
/// out of options the offline handler answers instead.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use tether_cache::{CacheConfig, CacheRequest, CacheRouter, HttpFetcher, MemoryCacheStore};
///
/// let router = CacheRouter::new(
///     Arc::new(MemoryCacheStore::new()),
///     Arc::new(HttpFetcher::new("http://127.0.0.1:8080", timeout)?),
///     CacheConfig::default().partition_names(),
/// );
/// let routed = router.handle(&CacheRequest::get("/css/main.css")).await;
/// ```
pub struct CacheRouter {
    shared: Shared,
    routes: RouteTable,
    partitions: PartitionNames,
}

/// Handles shared with background revalidation tasks.
#[derive(Clone)]
struct Shared {
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    ledger: Arc<PerformanceLedger>,
}

impl CacheRouter {
    /// Creates a router with the default route table.
    #[must_use]
    pub fn new(
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
        partitions: PartitionNames,
    ) -> Self {
        let ledger = Arc::new(PerformanceLedger::new(
            Arc::clone(&store),
            partitions.name(Partition::Api),
        ));
        Self {
            shared: Shared {
                store,
                fetcher,
                ledger,
            },
            routes: RouteTable::default(),
            partitions,
        }
    }

    /// Replaces the route table.
    #[must_use]
    pub fn with_routes(mut self, routes: RouteTable) -> Self {
        self.routes = routes;
        self
    }

    /// The partition store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.shared.store
    }

    /// The network side.
    #[must_use]
    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.shared.fetcher
    }

    /// Persisted performance counters.
    #[must_use]
    pub fn ledger(&self) -> &Arc<PerformanceLedger> {
        &self.shared.ledger
    }

    /// Versioned partition names.
    #[must_use]
    pub fn partitions(&self) -> &PartitionNames {
        &self.partitions
    }

    /// The route `request` takes. Only `GET` requests are served from the cache.
    #[must_use]
    pub fn route_for(&self, request: &CacheRequest) -> Route {
        if request.is_cacheable() {
            self.routes.select(request.path()).clone()
        } else {
            Route::new(request.path(), Strategy::NetworkOnly, None)
        }
    }

    /// Answers `request`.
    pub async fn handle(&self, request: &CacheRequest) -> Routed {
        let route = self.route_for(request);
        let partition = route.partition.map(|p| self.partitions.name(p));
        let span = cache_route_span(
            route.strategy.as_str(),
            partition.as_deref().unwrap_or("none"),
            request.key(),
        );

        async {
            match self
                .execute(request, route.strategy, partition.as_deref())
                .await
            {
                Ok((response, source)) => Routed {
                    response,
                    source,
                    strategy: route.strategy,
                },
                Err(e) => {
                    debug!(error = %e, "Strategy exhausted, using offline handler");
                    self.offline(request, route.strategy).await
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        request: &CacheRequest,
        strategy: Strategy,
        partition: Option<&str>,
    ) -> Result<(CacheResponse, ResponseSource), TetherError> {
        let Some(partition) = partition.filter(|_| strategy.uses_cache()) else {
            let response = self.shared.fetch(request, strategy).await?;
            return Ok((response, ResponseSource::Network));
        };
        let key = request.key();

        match strategy {
            Strategy::CacheFirst => {
                if let Some(hit) = self.shared.lookup(partition, key).await {
                    return Ok((hit, ResponseSource::Cache));
                }
                let response = self.shared.fetch(request, strategy).await?;
                if response.is_success() {
                    self.shared.store(partition, key, &response).await;
                }
                Ok((response, ResponseSource::Network))
            }
            Strategy::NetworkFirst => match self.shared.fetch(request, strategy).await {
                Ok(response) => {
                    if response.is_success() {
                        let stamped = response.stamped(Timestamp::now());
                        self.shared.store(partition, key, &stamped).await;
                    }
                    Ok((response, ResponseSource::Network))
                }
                Err(e) => match self.shared.lookup(partition, key).await {
                    Some(hit) => {
                        debug!(error = %e, "Network failed, serving cached copy");
                        Ok((hit, ResponseSource::Cache))
                    }
                    None => Err(e.into()),
                },
            },
            Strategy::StaleWhileRevalidate => {
                if let Some(hit) = self.shared.lookup(partition, key).await {
                    self.revalidate(request, partition);
                    return Ok((hit, ResponseSource::Cache));
                }
                let response = self.shared.fetch(request, strategy).await?;
                if response.is_success() {
                    self.shared.store(partition, key, &response).await;
                }
                Ok((response, ResponseSource::Network))
            }
            Strategy::CacheOnly => match self.shared.lookup(partition, key).await {
                Some(hit) => Ok((hit, ResponseSource::Cache)),
                None => Err(CacheError::Miss {
                    key: key.to_string(),
                }
                .into()),
            },
            Strategy::NetworkOnly => {
                let response = self.shared.fetch(request, strategy).await?;
                Ok((response, ResponseSource::Network))
            }
        }
    }

    /// Refreshes the cached copy in the background; failures are dropped.
    fn revalidate(&self, request: &CacheRequest, partition: &str) {
        let shared = self.shared.clone();
        let request = request.clone();
        let partition = partition.to_string();
        tokio::spawn(
            async move {
                match shared
                    .fetch(&request, Strategy::StaleWhileRevalidate)
                    .await
                {
                    Ok(response) if response.is_success() => {
                        shared.store(&partition, request.key(), &response).await;
                    }
                    Ok(response) => {
                        debug!(status = response.status, "Revalidation returned an error status");
                    }
                    Err(e) => debug!(error = %e, "Revalidation failed"),
                }
            }
            .in_current_span(),
        );
    }

    /// The common fallback once a strategy has nothing left to try.
    async fn offline(&self, request: &CacheRequest, strategy: Strategy) -> Routed {
        let (response, source, kind) = if request.is_document() {
            let app_shell = self.partitions.name(Partition::AppShell);
            match self.shared.peek(&app_shell, OFFLINE_PAGE_KEY).await {
                Some(page) => (page, ResponseSource::Offline, "document"),
                None => (offline::document_fallback(), ResponseSource::Offline, "document"),
            }
        } else if request.is_api() {
            let api = self.partitions.name(Partition::Api);
            match self.shared.peek(&api, request.key()).await {
                Some(hit) => (hit, ResponseSource::Cache, "api_cached"),
                None => (offline::api_unavailable(), ResponseSource::Offline, "api"),
            }
        } else {
            (offline::not_found(), ResponseSource::Offline, "other")
        };

        TetherMetrics::offline_response(kind);
        self.shared.count(Counter::OfflineRequest).await;
        Routed {
            response,
            source,
            strategy,
        }
    }
}

impl Shared {
    async fn fetch(
        &self,
        request: &CacheRequest,
        strategy: Strategy,
    ) -> Result<CacheResponse, tether_core::error::NetworkError> {
        TetherMetrics::network_request(strategy.as_str());
        self.count(Counter::NetworkRequest).await;
        self.fetcher.fetch(request).await
    }

    /// Partition lookup that counts hits and misses.
    async fn lookup(&self, partition: &str, key: &str) -> Option<CacheResponse> {
        match self.peek(partition, key).await {
            Some(hit) => {
                TetherMetrics::cache_hit(partition);
                self.count(Counter::CacheHit).await;
                Some(hit)
            }
            None => {
                TetherMetrics::cache_miss(partition);
                self.count(Counter::CacheMiss).await;
                None
            }
        }
    }

    /// Partition lookup without bookkeeping. Storage errors read as a miss.
    async fn peek(&self, partition: &str, key: &str) -> Option<CacheResponse> {
        match self.store.get(partition, key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(partition, key, error = %e, "Cache read failed");
                None
            }
        }
    }

    async fn store(&self, partition: &str, key: &str, response: &CacheResponse) {
        if let Err(e) = self.store.put(partition, key, response).await {
            warn!(partition, key, error = %e, "Cache write failed");
        }
    }

    async fn count(&self, counter: Counter) {
        if let Err(e) = self.ledger.record(counter).await {
            warn!(?counter, error = %e, "Failed to persist performance counter");
        }
    }
}

impl std::fmt::Debug for CacheRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRouter")
            .field("routes", &self.routes)
            .field("partitions", &self.partitions)
            .finish_non_exhaustive()
    }
}
