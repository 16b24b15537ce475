//! The cache worker: lifecycle, message channel, background sync and push.

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tether_core::error::{CacheError, NetworkError, TetherError};
use tether_core::types::{RequestId, Timestamp};
use tether_telemetry::spans::{sync_span, worker_message_span};
use tracing::{Instrument, debug, info, warn};

use crate::config::CacheConfig;
use crate::expiry::{self, ExpirySweeper};
use crate::fetcher::Fetcher;
use crate::message::{OperationResult, PartitionStatus, WorkerMessage, WorkerReply};
use crate::offline::{self, OFFLINE_PAGE_KEY};
use crate::performance::PerformanceMetrics;
use crate::push::PushNotification;
use crate::queue::{OfflineQueue, ReplayReport};
use crate::request::CacheRequest;
use crate::response::Routed;
use crate::router::CacheRouter;
use crate::storage::CacheStore;
use crate::strategy::{Partition, RouteTable};
use crate::sync::{SyncRegistry, SyncTag};

/// Endpoint the performance counters are sent to.
pub const ANALYTICS_ENDPOINT: &str = "/api/analytics";

/// Where the worker is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerLifecycle {
    /// Created, nothing cached yet.
    Parsed,
    /// Pre-caching.
    Installing,
    /// Installed and waiting to take over.
    Installed,
    /// Dropping stale partitions.
    Activating,
    /// Serving requests.
    Activated,
}

/// Outcome of [`CacheWorker::install`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    /// URLs stored in the static partition.
    pub cached: Vec<String>,
    /// URLs that could not be fetched.
    pub failed: Vec<String>,
}

/// Outcome of one background sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The offline queue was replayed.
    Replayed(ReplayReport),
    /// The counters were delivered and reset.
    AnalyticsSent(PerformanceMetrics),
}

/// Owns the router and all persisted worker state.
///
/// Nothing here survives in memory alone: the queue, counters and sync
/// registrations are read from the store on every use, so a new worker over
/// the same store picks up where the last one stopped.
pub struct CacheWorker {
    config: CacheConfig,
    router: CacheRouter,
    queue: OfflineQueue,
    sync: SyncRegistry,
    lifecycle: Mutex<WorkerLifecycle>,
    title: String,
}

impl CacheWorker {
    /// Creates a worker over `store` and `fetcher`.
    #[must_use]
    pub fn new(config: CacheConfig, store: Arc<dyn CacheStore>, fetcher: Arc<dyn Fetcher>) -> Self {
        let partitions = config.partition_names();
        let api = partitions.name(Partition::Api);
        let router = CacheRouter::new(Arc::clone(&store), fetcher, partitions);
        Self {
            queue: OfflineQueue::new(Arc::clone(&store), api.clone()),
            sync: SyncRegistry::new(store, api),
            router,
            title: config.app_name.clone(),
            config,
            lifecycle: Mutex::new(WorkerLifecycle::Parsed),
        }
    }

    /// Replaces the route table.
    #[must_use]
    pub fn with_routes(mut self, routes: RouteTable) -> Self {
        self.router = self.router.with_routes(routes);
        self
    }

    /// Sets the heading of push notifications.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Configuration.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The request router.
    #[must_use]
    pub fn router(&self) -> &CacheRouter {
        &self.router
    }

    /// The offline command queue.
    #[must_use]
    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    /// Pending background syncs.
    #[must_use]
    pub fn sync_registry(&self) -> &SyncRegistry {
        &self.sync
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn lifecycle(&self) -> WorkerLifecycle {
        *self.lifecycle.lock()
    }

    /// Pre-caches the configured URLs into the static partition and writes the
    /// offline page into the app-shell partition.
    ///
    /// A URL that cannot be fetched is reported, not fatal.
    ///
    /// # Errors
    ///
    /// Returns error if the offline page cannot be stored.
    pub async fn install(&self) -> Result<InstallReport, CacheError> {
        *self.lifecycle.lock() = WorkerLifecycle::Installing;
        info!(urls = self.config.precache_urls.len(), "Installing cache worker");

        let names = self.router.partitions();
        let static_partition = names.name(Partition::Static);
        let store = self.router.store();
        let mut report = InstallReport::default();

        for url in &self.config.precache_urls {
            match self.router.fetcher().fetch(&CacheRequest::get(url.as_str())).await {
                Ok(response) if response.is_success() => {
                    store.put(&static_partition, url, &response).await?;
                    report.cached.push(url.clone());
                }
                Ok(response) => {
                    warn!(url = %url, status = response.status, "Pre-cache fetch returned an error status");
                    report.failed.push(url.clone());
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Pre-cache fetch failed");
                    report.failed.push(url.clone());
                }
            }
        }

        store
            .put(
                &names.name(Partition::AppShell),
                OFFLINE_PAGE_KEY,
                &offline::offline_page(),
            )
            .await?;

        *self.lifecycle.lock() = WorkerLifecycle::Installed;
        info!(
            cached = report.cached.len(),
            failed = report.failed.len(),
            "Cache worker installed"
        );
        Ok(report)
    }

    /// Deletes every partition that is not one of the current three.
    /// Returns the deleted names.
    ///
    /// # Errors
    ///
    /// Returns error if the partitions cannot be listed or deleted.
    pub async fn activate(&self) -> Result<Vec<String>, CacheError> {
        *self.lifecycle.lock() = WorkerLifecycle::Activating;
        let names = self.router.partitions();
        let store = self.router.store();

        let mut deleted = Vec::new();
        for partition in store.partitions().await? {
            if !names.is_known(&partition) && store.delete_partition(&partition).await? {
                info!(partition = %partition, "Deleted stale cache partition");
                deleted.push(partition);
            }
        }

        *self.lifecycle.lock() = WorkerLifecycle::Activated;
        info!("Cache worker activated");
        Ok(deleted)
    }

    /// Routes `request` through the cache.
    pub async fn handle(&self, request: &CacheRequest) -> Routed {
        self.router.handle(request).await
    }

    /// Answers one worker message. Failures are part of the reply.
    pub async fn handle_message(&self, message: WorkerMessage) -> WorkerReply {
        let span = worker_message_span(message.kind());
        async {
            debug!("Worker message received");
            match message {
                WorkerMessage::SkipWaiting => {
                    if self.lifecycle() == WorkerLifecycle::Installed
                        && let Err(e) = self.activate().await
                    {
                        warn!(error = %e, "Activation failed");
                    }
                    WorkerReply::ack()
                }
                WorkerMessage::GetCacheStatus => match self.cache_status().await {
                    Ok(status) => WorkerReply::CacheStatus(status),
                    Err(e) => WorkerReply::Result(OperationResult::failed(e.to_string())),
                },
                WorkerMessage::ClearCache => match self.clear_caches().await {
                    Ok(()) => WorkerReply::Result(OperationResult::ok("All caches cleared")),
                    Err(e) => WorkerReply::Result(OperationResult::failed(e.to_string())),
                },
                WorkerMessage::PerformanceMetrics => match self.router.ledger().snapshot().await {
                    Ok(metrics) => WorkerReply::Metrics(metrics),
                    Err(e) => WorkerReply::Result(OperationResult::failed(e.to_string())),
                },
                WorkerMessage::QueueCommand { command } => match self.queue_command(command).await
                {
                    Ok(id) => WorkerReply::Result(
                        OperationResult::ok("Command queued").with_id(id.as_str()),
                    ),
                    Err(e) => WorkerReply::Result(OperationResult::failed(e.to_string())),
                },
            }
        }
        .instrument(span)
        .await
    }

    /// Item count and keys of every partition.
    pub async fn cache_status(&self) -> Result<BTreeMap<String, PartitionStatus>, CacheError> {
        let store = self.router.store();
        let mut status = BTreeMap::new();
        for partition in store.partitions().await? {
            let items = store.keys(&partition).await?;
            status.insert(
                partition,
                PartitionStatus {
                    item_count: items.len(),
                    items,
                },
            );
        }
        Ok(status)
    }

    /// Deletes every partition, including the reserved entries.
    pub async fn clear_caches(&self) -> Result<(), CacheError> {
        let store = self.router.store();
        for partition in store.partitions().await? {
            store.delete_partition(&partition).await?;
        }
        info!("All caches cleared");
        Ok(())
    }

    /// Queues `command` and registers the command replay sync.
    pub async fn queue_command(&self, command: Value) -> Result<RequestId, CacheError> {
        let id = self.queue.enqueue(command).await?;
        self.sync.register(SyncTag::Commands).await?;
        Ok(id)
    }

    /// Registers a background sync to run on the next connectivity restore.
    pub async fn register_sync(&self, tag: SyncTag) -> Result<(), CacheError> {
        self.sync.register(tag).await
    }

    /// Runs the background sync for `tag`.
    ///
    /// # Errors
    ///
    /// Returns error if the analytics upload fails; the counters are kept.
    pub async fn sync(&self, tag: SyncTag) -> Result<SyncOutcome, TetherError> {
        async {
            info!("Background sync triggered");
            match tag {
                SyncTag::Commands => {
                    let report = self.queue.replay(self.router.fetcher().as_ref()).await?;
                    Ok(SyncOutcome::Replayed(report))
                }
                SyncTag::Analytics => {
                    let metrics = self.send_analytics().await?;
                    Ok(SyncOutcome::AnalyticsSent(metrics))
                }
            }
        }
        .instrument(sync_span(tag.as_str()))
        .await
    }

    /// Runs every pending sync. Tags whose sync failed are registered again.
    pub async fn fire_pending_syncs(&self) -> Vec<(SyncTag, Result<SyncOutcome, TetherError>)> {
        let tags = match self.sync.take_pending().await {
            Ok(tags) => tags,
            Err(e) => {
                warn!(error = %e, "Failed to read pending syncs");
                return Vec::new();
            }
        };

        let mut results = Vec::with_capacity(tags.len());
        for tag in tags {
            let result = self.sync(tag).await;
            if let Err(e) = &result {
                warn!(tag = %tag, error = %e, "Background sync failed, will retry");
                if let Err(e) = self.sync.register(tag).await {
                    warn!(tag = %tag, error = %e, "Failed to re-register sync");
                }
            }
            results.push((tag, result));
        }
        results
    }

    /// Evicts stale API entries now.
    pub async fn sweep_expired(&self, now: Timestamp) -> Result<u64, CacheError> {
        expiry::sweep_expired(
            self.router.store().as_ref(),
            &self.router.partitions().name(Partition::Api),
            self.config.max_age(),
            now,
        )
        .await
    }

    /// A periodic sweeper over the API partition.
    #[must_use]
    pub fn expiry_sweeper(&self) -> ExpirySweeper {
        ExpirySweeper::new(
            Arc::clone(self.router.store()),
            self.router.partitions().name(Partition::Api),
            self.config.max_age(),
            self.config.sweep_interval(),
        )
    }

    /// Shapes a push payload into a notification.
    #[must_use]
    pub fn push(&self, payload: Option<&Value>) -> PushNotification {
        PushNotification::from_payload(&self.title, payload, Timestamp::now())
    }

    async fn send_analytics(&self) -> Result<PerformanceMetrics, TetherError> {
        let ledger = self.router.ledger();
        let metrics = ledger.snapshot().await?;
        let body = json!({
            "performanceMetrics": metrics,
            "timestamp": Timestamp::now().as_millis(),
            "userAgent": concat!("tether/", env!("CARGO_PKG_VERSION")),
        });

        let response = self
            .router
            .fetcher()
            .fetch(&CacheRequest::post_json(ANALYTICS_ENDPOINT, &body))
            .await?;
        if !response.is_success() {
            return Err(NetworkError::Http {
                status_code: response.status,
                reason: "analytics upload rejected".to_string(),
            }
            .into());
        }

        ledger.reset().await?;
        info!(
            cache_hits = metrics.cache_hits,
            network_requests = metrics.network_requests,
            "Analytics synced"
        );
        Ok(metrics)
    }
}

impl std::fmt::Debug for CacheWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheWorker")
            .field("lifecycle", &self.lifecycle())
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{COMMAND_ENDPOINT, OFFLINE_COMMANDS_KEY};
    use crate::response::CacheResponse;
    use crate::storage::MemoryCacheStore;
    use crate::testing::MockFetcher;

    struct Fixture {
        worker: CacheWorker,
        store: Arc<MemoryCacheStore>,
        fetcher: Arc<MockFetcher>,
    }

    fn fixture(config: CacheConfig) -> Fixture {
        let store = Arc::new(MemoryCacheStore::new());
        let fetcher = Arc::new(MockFetcher::new());
        let worker = CacheWorker::new(
            config,
            Arc::clone(&store) as Arc<dyn CacheStore>,
            Arc::clone(&fetcher) as Arc<dyn Fetcher>,
        );
        Fixture {
            worker,
            store,
            fetcher,
        }
    }

    fn api(f: &Fixture) -> String {
        f.worker.router().partitions().name(Partition::Api)
    }

    #[tokio::test]
    async fn test_install_precaches_and_writes_offline_page() {
        let f = fixture(
            CacheConfig::builder()
                .precache_urls(["/", "/css/main.css", "/missing.js"])
                .build(),
        );
        f.fetcher.respond("/", CacheResponse::html("<html></html>"));
        f.fetcher.respond("/css/main.css", CacheResponse::text(200, "css"));

        let report = f.worker.install().await.unwrap();

        assert_eq!(report.cached, vec!["/", "/css/main.css"]);
        assert_eq!(report.failed, vec!["/missing.js"]);
        assert_eq!(f.worker.lifecycle(), WorkerLifecycle::Installed);
        let names = f.worker.router().partitions();
        assert_eq!(
            f.store.keys(&names.name(Partition::Static)).await.unwrap(),
            vec!["/", "/css/main.css"]
        );
        assert!(
            f.store
                .get(&names.name(Partition::AppShell), OFFLINE_PAGE_KEY)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_activate_drops_unknown_partitions() {
        let f = fixture(CacheConfig::builder().precache_urls(Vec::<String>::new()).build());
        let response = CacheResponse::new(200);
        f.store.put("tether-static-v0", "/old.js", &response).await.unwrap();
        f.store.put(&api(&f), "/api/a", &response).await.unwrap();

        f.worker.install().await.unwrap();
        let deleted = f.worker.activate().await.unwrap();

        assert_eq!(deleted, vec!["tether-static-v0"]);
        assert_eq!(f.worker.lifecycle(), WorkerLifecycle::Activated);
        assert!(f.store.get(&api(&f), "/api/a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_skip_waiting_activates_installed_worker() {
        let f = fixture(CacheConfig::builder().precache_urls(Vec::<String>::new()).build());
        f.worker.handle_message(WorkerMessage::SkipWaiting).await;
        assert_eq!(f.worker.lifecycle(), WorkerLifecycle::Parsed);

        f.worker.install().await.unwrap();
        let reply = f.worker.handle_message(WorkerMessage::SkipWaiting).await;
        assert_eq!(reply, WorkerReply::ack());
        assert_eq!(f.worker.lifecycle(), WorkerLifecycle::Activated);
    }

    #[tokio::test]
    async fn test_cache_status_and_clear() {
        let f = fixture(CacheConfig::default());
        f.store
            .put(&api(&f), "/api/players", &CacheResponse::new(200))
            .await
            .unwrap();

        let reply = f.worker.handle_message(WorkerMessage::GetCacheStatus).await;
        let WorkerReply::CacheStatus(status) = reply else {
            panic!("expected cache status, got {reply:?}");
        };
        assert_eq!(status[&api(&f)].item_count, 1);
        assert_eq!(status[&api(&f)].items, vec!["/api/players"]);

        let reply = f.worker.handle_message(WorkerMessage::ClearCache).await;
        assert_eq!(
            reply,
            WorkerReply::Result(OperationResult::ok("All caches cleared"))
        );
        assert!(f.store.partitions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_queue_command_registers_sync_and_replays() {
        let f = fixture(CacheConfig::default());
        f.fetcher.respond(COMMAND_ENDPOINT, CacheResponse::new(200));

        let reply = f
            .worker
            .handle_message(WorkerMessage::QueueCommand {
                command: json!({"command": "weather clear"}),
            })
            .await;
        let WorkerReply::Result(result) = reply else {
            panic!("expected operation result, got {reply:?}");
        };
        assert!(result.success);
        assert!(result.id.is_some());
        assert_eq!(
            f.worker.sync_registry().pending().await.unwrap(),
            vec![SyncTag::Commands]
        );

        let results = f.worker.fire_pending_syncs().await;
        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0].1,
            Ok(SyncOutcome::Replayed(ReplayReport { delivered: 1, .. }))
        ));
        assert!(f.store.get(&api(&f), OFFLINE_COMMANDS_KEY).await.unwrap().is_none());
        assert!(f.worker.sync_registry().pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_queue_command_rejects_non_object() {
        let f = fixture(CacheConfig::default());
        let reply = f
            .worker
            .handle_message(WorkerMessage::QueueCommand {
                command: json!(42),
            })
            .await;
        let WorkerReply::Result(result) = reply else {
            panic!("expected operation result, got {reply:?}");
        };
        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_analytics_sync_resets_counters() {
        let f = fixture(CacheConfig::default());
        f.fetcher.respond("/css/a.css", CacheResponse::text(200, "a"));
        f.fetcher.respond(ANALYTICS_ENDPOINT, CacheResponse::new(204));
        f.worker.handle(&CacheRequest::get("/css/a.css")).await;

        let outcome = f.worker.sync(SyncTag::Analytics).await.unwrap();
        let SyncOutcome::AnalyticsSent(sent) = outcome else {
            panic!("expected analytics outcome");
        };
        assert_eq!(sent.network_requests, 1);

        let upload = f
            .fetcher
            .requests()
            .into_iter()
            .find(|r| r.url == ANALYTICS_ENDPOINT)
            .unwrap();
        let body: Value = serde_json::from_slice(&upload.body).unwrap();
        assert_eq!(body["performanceMetrics"]["networkRequests"], 1);

        assert_eq!(
            f.worker.router().ledger().snapshot().await.unwrap(),
            PerformanceMetrics::default()
        );
    }

    #[tokio::test]
    async fn test_failed_analytics_sync_is_retried_later() {
        let f = fixture(CacheConfig::default());
        f.worker.register_sync(SyncTag::Analytics).await.unwrap();
        f.fetcher.set_offline(true);

        let results = f.worker.fire_pending_syncs().await;
        assert!(results[0].1.is_err());
        assert_eq!(
            f.worker.sync_registry().pending().await.unwrap(),
            vec![SyncTag::Analytics]
        );
    }

    #[tokio::test]
    async fn test_sweep_uses_api_partition() {
        let f = fixture(CacheConfig::default());
        let now = Timestamp::now();
        let old = CacheResponse::new(200)
            .stamped(now.saturating_sub(std::time::Duration::from_secs(25 * 3600)));
        f.store.put(&api(&f), "/api/old", &old).await.unwrap();

        assert_eq!(f.worker.sweep_expired(now).await.unwrap(), 1);
    }

    #[test]
    fn test_push_uses_title() {
        let store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
        let worker = CacheWorker::new(CacheConfig::default(), store, Arc::new(MockFetcher::new()))
            .with_title("Tether Dashboard");
        let notification = worker.push(Some(&json!({"message": "Backup done"})));
        assert_eq!(notification.title, "Tether Dashboard");
        assert_eq!(notification.body, "Backup done");
    }
}
