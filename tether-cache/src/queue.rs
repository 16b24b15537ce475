//! Commands queued while offline and replayed once connectivity returns.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tether_core::error::CacheError;
use tether_core::types::{RequestId, Timestamp};
use tether_telemetry::metrics::TetherMetrics;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::fetcher::Fetcher;
use crate::request::CacheRequest;
use crate::response::CacheResponse;
use crate::storage::CacheStore;

/// Reserved key of the queue in the API partition.
pub const OFFLINE_COMMANDS_KEY: &str = "/offline-commands";

/// Endpoint queued commands are replayed to.
pub const COMMAND_ENDPOINT: &str = "/api/command";

/// Outcome of one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    /// Commands sent.
    pub attempted: usize,
    /// Commands the backend accepted with a 2xx.
    pub delivered: usize,
    /// Commands that failed; they are not retried.
    pub failed: usize,
}

/// Persisted FIFO of command payloads.
///
/// The list lives in the store, never only in memory: every operation reads
/// it, changes it and writes it back.
pub struct OfflineQueue {
    store: Arc<dyn CacheStore>,
    partition: String,
    lock: Mutex<()>,
}

impl OfflineQueue {
    /// Creates a queue persisting into `partition`.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, partition: impl Into<String>) -> Self {
        Self {
            store,
            partition: partition.into(),
            lock: Mutex::new(()),
        }
    }

    /// Appends `command` with a generated `id` and the current `timestamp`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Serialization` if `command` is not a JSON object,
    /// or a storage error if the queue cannot be persisted.
    pub async fn enqueue(&self, command: Value) -> Result<RequestId, CacheError> {
        let Value::Object(mut fields) = command else {
            return Err(CacheError::Serialization {
                reason: "queued command must be a JSON object".to_string(),
            });
        };

        let id = RequestId::generate();
        fields.insert("timestamp".to_string(), Value::from(Timestamp::now().as_millis()));
        fields.insert("id".to_string(), Value::from(id.as_str()));

        let _guard = self.lock.lock().await;
        let mut commands = self.load().await?;
        commands.push(Value::Object(fields));
        self.save(&commands).await?;
        TetherMetrics::offline_queue_depth(commands.len());
        info!(id = %id, depth = commands.len(), "Queued offline command");
        Ok(id)
    }

    /// Queued commands in enqueue order.
    pub async fn list(&self) -> Result<Vec<Value>, CacheError> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    /// Number of queued commands.
    pub async fn len(&self) -> Result<usize, CacheError> {
        Ok(self.list().await?.len())
    }

    /// Returns true if nothing is queued.
    pub async fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len().await? == 0)
    }

    /// POSTs every queued command to [`COMMAND_ENDPOINT`] in order, then
    /// removes them from the queue whether or not they were delivered.
    ///
    /// Commands enqueued while the replay runs are kept for the next pass.
    pub async fn replay(&self, fetcher: &dyn Fetcher) -> Result<ReplayReport, CacheError> {
        let commands = self.list().await?;
        let mut report = ReplayReport::default();
        if commands.is_empty() {
            debug!("No offline commands to replay");
            return Ok(report);
        }

        let mut replayed = HashSet::new();
        for command in &commands {
            report.attempted += 1;
            let id = command.get("id").and_then(Value::as_str).unwrap_or_default();
            match fetcher
                .fetch(&CacheRequest::post_json(COMMAND_ENDPOINT, command))
                .await
            {
                Ok(response) if response.is_success() => report.delivered += 1,
                Ok(response) => {
                    report.failed += 1;
                    warn!(id, status = response.status, "Offline command rejected");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(id, error = %e, "Failed to replay offline command");
                }
            }
            replayed.insert(id.to_string());
        }

        let _guard = self.lock.lock().await;
        let mut remaining = self.load().await?;
        remaining.retain(|c| {
            let id = c.get("id").and_then(Value::as_str).unwrap_or_default();
            !replayed.contains(id)
        });
        if remaining.is_empty() {
            self.store.delete(&self.partition, OFFLINE_COMMANDS_KEY).await?;
        } else {
            self.save(&remaining).await?;
        }
        TetherMetrics::offline_queue_depth(remaining.len());
        info!(
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            "Offline commands replayed"
        );
        Ok(report)
    }

    async fn load(&self) -> Result<Vec<Value>, CacheError> {
        match self.store.get(&self.partition, OFFLINE_COMMANDS_KEY).await? {
            Some(entry) => entry.json_body(),
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, commands: &[Value]) -> Result<(), CacheError> {
        let body = Value::Array(commands.to_vec());
        self.store
            .put(
                &self.partition,
                OFFLINE_COMMANDS_KEY,
                &CacheResponse::json(200, &body),
            )
            .await
    }
}

impl std::fmt::Debug for OfflineQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineQueue")
            .field("partition", &self.partition)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryCacheStore;
    use crate::testing::MockFetcher;
    use serde_json::json;

    fn queue() -> (Arc<MemoryCacheStore>, OfflineQueue) {
        let store = Arc::new(MemoryCacheStore::new());
        let queue = OfflineQueue::new(Arc::clone(&store) as Arc<dyn CacheStore>, "api");
        (store, queue)
    }

    #[tokio::test]
    async fn test_enqueue_adds_id_and_timestamp() {
        let (_store, queue) = queue();
        let id = queue.enqueue(json!({"command": "say hello"})).await.unwrap();

        let commands = queue.list().await.unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0]["command"], "say hello");
        assert_eq!(commands[0]["id"], id.as_str());
        assert!(commands[0]["timestamp"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_enqueue_rejects_non_objects() {
        let (_store, queue) = queue();
        assert!(queue.enqueue(json!("say hello")).await.is_err());
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_queue_survives_a_new_instance() {
        let (store, queue) = queue();
        queue.enqueue(json!({"command": "a"})).await.unwrap();
        drop(queue);

        let respawned = OfflineQueue::new(store as Arc<dyn CacheStore>, "api");
        assert_eq!(respawned.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_replay_in_order_then_clear() {
        let (store, queue) = queue();
        for name in ["first", "second", "third"] {
            queue.enqueue(json!({"command": name})).await.unwrap();
        }
        let fetcher = MockFetcher::new();
        fetcher.respond(COMMAND_ENDPOINT, CacheResponse::new(200));

        let report = queue.replay(&fetcher).await.unwrap();

        assert_eq!(report.attempted, 3);
        assert_eq!(report.delivered, 3);
        let sent: Vec<String> = fetcher
            .requests()
            .iter()
            .map(|r| {
                let body: Value = serde_json::from_slice(&r.body).unwrap();
                body["command"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(sent, vec!["first", "second", "third"]);
        assert!(fetcher.requests().iter().all(|r| r.method == reqwest::Method::POST));
        assert!(store.get("api", OFFLINE_COMMANDS_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_commands_are_dropped_after_replay() {
        let (_store, queue) = queue();
        queue.enqueue(json!({"command": "a"})).await.unwrap();
        queue.enqueue(json!({"command": "b"})).await.unwrap();
        let fetcher = MockFetcher::new();
        fetcher.set_offline(true);

        let report = queue.replay(&fetcher).await.unwrap();

        assert_eq!(report.attempted, 2);
        assert_eq!(report.failed, 2);
        assert_eq!(fetcher.requests().len(), 2);
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_replay_of_empty_queue_sends_nothing() {
        let (_store, queue) = queue();
        let fetcher = MockFetcher::new();
        assert_eq!(queue.replay(&fetcher).await.unwrap(), ReplayReport::default());
        assert!(fetcher.requests().is_empty());
    }
}
