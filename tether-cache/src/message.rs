//! Messages exchanged with the cache worker.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::performance::PerformanceMetrics;

/// A request sent to the worker. Each one gets exactly one [`WorkerReply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Activate a waiting worker immediately.
    SkipWaiting,
    /// Item count and keys of every partition.
    GetCacheStatus,
    /// Delete every partition.
    ClearCache,
    /// Current performance counters.
    PerformanceMetrics,
    /// Append a command to the offline queue.
    QueueCommand {
        /// Command payload; must be a JSON object.
        command: Value,
    },
}

impl WorkerMessage {
    /// Wire name of the message type.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SkipWaiting => "SKIP_WAITING",
            Self::GetCacheStatus => "GET_CACHE_STATUS",
            Self::ClearCache => "CLEAR_CACHE",
            Self::PerformanceMetrics => "PERFORMANCE_METRICS",
            Self::QueueCommand { .. } => "QUEUE_COMMAND",
        }
    }
}

/// Contents of one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionStatus {
    /// Number of entries.
    pub item_count: usize,
    /// Entry keys.
    pub items: Vec<String>,
}

/// Outcome of an operation that can fail without failing the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Human-readable result on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Queued command id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationResult {
    /// A success with `message`.
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            id: None,
            error: None,
        }
    }

    /// A failure with `error`.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            id: None,
            error: Some(error.into()),
        }
    }

    /// Attaches an id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// The worker's reply, serialized without a wrapper.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WorkerReply {
    /// Success or failure of clear and queue operations.
    Result(OperationResult),
    /// Counters.
    Metrics(PerformanceMetrics),
    /// Partition name to contents.
    CacheStatus(BTreeMap<String, PartitionStatus>),
    /// Acknowledgement without content.
    Ack {},
}

impl WorkerReply {
    /// An empty acknowledgement.
    #[must_use]
    pub fn ack() -> Self {
        Self::Ack {}
    }
}
