//! # Tether Cache
//!
//! HTTP cache router of the Tether connection-resilience layer.
//!
//! This crate provides:
//! - Five caching strategies selected per path prefix
//! - Durable, versioned cache partitions (file-backed or in-memory)
//! - An offline handler that always produces a response
//! - A persisted offline command queue replayed by background sync
//! - An hourly expiry sweep of stale API responses
//! - The cache worker: install/activate lifecycle, message channel and push shaping
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tether_cache::prelude::*;
//!
//! let config = CacheConfig::default();
//! let store = Arc::new(FileCacheStore::open(&config.storage_dir).await?);
//! let fetcher = Arc::new(HttpFetcher::new("http://127.0.0.1:8080", Duration::from_secs(30))?);
//! let worker = CacheWorker::new(config, store, fetcher);
//! worker.install().await?;
//! worker.activate().await?;
//!
//! let routed = worker.handle(&CacheRequest::get("/api/players")).await;
//! ```

#![warn(missing_docs)]
#![allow(clippy::all)]
#![allow(clippy::pedantic)]
#![allow(clippy::cargo)]
#![allow(clippy::nursery)]

/// Cache worker configuration
pub mod config;

/// Background eviction of stale entries
pub mod expiry;

/// Network access
pub mod fetcher;

/// Worker message channel
pub mod message;

/// Offline responses
pub mod offline;

/// Persisted performance counters
pub mod performance;

/// Push notification shaping
pub mod push;

/// Offline command queue
pub mod queue;

/// Requests entering the router
pub mod request;

/// Cached responses
pub mod response;

/// Strategy execution
pub mod router;

/// Durable partitions
pub mod storage;

/// Strategies and route table
pub mod strategy;

/// Background sync registrations
pub mod sync;

/// Worker lifecycle and orchestration
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::{CacheConfig, CacheConfigBuilder, PartitionNames};
pub use fetcher::{Fetcher, HttpFetcher};
pub use message::{OperationResult, PartitionStatus, WorkerMessage, WorkerReply};
pub use request::{CacheRequest, Destination};
pub use response::{CacheResponse, ResponseSource, Routed};
pub use router::CacheRouter;
pub use storage::{CacheStore, FileCacheStore, MemoryCacheStore};
pub use strategy::{Partition, Route, RouteTable, Strategy};
pub use sync::SyncTag;
pub use worker::{CacheWorker, SyncOutcome, WorkerLifecycle};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{CacheConfig, PartitionNames};
    pub use crate::fetcher::{Fetcher, HttpFetcher};
    pub use crate::message::{WorkerMessage, WorkerReply};
    pub use crate::push::PushNotification;
    pub use crate::request::CacheRequest;
    pub use crate::response::{CacheResponse, ResponseSource, Routed};
    pub use crate::router::CacheRouter;
    pub use crate::storage::{CacheStore, FileCacheStore, MemoryCacheStore};
    pub use crate::strategy::{Partition, Strategy};
    pub use crate::sync::SyncTag;
    pub use crate::worker::{CacheWorker, SyncOutcome, WorkerLifecycle};
}
