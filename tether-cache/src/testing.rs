//! Test doubles for the network seam.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tether_core::error::NetworkError;

use crate::fetcher::Fetcher;
use crate::request::CacheRequest;
use crate::response::CacheResponse;

/// Scripted [`Fetcher`]: answers by URL, 404 for unknown URLs, errors while offline.
#[derive(Debug, Default)]
pub struct MockFetcher {
    responses: Mutex<BTreeMap<String, CacheResponse>>,
    offline: AtomicBool,
    requests: Mutex<Vec<CacheRequest>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers requests for `url` with `response`.
    pub fn respond(&self, url: &str, response: CacheResponse) {
        self.responses.lock().insert(url.to_string(), response);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Every request received, including those that failed.
    pub fn requests(&self) -> Vec<CacheRequest> {
        self.requests.lock().clone()
    }

    /// Requests received for `url`.
    pub fn count(&self, url: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.url == url).count()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &CacheRequest) -> Result<CacheResponse, NetworkError> {
        self.requests.lock().push(request.clone());
        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::ConnectionFailed {
                reason: "network unreachable".to_string(),
            });
        }
        Ok(self
            .responses
            .lock()
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| CacheResponse::text(404, "Not Found")))
    }
}
