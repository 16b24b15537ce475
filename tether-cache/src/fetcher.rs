//! The network side of the cache router.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tether_core::error::NetworkError;
use tracing::debug;

use crate::request::{CacheRequest, is_hop_by_hop};
use crate::response::CacheResponse;

/// Performs requests against the network.
///
/// Any HTTP status is a response; only a request that produced no response
/// at all is an error.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Sends `request` and reads the complete body.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError` if no response was received.
    async fn fetch(&self, request: &CacheRequest) -> Result<CacheResponse, NetworkError>;
}

/// [`Fetcher`] backed by `reqwest`. Relative URLs resolve against the upstream base.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    upstream: String,
    timeout: Duration,
}

impl HttpFetcher {
    /// Creates a fetcher for `upstream` with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError` if the HTTP client cannot be created.
    pub fn new(upstream: impl Into<String>, timeout: Duration) -> Result<Self, NetworkError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NetworkError::ConnectionFailed {
                reason: format!("Failed to create HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            upstream: upstream.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Upstream base URL.
    #[must_use]
    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    /// Absolute URL for `url`.
    #[must_use]
    pub fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else if url.starts_with('/') {
            format!("{}{url}", self.upstream)
        } else {
            format!("{}/{url}", self.upstream)
        }
    }

    fn map_error(&self, e: &reqwest::Error) -> NetworkError {
        if e.is_timeout() {
            NetworkError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }
        } else {
            NetworkError::ConnectionFailed {
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &CacheRequest) -> Result<CacheResponse, NetworkError> {
        let url = self.resolve(&request.url);
        debug!(method = %request.method, url = %url, "Fetching");

        let mut builder = self.client.request(request.method.clone(), &url);
        for (name, value) in &request.headers {
            if !is_hop_by_hop(name) {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await.map_err(|e| self.map_error(&e))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(|e| self.map_error(&e))?;

        Ok(CacheResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_relative_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/players"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_string("[]"),
            )
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(server.uri(), Duration::from_secs(5)).unwrap();
        let response = fetcher.fetch(&CacheRequest::get("/api/players")).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(&response.body[..], b"[]");
    }

    #[tokio::test]
    async fn test_error_status_is_a_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(server.uri(), Duration::from_secs(5)).unwrap();
        let response = fetcher.fetch(&CacheRequest::get("/boom")).await.unwrap();
        assert_eq!(response.status, 500);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_forwards_body_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/command"))
            .and(header("authorization", "Bearer t"))
            .and(body_string(r#"{"command":"say hi"}"#))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(server.uri(), Duration::from_secs(5)).unwrap();
        let request = CacheRequest::post_json("/api/command", &serde_json::json!({"command": "say hi"}))
            .with_header("authorization", "Bearer t")
            .with_header("connection", "close");
        let response = fetcher.fetch(&request).await.unwrap();
        assert_eq!(response.status, 202);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_an_error() {
        let fetcher = HttpFetcher::new("http://127.0.0.1:1", Duration::from_secs(5)).unwrap();
        let error = fetcher.fetch(&CacheRequest::get("/")).await.unwrap_err();
        assert!(matches!(error, NetworkError::ConnectionFailed { .. }));
    }

    #[test]
    fn test_resolve() {
        let fetcher = HttpFetcher::new("http://backend:8080/", Duration::from_secs(5)).unwrap();
        assert_eq!(fetcher.resolve("/api/a"), "http://backend:8080/api/a");
        assert_eq!(fetcher.resolve("api/a"), "http://backend:8080/api/a");
        assert_eq!(fetcher.resolve("https://cdn.example.com/x"), "https://cdn.example.com/x");
    }
}
