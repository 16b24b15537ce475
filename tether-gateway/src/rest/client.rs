//! REST client for the backend API.

use reqwest::{Client, Method, Response, header};
use serde::de::DeserializeOwned;
use tether_core::error::NetworkError;
use tether_telemetry::spans::rest_api_span;
use tracing::{Instrument, debug, warn};

use super::config::RestConfig;

/// REST client for the backend API.
///
/// # Example
///
/// ```ignore
/// use tether_gateway::rest::{RestClient, RestConfig};
///
/// let config = RestConfig::builder()
///     .base_url("http://127.0.0.1:8080")
///     .build();
///
/// let client = RestClient::new(config)?;
/// let response = client.get("/api/heartbeat")
///     .bearer("session-token")
///     .send()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct RestClient {
    config: RestConfig,
    http_client: Client,
}

impl RestClient {
    /// Creates a new REST client.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError` if the HTTP client cannot be created.
    pub fn new(config: RestConfig) -> Result<Self, NetworkError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            config
                .user_agent
                .parse()
                .map_err(|_| NetworkError::ConnectionFailed {
                    reason: "Invalid user agent".to_string(),
                })?,
        );

        let http_client = Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| NetworkError::ConnectionFailed {
                reason: format!("Failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Creates a GET request builder.
    #[must_use]
    pub fn get(&self, path: &str) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::GET, path)
    }

    /// Creates a POST request builder.
    #[must_use]
    pub fn post(&self, path: &str) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::POST, path)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    /// Builds the full URL for a path.
    #[must_use]
    pub fn build_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
        }
    }

    async fn execute_request(
        &self,
        method: Method,
        url: &str,
        body: Option<&str>,
        headers: &[(String, String)],
    ) -> Result<Response, NetworkError> {
        debug!(method = %method, url = %url, "Sending request");

        let mut request = self.http_client.request(method, url);
        for (key, value) in headers {
            request = request.header(key.as_str(), value.as_str());
        }
        if let Some(b) = body {
            request = request
                .header(header::CONTENT_TYPE, "application/json")
                .body(b.to_string());
        }

        request.send().await.map_err(|e| self.map_error(&e))
    }

    fn map_error(&self, e: &reqwest::Error) -> NetworkError {
        if e.is_timeout() {
            NetworkError::Timeout {
                timeout_ms: self.config.timeout_ms,
            }
        } else if e.is_connect() {
            NetworkError::ConnectionFailed {
                reason: e.to_string(),
            }
        } else {
            NetworkError::Http {
                status_code: e.status().map_or(0, |s| s.as_u16()),
                reason: e.to_string(),
            }
        }
    }
}

/// Request builder for REST API calls.
pub struct RequestBuilder<'a> {
    client: &'a RestClient,
    method: Method,
    path: String,
    body: Option<String>,
    headers: Vec<(String, String)>,
}

impl<'a> RequestBuilder<'a> {
    fn new(client: &'a RestClient, method: Method, path: &str) -> Self {
        Self {
            client,
            method,
            path: path.to_string(),
            body: None,
            headers: Vec::new(),
        }
    }

    /// Sets the request body as JSON.
    #[must_use]
    pub fn json<T: serde::Serialize>(mut self, body: &T) -> Self {
        self.body = serde_json::to_string(body).ok();
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Adds an `Authorization: Bearer` header.
    #[must_use]
    pub fn bearer(self, token: &str) -> Self {
        self.header(header::AUTHORIZATION.as_str(), format!("Bearer {token}"))
    }

    /// Sends the request and returns the raw response.
    ///
    /// Recoverable transport failures are retried up to `max_retries` times.
    /// Any HTTP status is returned as a response; callers decide what a
    /// non-success status means.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError` if the request fails.
    pub async fn send(self) -> Result<Response, NetworkError> {
        let url = self.client.build_url(&self.path);
        let span = rest_api_span(&self.path, self.method.as_str());

        async {
            let mut attempt = 0u32;
            loop {
                let result = self
                    .client
                    .execute_request(
                        self.method.clone(),
                        &url,
                        self.body.as_deref(),
                        &self.headers,
                    )
                    .await;

                match result {
                    Ok(response) => return Ok(response),
                    Err(e) => {
                        if e.is_recoverable() && self.client.config.should_retry(attempt) {
                            let delay = self.client.config.calculate_retry_delay(attempt);
                            warn!(
                                attempt = attempt + 1,
                                delay_ms = delay.as_millis(),
                                error = %e,
                                "Request failed, retrying"
                            );
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                            continue;
                        }
                        return Err(e);
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Sends the request and fails on non-success statuses.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::Http` for non-2xx responses.
    pub async fn send_checked(self) -> Result<Response, NetworkError> {
        let response = self.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let reason = status.canonical_reason().unwrap_or("request failed").to_string();
        Err(NetworkError::Http {
            status_code: status.as_u16(),
            reason,
        })
    }

    /// Sends the request and parses a JSON response body.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError` for transport failures, non-2xx statuses or an
    /// unparseable body.
    pub async fn send_json<T: DeserializeOwned>(self) -> Result<T, NetworkError> {
        let response = self.send_checked().await?;
        response.json().await.map_err(|e| NetworkError::Http {
            status_code: 0,
            reason: format!("Failed to parse response: {e}"),
        })
    }
}
