//! Requests entering the cache router.

use bytes::Bytes;
use reqwest::Method;

/// What the request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    /// A navigation to a page.
    Document,
    /// Anything else.
    #[default]
    Other,
}

/// One outbound HTTP request.
///
/// `url` is either a path with optional query (`/api/players?online=1`) or an
/// absolute URL. It is also the cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRequest {
    /// HTTP method.
    pub method: Method,
    /// Path or absolute URL.
    pub url: String,
    /// Navigation or subresource.
    pub destination: Destination,
    /// Header pairs forwarded upstream.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: Bytes,
}

impl CacheRequest {
    /// A request without headers or body.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            destination: Destination::Other,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// A `GET` request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// A `POST` request with a JSON body.
    #[must_use]
    pub fn post_json(url: impl Into<String>, body: &serde_json::Value) -> Self {
        Self::new(Method::POST, url)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
    }

    /// Marks the request as a page navigation.
    #[must_use]
    pub fn as_document(mut self) -> Self {
        self.destination = Destination::Document;
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Cache key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.url
    }

    /// Path component without query or fragment.
    #[must_use]
    pub fn path(&self) -> &str {
        let rest = match self.url.find("://") {
            Some(scheme_end) => {
                let after = &self.url[scheme_end + 3..];
                match after.find('/') {
                    Some(slash) => &after[slash..],
                    None => "/",
                }
            }
            None => self.url.as_str(),
        };
        let end = rest.find(['?', '#']).unwrap_or(rest.len());
        match &rest[..end] {
            "" => "/",
            path => path,
        }
    }

    /// Only `GET` responses are cached.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.method == Method::GET
    }

    /// Returns true for page navigations.
    #[must_use]
    pub fn is_document(&self) -> bool {
        self.destination == Destination::Document
    }

    /// Returns true for backend API paths.
    #[must_use]
    pub fn is_api(&self) -> bool {
        self.path().starts_with("/api/")
    }
}

/// Connection-level headers that are never forwarded.
#[must_use]
pub fn is_hop_by_hop(name: &str) -> bool {
    const HOP_BY_HOP: [&str; 10] = [
        "connection",
        "keep-alive",
        "proxy-authenticate",
        "proxy-authorization",
        "te",
        "trailer",
        "transfer-encoding",
        "upgrade",
        "host",
        "content-length",
    ];
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}
