//! Span definitions for tracing.
//!
//! Provides spans for the operations that cross a network boundary:
//! - Proxied HTTP requests and their cache routing
//! - WebSocket sessions and reconnect attempts
//! - Worker messages and background sync

use tracing::{Span, info_span};

/// Create a span for an HTTP request entering the proxy.
///
/// # Example
///
/// ```
/// use tether_telemetry::spans::request_span;
///
/// let span = request_span("GET", "/api/server/stats");
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn request_span(method: &str, path: &str) -> Span {
    info_span!(
        "request",
        method = %method,
        path = %path,
        otel.kind = "server"
    )
}

/// Create a span for routing one request through a caching strategy.
#[must_use]
pub fn cache_route_span(strategy: &str, partition: &str, url: &str) -> Span {
    info_span!(
        "cache.route",
        strategy = %strategy,
        partition = %partition,
        url = %url
    )
}

/// Create a span for a reconnect attempt.
///
/// # Example
///
/// ```
/// use tether_telemetry::spans::reconnect_span;
///
/// let span = reconnect_span(2, 5);
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn reconnect_span(attempt: u32, max_attempts: u32) -> Span {
    info_span!(
        "reconnect",
        attempt = attempt,
        max_attempts = max_attempts
    )
}

/// Create a span for one WebSocket connection epoch.
#[must_use]
pub fn websocket_span(url: &str, epoch: u64) -> Span {
    info_span!(
        "websocket",
        url = %url,
        epoch = epoch,
        otel.kind = "client"
    )
}

/// Create a span for a backend REST call.
#[must_use]
pub fn rest_api_span(endpoint: &str, method: &str) -> Span {
    info_span!(
        "rest_api",
        endpoint = %endpoint,
        method = %method,
        otel.kind = "client"
    )
}

/// Create a span for handling a worker message.
#[must_use]
pub fn worker_message_span(message_type: &str) -> Span {
    info_span!("worker.message", message_type = %message_type)
}

/// Create a span for a background sync run.
#[must_use]
pub fn sync_span(tag: &str) -> Span {
    info_span!("sync", tag = %tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    fn init_test_subscriber() {
        let _ = tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    }

    #[test]
    fn test_request_span() {
        init_test_subscriber();
        let span = request_span("GET", "/api/heartbeat");
        let _guard = span.enter();
    }

    #[test]
    fn test_cache_route_span() {
        init_test_subscriber();
        let span = cache_route_span("network-first", "tether-api-v1", "/api/players");
        let _guard = span.enter();
    }

    #[test]
    fn test_reconnect_span() {
        init_test_subscriber();
        let span = reconnect_span(3, 5);
        let _guard = span.enter();
    }
}
