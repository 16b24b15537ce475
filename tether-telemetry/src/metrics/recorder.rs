//! Tether metrics recorder with pre-defined metrics.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Pre-defined metrics for the realtime client and the cache router.
///
/// All metrics follow the naming convention `tether_<category>_<metric>_<unit>`.
pub struct TetherMetrics;

impl TetherMetrics {
    /// Register all metric descriptions.
    pub fn register() {
        // Connection metrics
        describe_counter!(
            "tether_reconnect_attempts_total",
            "Total number of reconnect attempts scheduled"
        );
        describe_counter!(
            "tether_heartbeat_failures_total",
            "Total number of failed heartbeat probes"
        );
        describe_histogram!(
            "tether_heartbeat_latency_seconds",
            "Round-trip latency of successful heartbeat probes"
        );
        describe_gauge!(
            "tether_websocket_connected",
            "WebSocket connection status (1=connected, 0=disconnected)"
        );

        // Dispatcher metrics
        describe_gauge!(
            "tether_outbound_queue_depth",
            "Messages waiting in the outbound queue"
        );
        describe_counter!(
            "tether_messages_received_total",
            "Inbound realtime messages by type"
        );
        describe_counter!(
            "tether_request_timeouts_total",
            "Requests that received no reply in time"
        );

        // Cache metrics
        describe_counter!("tether_cache_hits_total", "Requests served from cache");
        describe_counter!("tether_cache_misses_total", "Cache lookups that missed");
        describe_counter!(
            "tether_network_requests_total",
            "Requests forwarded to the network"
        );
        describe_counter!(
            "tether_offline_responses_total",
            "Requests answered by the offline handler"
        );
        describe_counter!(
            "tether_cache_evictions_total",
            "Entries removed by the expiry sweep"
        );
        describe_gauge!(
            "tether_offline_queue_depth",
            "Commands waiting in the offline queue"
        );
    }

    // ==================== Connection Metrics ====================

    /// Record a scheduled reconnect attempt.
    pub fn reconnect_attempt(attempt: u32) {
        counter!(
            "tether_reconnect_attempts_total",
            "attempt" => attempt.to_string()
        )
        .increment(1);
    }

    /// Record a failed heartbeat probe.
    pub fn heartbeat_failure() {
        counter!("tether_heartbeat_failures_total").increment(1);
    }

    /// Record heartbeat probe latency.
    pub fn heartbeat_latency(latency_seconds: f64) {
        histogram!("tether_heartbeat_latency_seconds").record(latency_seconds);
    }

    /// Update WebSocket connection status.
    pub fn websocket_connected(connected: bool) {
        gauge!("tether_websocket_connected").set(if connected { 1.0 } else { 0.0 });
    }

    // ==================== Dispatcher Metrics ====================

    /// Update the outbound queue depth.
    #[allow(clippy::cast_precision_loss)]
    pub fn outbound_queue_depth(depth: usize) {
        gauge!("tether_outbound_queue_depth").set(depth as f64);
    }

    /// Record an inbound message.
    pub fn message_received(kind: &str) {
        counter!(
            "tether_messages_received_total",
            "type" => kind.to_string()
        )
        .increment(1);
    }

    /// Record a request timeout.
    pub fn request_timeout() {
        counter!("tether_request_timeouts_total").increment(1);
    }

    // ==================== Cache Metrics ====================

    /// Record a cache hit.
    pub fn cache_hit(partition: &str) {
        counter!(
            "tether_cache_hits_total",
            "partition" => partition.to_string()
        )
        .increment(1);
    }

    /// Record a cache miss.
    pub fn cache_miss(partition: &str) {
        counter!(
            "tether_cache_misses_total",
            "partition" => partition.to_string()
        )
        .increment(1);
    }

    /// Record a request forwarded to the network.
    pub fn network_request(strategy: &str) {
        counter!(
            "tether_network_requests_total",
            "strategy" => strategy.to_string()
        )
        .increment(1);
    }

    /// Record an offline response.
    pub fn offline_response(kind: &str) {
        counter!(
            "tether_offline_responses_total",
            "kind" => kind.to_string()
        )
        .increment(1);
    }

    /// Record entries removed by the expiry sweep.
    pub fn cache_evictions(count: u64) {
        counter!("tether_cache_evictions_total").increment(count);
    }

    /// Update the offline command queue depth.
    #[allow(clippy::cast_precision_loss)]
    pub fn offline_queue_depth(depth: usize) {
        gauge!("tether_offline_queue_depth").set(depth as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Without an installed recorder these calls are no-ops; they must not panic.

    #[test]
    fn test_connection_metrics() {
        TetherMetrics::register();
        TetherMetrics::reconnect_attempt(1);
        TetherMetrics::heartbeat_failure();
        TetherMetrics::heartbeat_latency(0.012);
        TetherMetrics::websocket_connected(true);
    }

    #[test]
    fn test_cache_metrics() {
        TetherMetrics::cache_hit("tether-static-v1");
        TetherMetrics::cache_miss("tether-api-v1");
        TetherMetrics::network_request("network-first");
        TetherMetrics::offline_response("api");
        TetherMetrics::cache_evictions(3);
        TetherMetrics::offline_queue_depth(2);
    }
}
