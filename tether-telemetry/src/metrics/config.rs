//! Metrics configuration types.

use serde::{Deserialize, Serialize};

/// Configuration for the metrics system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether to expose a Prometheus HTTP endpoint
    #[serde(default)]
    pub expose_endpoint: bool,

    /// Address for the Prometheus endpoint (e.g., "127.0.0.1:9090")
    #[serde(default = "default_endpoint_address")]
    pub endpoint_address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            expose_endpoint: false,
            endpoint_address: default_endpoint_address(),
        }
    }
}

fn default_endpoint_address() -> String {
    "127.0.0.1:9090".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MetricsConfig::default();
        assert!(!config.expose_endpoint);
        assert_eq!(config.endpoint_address, "127.0.0.1:9090");
    }

    #[test]
    fn test_partial_deserialization() {
        let config: MetricsConfig = serde_json::from_str(r#"{"expose_endpoint":true}"#).unwrap();
        assert!(config.expose_endpoint);
        assert_eq!(config.endpoint_address, "127.0.0.1:9090");
    }
}
