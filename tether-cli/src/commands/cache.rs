//! Cache worker commands.
//!
//! Each command posts one worker message to a running proxy.

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde_json::Value;
use std::fmt::Write as _;
use std::time::Duration;
use tether_cache::WorkerMessage;
use tracing::debug;

/// Path of the proxy's worker message channel.
const MESSAGE_PATH: &str = "/__tether/message";

/// Arguments for the cache queue command
#[derive(Parser)]
pub struct QueueArgs {
    /// Command as a JSON object, e.g. '{"command": "say hello"}'
    pub command: String,
}

/// HTTP client for the proxy's worker channel.
pub struct ProxyClient {
    http: reqwest::Client,
    base_url: String,
}

impl ProxyClient {
    /// Creates a client for the proxy at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Sends `message` and returns the worker's reply.
    ///
    /// # Errors
    ///
    /// Returns error if the proxy is unreachable or rejects the message.
    pub async fn send(&self, message: &WorkerMessage) -> Result<Value> {
        let url = format!("{}{MESSAGE_PATH}", self.base_url);
        debug!(url = %url, kind = message.kind(), "Posting worker message");
        let response = self
            .http
            .post(&url)
            .json(message)
            .send()
            .await
            .with_context(|| format!("Proxy not reachable at {}", self.base_url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Proxy rejected {}: {status} {body}", message.kind());
        }
        response.json().await.context("Invalid reply from proxy")
    }
}

/// Prints the item count and keys of every partition.
///
/// # Errors
///
/// Returns error if the request fails.
pub async fn status(proxy: &ProxyClient) -> Result<()> {
    let reply = proxy.send(&WorkerMessage::GetCacheStatus).await?;
    print!("{}", format_status(&reply));
    Ok(())
}

/// Deletes every partition.
///
/// # Errors
///
/// Returns error if the request fails or the worker reports a failure.
pub async fn clear(proxy: &ProxyClient) -> Result<()> {
    let reply = proxy.send(&WorkerMessage::ClearCache).await?;
    println!("{}", operation_result(&reply)?);
    Ok(())
}

/// Prints the performance counters.
///
/// # Errors
///
/// Returns error if the request fails.
pub async fn metrics(proxy: &ProxyClient) -> Result<()> {
    let reply = proxy.send(&WorkerMessage::PerformanceMetrics).await?;
    print!("{}", format_metrics(&reply));
    Ok(())
}

/// Queues a command for offline delivery.
///
/// # Errors
///
/// Returns error if the argument is not a JSON object or the worker refuses it.
pub async fn queue(proxy: &ProxyClient, args: QueueArgs) -> Result<()> {
    let command: Value =
        serde_json::from_str(&args.command).context("Command must be valid JSON")?;
    if !command.is_object() {
        bail!("Command must be a JSON object");
    }
    let reply = proxy.send(&WorkerMessage::QueueCommand { command }).await?;
    let message = operation_result(&reply)?;
    match reply.get("id").and_then(Value::as_str) {
        Some(id) => println!("{message} (id {id})"),
        None => println!("{message}"),
    }
    Ok(())
}

/// Activates a waiting worker.
///
/// # Errors
///
/// Returns error if the request fails.
pub async fn skip_waiting(proxy: &ProxyClient) -> Result<()> {
    proxy.send(&WorkerMessage::SkipWaiting).await?;
    println!("Worker activated");
    Ok(())
}

/// Turns a `{success, message, error}` reply into a message or an error.
fn operation_result(reply: &Value) -> Result<String> {
    if reply.get("success").and_then(Value::as_bool) == Some(true) {
        Ok(reply
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Done")
            .to_string())
    } else {
        let error = reply
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        bail!("Worker reported failure: {error}")
    }
}

fn format_status(reply: &Value) -> String {
    let mut out = String::new();
    let Some(partitions) = reply.as_object().filter(|p| !p.is_empty()) else {
        out.push_str("No cache partitions\n");
        return out;
    };
    for (name, partition) in partitions {
        let count = partition["itemCount"].as_u64().unwrap_or(0);
        let _ = writeln!(out, "{name} ({count} items)");
        for item in partition["items"].as_array().into_iter().flatten() {
            if let Some(item) = item.as_str() {
                let _ = writeln!(out, "  {item}");
            }
        }
    }
    out
}

fn format_metrics(reply: &Value) -> String {
    let counter = |field: &str| reply[field].as_u64().unwrap_or(0);
    let hits = counter("cacheHits");
    let misses = counter("cacheMisses");
    let lookups = hits + misses;

    let mut out = String::new();
    let _ = writeln!(out, "Cache hits:       {hits}");
    let _ = writeln!(out, "Cache misses:     {misses}");
    let _ = writeln!(out, "Network requests: {}", counter("networkRequests"));
    let _ = writeln!(out, "Offline requests: {}", counter("offlineRequests"));
    if lookups > 0 {
        #[allow(clippy::cast_precision_loss)]
        let ratio = hits as f64 / lookups as f64 * 100.0;
        let _ = writeln!(out, "Hit ratio:        {ratio:.1}%");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_send_posts_tagged_message() {
        let proxy = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MESSAGE_PATH))
            .and(body_json(json!({"type": "QUEUE_COMMAND", "command": {"command": "list"}})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "message": "queued", "id": "abc"})),
            )
            .expect(1)
            .mount(&proxy)
            .await;

        let client = ProxyClient::new(&format!("{}/", proxy.uri())).unwrap();
        let reply = client
            .send(&WorkerMessage::QueueCommand {
                command: json!({"command": "list"}),
            })
            .await
            .unwrap();
        assert_eq!(reply["id"], "abc");
    }

    #[tokio::test]
    async fn test_rejected_message_is_an_error() {
        let proxy = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422))
            .mount(&proxy)
            .await;

        let client = ProxyClient::new(&proxy.uri()).unwrap();
        assert!(client.send(&WorkerMessage::ClearCache).await.is_err());
    }

    #[test]
    fn test_operation_result() {
        assert_eq!(
            operation_result(&json!({"success": true, "message": "All caches cleared"})).unwrap(),
            "All caches cleared"
        );
        let err = operation_result(&json!({"success": false, "error": "disk full"})).unwrap_err();
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_format_status() {
        let reply = json!({
            "tether-static-v1": {"itemCount": 2, "items": ["/css/main.css", "/js/app.js"]}
        });
        assert_eq!(
            format_status(&reply),
            "tether-static-v1 (2 items)\n  /css/main.css\n  /js/app.js\n"
        );
        assert_eq!(format_status(&json!({})), "No cache partitions\n");
    }

    #[test]
    fn test_format_metrics_hit_ratio() {
        let reply = json!({
            "cacheHits": 3,
            "cacheMisses": 1,
            "networkRequests": 4,
            "offlineRequests": 0
        });
        let out = format_metrics(&reply);
        assert!(out.contains("Cache hits:       3"));
        assert!(out.contains("Hit ratio:        75.0%"));
    }
}
