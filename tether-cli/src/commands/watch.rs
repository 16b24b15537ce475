//! Realtime stream watching.

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use serde_json::Value;
use std::sync::Arc;
use tether_core::config::TetherConfig;
use tether_core::types::ChannelId;
use tether_gateway::realtime::{
    BroadcastNotifier, MessageKind, Notification, Notifier, RealtimeClient, RealtimeConfig,
    handler,
};
use tether_gateway::rest::{RestClient, RestConfig};
use tether_gateway::ws::WebSocketConfig;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use super::session::open_credentials;

/// Arguments for the watch command
#[derive(Parser)]
pub struct WatchArgs {
    /// Channel to subscribe to; repeat for several
    #[arg(long = "channel", value_name = "CHANNEL")]
    pub channels: Vec<String>,

    /// Session token; stored before connecting
    #[arg(long, env = "TETHER_TOKEN")]
    pub token: Option<String>,

    /// Print raw JSON payloads
    #[arg(long)]
    pub json: bool,
}

/// Connects, subscribes and prints every message and notification until
/// Ctrl+C or a notification that needs user action.
///
/// # Errors
///
/// Returns error if the client cannot be configured.
pub async fn run(config: &TetherConfig, args: WatchArgs) -> Result<()> {
    let credentials = Arc::new(open_credentials(config)?);
    if let Some(token) = &args.token {
        credentials
            .set_token(token)
            .context("Failed to store session token")?;
    }

    let realtime = realtime_config(config, &args.channels)?;
    let base_url = &config.backend.base_url;
    let websocket = WebSocketConfig::builder()
        .backend(base_url)
        .ping_interval(config.realtime.ping_interval())
        .build();
    let rest = RestClient::new(
        RestConfig::builder()
            .base_url(base_url.as_str())
            .timeout(config.realtime.request_timeout())
            .build(),
    )
    .context("Failed to build REST client")?;

    let notifier = Arc::new(BroadcastNotifier::default());
    let mut notifications = notifier.subscribe();
    let client = RealtimeClient::builder()
        .config(realtime)
        .websocket(websocket)
        .rest(rest)
        .credentials(credentials)
        .notifier(Arc::clone(&notifier) as Arc<dyn Notifier>)
        .build()
        .context("Failed to build realtime client")?;

    let raw = args.json;
    for kind in MessageKind::KNOWN {
        // auth_expired keeps its built-in handler.
        if matches!(kind, MessageKind::AuthExpired | MessageKind::Pong) {
            continue;
        }
        let tag = kind.as_str().to_string();
        client.on(
            kind,
            handler(move |data| {
                println!("{}", format_message(&tag, data, raw));
                Ok(())
            }),
        );
    }

    info!(base_url = %base_url, "Connecting");
    if let Err(e) = client.start().await {
        warn!(error = %e, "Initial connection failed, retrying in the background");
    }

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "Failed to listen for Ctrl+C");
                }
                break;
            }
            received = notifications.recv() => match received {
                Ok(notification) => {
                    println!("{}", format_notification(&notification));
                    if notification.is_terminal() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Dropped notifications");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    client.shutdown().await;
    Ok(())
}

/// Configured channels plus the ones given on the command line.
fn realtime_config(config: &TetherConfig, channels: &[String]) -> Result<RealtimeConfig> {
    let mut realtime = RealtimeConfig::from(&config.realtime);
    for name in channels {
        let channel = ChannelId::new(name.as_str())
            .map_err(|e| anyhow!("Invalid channel '{name}': {e}"))?;
        if !realtime.channels.contains(&channel) {
            realtime.channels.push(channel);
        }
    }
    Ok(realtime)
}

fn format_message(tag: &str, data: &Value, raw: bool) -> String {
    if raw {
        return serde_json::json!({"type": tag, "data": data}).to_string();
    }
    let summary = match data {
        Value::Object(fields) => fields
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| data.to_string(), ToString::to_string),
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    format!("[{tag}] {summary}")
}

fn format_notification(notification: &Notification) -> String {
    format!("* {notification}")
}
