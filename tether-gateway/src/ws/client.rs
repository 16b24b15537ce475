//! WebSocket transport built on tokio-tungstenite.

#![allow(clippy::too_many_lines)]

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use tether_core::error::NetworkError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message as TungsteniteMessage};
use tracing::{debug, error, info, warn};

use super::config::WebSocketConfig;
use super::session::{ABNORMAL_CLOSE, Connection, Transport, TransportEvent};

/// Close code used when the peer sends a close frame without a status.
const NO_STATUS_CLOSE: u16 = 1005;

type Outgoing = (String, oneshot::Sender<Result<(), NetworkError>>);

/// WebSocket [`Transport`].
///
/// Each connection runs one task that multiplexes outgoing frames, incoming
/// frames and the application ping on a single `select!` loop.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use tether_gateway::ws::{ConnectionSession, WebSocketConfig, WebSocketTransport};
///
/// let config = WebSocketConfig::builder().backend("https://panel.example.com").build();
/// let url = config.url.clone();
/// let (session, events) = ConnectionSession::new(url, Arc::new(WebSocketTransport::new(config)));
/// ```
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    config: WebSocketConfig,
}

impl WebSocketTransport {
    /// Creates a transport with the given configuration.
    #[must_use]
    pub fn new(config: WebSocketConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }

    async fn run_connection<S, R, E>(
        mut sink: S,
        mut stream: R,
        mut send_rx: mpsc::Receiver<Outgoing>,
        mut shutdown_rx: mpsc::Receiver<()>,
        events_tx: mpsc::UnboundedSender<TransportEvent>,
        config: WebSocketConfig,
    ) where
        S: Sink<TungsteniteMessage> + Unpin,
        S::Error: Display,
        R: Stream<Item = Result<TungsteniteMessage, E>> + Unpin,
        E: Display,
    {
        let period = config.ping_interval();
        let mut ping_interval = interval_at(Instant::now() + period, period);
        ping_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Shutdown requested");
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "".into(),
                    };
                    let _ = sink.send(TungsteniteMessage::Close(Some(frame))).await;
                    let _ = sink.close().await;
                    break;
                }

                Some((text, ack)) = send_rx.recv() => {
                    let result = sink
                        .send(TungsteniteMessage::Text(text))
                        .await
                        .map_err(|e| NetworkError::WebSocket { reason: e.to_string() });
                    if let Err(e) = &result {
                        error!(error = %e, "Failed to send frame");
                    }
                    let _ = ack.send(result);
                }

                incoming = stream.next() => {
                    match incoming {
                        Some(Ok(TungsteniteMessage::Text(text))) => {
                            let _ = events_tx.send(TransportEvent::Message(text));
                        }
                        Some(Ok(TungsteniteMessage::Binary(bytes))) => match String::from_utf8(bytes) {
                            Ok(text) => {
                                let _ = events_tx.send(TransportEvent::Message(text));
                            }
                            Err(_) => debug!("Ignoring non-UTF-8 binary frame"),
                        },
                        Some(Ok(TungsteniteMessage::Ping(data))) => {
                            if let Err(e) = sink.send(TungsteniteMessage::Pong(data)).await {
                                warn!(error = %e, "Failed to send pong");
                            }
                        }
                        Some(Ok(TungsteniteMessage::Pong(_))) => debug!("Pong received"),
                        Some(Ok(TungsteniteMessage::Close(frame))) => {
                            let code = frame.map_or(NO_STATUS_CLOSE, |f| u16::from(f.code));
                            info!(code, "Server sent close frame");
                            let _ = events_tx.send(TransportEvent::Closed { code, was_clean: true });
                            break;
                        }
                        Some(Ok(TungsteniteMessage::Frame(_))) => {}
                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            let _ = events_tx.send(TransportEvent::Error(NetworkError::WebSocket {
                                reason: e.to_string(),
                            }));
                            let _ = events_tx.send(TransportEvent::Closed {
                                code: ABNORMAL_CLOSE,
                                was_clean: false,
                            });
                            break;
                        }
                        None => {
                            warn!("WebSocket stream ended");
                            let _ = events_tx.send(TransportEvent::Closed {
                                code: ABNORMAL_CLOSE,
                                was_clean: false,
                            });
                            break;
                        }
                    }
                }

                _ = ping_interval.tick() => {
                    if config.auto_ping {
                        let ping = match &config.custom_ping_message {
                            Some(custom) => TungsteniteMessage::Text(custom.clone()),
                            None => TungsteniteMessage::Ping(Vec::new()),
                        };
                        if let Err(e) = sink.send(ping).await {
                            warn!(error = %e, "Failed to send ping");
                        } else {
                            debug!("Ping sent");
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Arc<dyn Connection>, mpsc::UnboundedReceiver<TransportEvent>), NetworkError> {
        let (ws_stream, _) = timeout(self.config.connect_timeout(), connect_async(url))
            .await
            .map_err(|_| NetworkError::Timeout {
                timeout_ms: self.config.connect_timeout_ms,
            })?
            .map_err(|e| NetworkError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        let (sink, stream) = ws_stream.split();
        let (send_tx, send_rx) = mpsc::channel(self.config.send_buffer);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::run_connection(
            sink,
            stream,
            send_rx,
            shutdown_rx,
            events_tx,
            self.config.clone(),
        ));

        let connection = WebSocketConnection {
            send_tx,
            shutdown_tx,
        };
        Ok((Arc::new(connection), events_rx))
    }
}

/// Handle to one running WebSocket connection task.
struct WebSocketConnection {
    send_tx: mpsc::Sender<Outgoing>,
    shutdown_tx: mpsc::Sender<()>,
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn send(&self, text: String) -> Result<(), NetworkError> {
        let closed = || NetworkError::ConnectionClosed {
            code: ABNORMAL_CLOSE,
            reason: "connection task stopped".to_string(),
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send_tx
            .send((text, ack_tx))
            .await
            .map_err(|_| closed())?;
        ack_rx.await.map_err(|_| closed())?
    }

    async fn close(&self) {
        let _ = self.shutdown_tx.try_send(());
    }
}
