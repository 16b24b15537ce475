//! Connection session: the single owner of the realtime transport.
//!
//! The session holds the [`ConnectionState`], opens and closes the transport and
//! turns transport events into [`SessionEvent`]s on one ordered channel. Every
//! `open()` starts a new epoch; events raised by a transport from an older epoch
//! are discarded, so at most one transport is ever live.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tether_core::error::NetworkError;
use tether_telemetry::spans::websocket_span;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info, warn};

use super::state::{ConnectionState, SessionState};

/// Close code for a normal, client-requested close.
pub const NORMAL_CLOSE: u16 = 1000;

/// Close code reported when the transport went away without a close frame.
pub const ABNORMAL_CLOSE: u16 = 1006;

/// Events raised by a live transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame arrived.
    Message(String),
    /// The transport reported an error; a `Closed` event normally follows.
    Error(NetworkError),
    /// The transport closed.
    Closed {
        /// WebSocket close code.
        code: u16,
        /// Whether a close handshake took place.
        was_clean: bool,
    },
}

/// Events surfaced by the session to the realtime client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The transport opened.
    Opened,
    /// A text frame arrived.
    Message(String),
    /// The session closed.
    Closed {
        /// WebSocket close code.
        code: u16,
        /// Whether a close handshake took place.
        was_clean: bool,
    },
    /// The transport reported an error.
    Error(NetworkError),
}

/// A live transport connection.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Sends one text frame.
    async fn send(&self, text: String) -> Result<(), NetworkError>;

    /// Closes the transport. Idempotent.
    async fn close(&self);
}

/// Establishes transport connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connects to `url`, returning the connection and its event stream.
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Arc<dyn Connection>, mpsc::UnboundedReceiver<TransportEvent>), NetworkError>;
}

/// The session surface used by the dispatcher and the reconnect controller.
#[async_trait]
pub trait RealtimeSession: Send + Sync {
    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Returns true if frames can be sent.
    fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// Opens the transport. A no-op while Connecting or Open.
    async fn open(&self) -> Result<(), NetworkError>;

    /// Closes the transport cleanly.
    async fn close(&self);

    /// Sends one serialized frame; fails unless Open.
    async fn send_frame(&self, text: String) -> Result<(), NetworkError>;
}

/// Connection session over a [`Transport`].
pub struct ConnectionSession {
    url: String,
    transport: Arc<dyn Transport>,
    state: Arc<Mutex<SessionState>>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ConnectionSession {
    /// Creates a closed session and the receiver for its events.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = Self {
            url: url.into(),
            transport,
            state: Arc::new(Mutex::new(SessionState::default())),
            events_tx,
        };
        (session, events_rx)
    }

    /// Endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current epoch.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    fn emit(&self, event: SessionEvent) {
        if self.events_tx.send(event).is_err() {
            debug!("Session event receiver dropped");
        }
    }

    fn spawn_forwarder(&self, epoch: u64, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        let state = Arc::clone(&self.state);
        let events_tx = self.events_tx.clone();

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if state.lock().epoch != epoch {
                    debug!(epoch, "Dropping event from stale transport");
                    return;
                }
                let forwarded = match event {
                    TransportEvent::Message(text) => SessionEvent::Message(text),
                    TransportEvent::Error(error) => SessionEvent::Error(error),
                    TransportEvent::Closed { code, was_clean } => {
                        if state.lock().mark_closed(epoch) {
                            info!(epoch, code, was_clean, "Session closed by transport");
                            let _ = events_tx.send(SessionEvent::Closed { code, was_clean });
                        }
                        return;
                    }
                };
                let _ = events_tx.send(forwarded);
            }

            // Transport went away without reporting a close.
            if state.lock().mark_closed(epoch) {
                warn!(epoch, "Transport ended without a close frame");
                let _ = events_tx.send(SessionEvent::Closed {
                    code: ABNORMAL_CLOSE,
                    was_clean: false,
                });
            }
        });
    }
}

#[async_trait]
impl RealtimeSession for ConnectionSession {
    fn state(&self) -> ConnectionState {
        self.state.lock().state
    }

    async fn open(&self) -> Result<(), NetworkError> {
        let epoch = {
            let mut state = self.state.lock();
            if !state.state.can_open() {
                debug!(state = %state.state, "Session already active");
                return Ok(());
            }
            state.begin_connect()
        };

        let span = websocket_span(&self.url, epoch);
        async {
            debug!("Opening session");
            match self.transport.connect(&self.url).await {
                Ok((connection, events)) => {
                    if !self.state.lock().mark_open(epoch, Arc::clone(&connection)) {
                        debug!("Session closed while connecting, discarding transport");
                        connection.close().await;
                        return Ok(());
                    }
                    info!("Session opened");
                    self.emit(SessionEvent::Opened);
                    self.spawn_forwarder(epoch, events);
                    Ok(())
                }
                Err(error) => {
                    self.state.lock().mark_closed(epoch);
                    warn!(error = %error, "Failed to open session");
                    Err(error)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn close(&self) {
        let (epoch, connection) = {
            let mut state = self.state.lock();
            if state.state == ConnectionState::Closed {
                return;
            }
            let connection = state.begin_close();
            (state.epoch, connection)
        };

        if let Some(connection) = connection {
            connection.close().await;
        }

        if self.state.lock().mark_closed(epoch) {
            info!(epoch, "Session closed");
            self.emit(SessionEvent::Closed {
                code: NORMAL_CLOSE,
                was_clean: true,
            });
        }
    }

    async fn send_frame(&self, text: String) -> Result<(), NetworkError> {
        let connection = {
            let state = self.state.lock();
            if state.state.is_open() {
                state.connection.clone()
            } else {
                None
            }
        };

        match connection {
            Some(connection) => connection.send(text).await,
            None => Err(NetworkError::ConnectionClosed {
                code: ABNORMAL_CLOSE,
                reason: "session is not open".to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("url", &self.url)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;

    fn new_session(transport: &Arc<MockTransport>) -> (ConnectionSession, mpsc::UnboundedReceiver<SessionEvent>) {
        ConnectionSession::new("ws://localhost/api/websocket", Arc::clone(transport) as Arc<dyn Transport>)
    }

    #[tokio::test]
    async fn test_open_emits_opened() {
        let transport = Arc::new(MockTransport::new());
        let (session, mut events) = new_session(&transport);

        session.open().await.unwrap();

        assert_eq!(session.state(), ConnectionState::Open);
        assert_eq!(events.recv().await, Some(SessionEvent::Opened));
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_open_while_open_is_noop() {
        let transport = Arc::new(MockTransport::new());
        let (session, _events) = new_session(&transport);

        session.open().await.unwrap();
        session.open().await.unwrap();

        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_open_leaves_session_closed() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_next_connects(1);
        let (session, mut events) = new_session(&transport);

        assert!(session.open().await.is_err());
        assert_eq!(session.state(), ConnectionState::Closed);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_messages_and_unclean_close_are_forwarded() {
        let transport = Arc::new(MockTransport::new());
        let (session, mut events) = new_session(&transport);
        session.open().await.unwrap();
        assert_eq!(events.recv().await, Some(SessionEvent::Opened));

        let conn = transport.last_connection().unwrap();
        conn.push(TransportEvent::Message(r#"{"type":"pong"}"#.to_string()));
        conn.push(TransportEvent::Closed {
            code: ABNORMAL_CLOSE,
            was_clean: false,
        });

        assert_eq!(
            events.recv().await,
            Some(SessionEvent::Message(r#"{"type":"pong"}"#.to_string()))
        );
        assert_eq!(
            events.recv().await,
            Some(SessionEvent::Closed {
                code: ABNORMAL_CLOSE,
                was_clean: false
            })
        );
        assert_eq!(session.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_events_from_previous_epoch_are_ignored() {
        let transport = Arc::new(MockTransport::new());
        let (session, mut events) = new_session(&transport);

        session.open().await.unwrap();
        let first = transport.last_connection().unwrap();
        session.close().await;
        session.open().await.unwrap();

        assert_eq!(events.recv().await, Some(SessionEvent::Opened));
        assert_eq!(
            events.recv().await,
            Some(SessionEvent::Closed {
                code: NORMAL_CLOSE,
                was_clean: true
            })
        );
        assert_eq!(events.recv().await, Some(SessionEvent::Opened));

        first.push(TransportEvent::Message("stale".to_string()));
        tokio::task::yield_now().await;

        assert!(first.is_closed());
        assert!(events.try_recv().is_err());
        assert_eq!(session.state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn test_send_frame_requires_open() {
        let transport = Arc::new(MockTransport::new());
        let (session, _events) = new_session(&transport);

        assert!(session.send_frame("{}".to_string()).await.is_err());

        session.open().await.unwrap();
        session.send_frame(r#"{"type":"ping"}"#.to_string()).await.unwrap();

        let conn = transport.last_connection().unwrap();
        assert_eq!(conn.sent(), vec![r#"{"type":"ping"}"#.to_string()]);
    }
}
