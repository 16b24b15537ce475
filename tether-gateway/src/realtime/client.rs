//! Realtime client: wires session, dispatcher, reconnect controller and
//! heartbeat together and runs the session event loop.

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tether_core::error::{ConfigError, NetworkError};
use tether_core::types::ChannelId;
use tether_telemetry::metrics::TetherMetrics;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::RealtimeConfig;
use super::dispatcher::{
    DispatchError, DispatchOutcome, MessageDispatcher, MessageHandler, SendStatus, handler,
};
use super::heartbeat::{HeartbeatMonitor, HeartbeatStats};
use super::notify::{LinkStatus, LogNotifier, Notification, Notifier};
use super::protocol::{MessageKind, OutboundMessage};
use super::reconnect::{FailureCause, ReconnectController, ReconnectPhase};
use crate::auth::CredentialStore;
use crate::rest::{CredentialValidator, LivenessProbe, RestClient};
use crate::ws::{ConnectionSession, RealtimeSession, SessionEvent, Transport, WebSocketConfig, WebSocketTransport};

/// The realtime client.
///
/// Every session event is applied by one event-loop task, in order:
///
/// - `Opened`: the dispatcher's handshake: authenticate, resubscribe, then
///   drain the outbound queue
/// - `Message`: route through the [`MessageDispatcher`]
/// - `Closed`: sends queue up again until the next `Opened`; an unclean close
///   enters the reconnect failure path
/// - `Error`: logged
///
/// A handler for `auth_expired` is installed by default; it clears the stored
/// token, raises [`Notification::SessionExpired`] and stops the heartbeat.
pub struct RealtimeClient {
    config: RealtimeConfig,
    session: Arc<ConnectionSession>,
    dispatcher: Arc<MessageDispatcher>,
    controller: Arc<ReconnectController>,
    heartbeat: Arc<HeartbeatMonitor>,
    credentials: Arc<CredentialStore>,
    status: Arc<watch::Sender<LinkStatus>>,
    notifier: Arc<dyn Notifier>,
    events: Mutex<Option<mpsc::UnboundedReceiver<SessionEvent>>>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeClient {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> RealtimeClientBuilder {
        RealtimeClientBuilder::default()
    }

    /// Starts the event loop and the heartbeat, then opens the session.
    ///
    /// A failed open is returned and also enters the reconnect failure path,
    /// so recovery continues in the background.
    pub async fn start(&self) -> Result<(), NetworkError> {
        let events = self.events.lock().take();
        if let Some(events) = events {
            for channel in &self.config.channels {
                // Recorded now, sent by the handshake that follows `Opened`.
                let _ = self.dispatcher.subscribe(channel.clone()).await;
            }
            let event_loop = EventLoop {
                dispatcher: Arc::clone(&self.dispatcher),
                controller: Arc::clone(&self.controller),
                credentials: Arc::clone(&self.credentials),
                status: Arc::clone(&self.status),
                notifier: Arc::clone(&self.notifier),
            };
            *self.event_loop.lock() = Some(tokio::spawn(event_loop.run(events)));
        }

        set_status(&self.status, self.notifier.as_ref(), LinkStatus::Connecting);
        self.heartbeat.start();
        self.open().await
    }

    async fn open(&self) -> Result<(), NetworkError> {
        match self.session.open().await {
            Ok(()) => Ok(()),
            Err(e) => {
                set_status(&self.status, self.notifier.as_ref(), LinkStatus::Disconnected);
                self.controller
                    .on_failure(FailureCause::ConnectFailed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Stops the heartbeat, fails pending requests and closes the session cleanly.
    pub async fn shutdown(&self) {
        info!("Shutting down realtime client");
        self.heartbeat.stop();
        self.session.close().await;
        self.dispatcher.close_pending();
        set_status(&self.status, self.notifier.as_ref(), LinkStatus::Disconnected);
    }

    /// User-triggered reload after giving up: resets the controller, restarts
    /// the heartbeat and reopens the session.
    pub async fn reset(&self) -> Result<(), NetworkError> {
        self.controller.reset();
        self.heartbeat.start();
        if self.session.is_open() {
            return Ok(());
        }
        set_status(&self.status, self.notifier.as_ref(), LinkStatus::Connecting);
        self.open().await
    }

    /// Sends or queues a message.
    pub async fn send(&self, message: OutboundMessage) -> Result<SendStatus, DispatchError> {
        self.dispatcher.send(message).await
    }

    /// Sends a request and waits for its reply.
    pub async fn request(&self, kind: &str, data: Value) -> Result<Value, DispatchError> {
        self.dispatcher.request(kind, data).await
    }

    /// Registers the handler for `kind`, replacing any previous one.
    pub fn on(&self, kind: impl Into<MessageKind>, handler: impl MessageHandler + 'static) {
        self.dispatcher.on(kind, handler);
    }

    /// Subscribes to a channel, now or on the next open.
    pub async fn subscribe(&self, channel: ChannelId) -> Result<SendStatus, DispatchError> {
        self.dispatcher.subscribe(channel).await
    }

    /// Unsubscribes from a channel.
    pub async fn unsubscribe(&self, channel: &ChannelId) -> Result<SendStatus, DispatchError> {
        self.dispatcher.unsubscribe(channel).await
    }

    /// Current link status.
    #[must_use]
    pub fn status(&self) -> LinkStatus {
        *self.status.borrow()
    }

    /// Watches link status changes.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<LinkStatus> {
        self.status.subscribe()
    }

    /// Current reconnect phase.
    #[must_use]
    pub fn phase(&self) -> ReconnectPhase {
        self.controller.phase()
    }

    /// Heartbeat bookkeeping.
    #[must_use]
    pub fn heartbeat_stats(&self) -> HeartbeatStats {
        self.heartbeat.stats()
    }

    /// The message dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<MessageDispatcher> {
        &self.dispatcher
    }

    /// The reconnect controller.
    #[must_use]
    pub fn controller(&self) -> &Arc<ReconnectController> {
        &self.controller
    }

    /// The credential store.
    #[must_use]
    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// The connection session.
    #[must_use]
    pub fn session(&self) -> &Arc<ConnectionSession> {
        &self.session
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        self.heartbeat.stop();
        if let Some(handle) = self.event_loop.get_mut().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("url", &self.session.url())
            .field("status", &*self.status.borrow())
            .field("phase", &self.controller.phase())
            .finish_non_exhaustive()
    }
}

fn set_status(status: &watch::Sender<LinkStatus>, notifier: &dyn Notifier, next: LinkStatus) {
    let changed = status.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
    if changed {
        notifier.notify(Notification::StatusChanged { status: next });
    }
}

struct EventLoop {
    dispatcher: Arc<MessageDispatcher>,
    controller: Arc<ReconnectController>,
    credentials: Arc<CredentialStore>,
    status: Arc<watch::Sender<LinkStatus>>,
    notifier: Arc<dyn Notifier>,
}

impl EventLoop {
    async fn run(self, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        while let Some(event) = events.recv().await {
            self.apply(event).await;
        }
        debug!("Session event stream ended");
    }

    async fn apply(&self, event: SessionEvent) {
        match event {
            SessionEvent::Opened => {
                set_status(&self.status, self.notifier.as_ref(), LinkStatus::Connected);
                TetherMetrics::websocket_connected(true);
                self.dispatcher.on_open(self.greeting()).await;
            }
            SessionEvent::Message(text) => match self.dispatcher.on_message(&text) {
                DispatchOutcome::Malformed => debug!(len = text.len(), "Dropped malformed frame"),
                outcome => debug!(?outcome, "Frame dispatched"),
            },
            SessionEvent::Closed { code, was_clean } => {
                self.dispatcher.on_close();
                set_status(&self.status, self.notifier.as_ref(), LinkStatus::Disconnected);
                TetherMetrics::websocket_connected(false);
                if was_clean {
                    info!(code, "Session closed cleanly");
                } else {
                    warn!(code, "Session closed unexpectedly");
                    self.controller
                        .on_failure(FailureCause::TransportClosed { code });
                }
            }
            SessionEvent::Error(e) => warn!(error = %e, "Session error"),
        }
    }

    /// The authentication frame that opens every connection.
    fn greeting(&self) -> Option<OutboundMessage> {
        let token = self.credentials.token();
        if token.is_none() {
            warn!("No session token, continuing unauthenticated");
        }
        token.map(|token| OutboundMessage::authenticate(&token))
    }
}

/// Builder for [`RealtimeClient`].
#[derive(Default)]
pub struct RealtimeClientBuilder {
    config: Option<RealtimeConfig>,
    url: Option<String>,
    transport: Option<Arc<dyn Transport>>,
    probe: Option<Arc<dyn LivenessProbe>>,
    validator: Option<Arc<dyn CredentialValidator>>,
    credentials: Option<Arc<CredentialStore>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl RealtimeClientBuilder {
    /// Sets timing and channel configuration.
    #[must_use]
    pub fn config(mut self, config: RealtimeConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Uses a tokio-tungstenite transport for `config.url`.
    #[must_use]
    pub fn websocket(mut self, config: WebSocketConfig) -> Self {
        self.url = Some(config.url.clone());
        self.transport = Some(Arc::new(WebSocketTransport::new(config)));
        self
    }

    /// Uses a custom transport.
    #[must_use]
    pub fn transport(mut self, url: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        self.url = Some(url.into());
        self.transport = Some(transport);
        self
    }

    /// Uses `client` for both the heartbeat probe and credential validation.
    #[must_use]
    pub fn rest(mut self, client: RestClient) -> Self {
        let client = Arc::new(client);
        self.probe = Some(Arc::clone(&client) as Arc<dyn LivenessProbe>);
        self.validator = Some(client as Arc<dyn CredentialValidator>);
        self
    }

    /// Sets the heartbeat probe.
    #[must_use]
    pub fn probe(mut self, probe: Arc<dyn LivenessProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Sets the credential validator.
    #[must_use]
    pub fn validator(mut self, validator: Arc<dyn CredentialValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Sets the credential store. Defaults to an in-memory store.
    #[must_use]
    pub fn credentials(mut self, credentials: Arc<CredentialStore>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the notification sink. Defaults to [`LogNotifier`].
    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Builds the client.
    pub fn build(self) -> Result<RealtimeClient, ConfigError> {
        let url = self.url.ok_or_else(|| ConfigError::missing_field("url"))?;
        let transport = self
            .transport
            .ok_or_else(|| ConfigError::missing_field("transport"))?;
        let probe = self.probe.ok_or_else(|| ConfigError::missing_field("probe"))?;
        let validator = self
            .validator
            .ok_or_else(|| ConfigError::missing_field("validator"))?;
        let config = self.config.unwrap_or_default();
        let credentials = self
            .credentials
            .unwrap_or_else(|| Arc::new(CredentialStore::in_memory()));
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(LogNotifier));

        let (session, events) = ConnectionSession::new(url, transport);
        let session = Arc::new(session);
        let dispatcher = Arc::new(MessageDispatcher::new(
            Arc::clone(&session) as Arc<dyn RealtimeSession>,
            config.request_timeout(),
        ));
        let controller = Arc::new(ReconnectController::new(
            config.clone(),
            Arc::clone(&session) as Arc<dyn RealtimeSession>,
            validator,
            Arc::clone(&credentials),
            Arc::clone(&notifier),
        ));
        let heartbeat = Arc::new(HeartbeatMonitor::new(
            probe,
            Arc::clone(&credentials),
            Arc::clone(&controller),
            config.heartbeat_interval(),
            config.heartbeat_timeout(),
        ));

        {
            let controller = Arc::clone(&controller);
            let heartbeat = Arc::clone(&heartbeat);
            dispatcher.on(
                MessageKind::AuthExpired,
                handler(move |_| {
                    controller.expire_session("backend reported auth_expired");
                    heartbeat.stop();
                    Ok(())
                }),
            );
        }

        let (status, _) = watch::channel(LinkStatus::Disconnected);

        Ok(RealtimeClient {
            config,
            session,
            dispatcher,
            controller,
            heartbeat,
            credentials,
            status: Arc::new(status),
            notifier,
            events: Mutex::new(Some(events)),
            event_loop: Mutex::new(None),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        MockProbe, MockTransport, MockValidator, ProbeResult, RecordingNotifier, Validation,
    };
    use crate::ws::{ABNORMAL_CLOSE, TransportEvent};
    use std::time::Duration;
    use tokio::task::yield_now;

    struct Fixture {
        client: RealtimeClient,
        transport: Arc<MockTransport>,
        validator: Arc<MockValidator>,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture(config: RealtimeConfig) -> Fixture {
        let transport = Arc::new(MockTransport::new());
        let validator = Arc::new(MockValidator::new(Validation::Valid));
        let notifier = Arc::new(RecordingNotifier::default());
        let credentials = Arc::new(CredentialStore::in_memory());
        credentials.set_token("tok").unwrap();

        let client = RealtimeClient::builder()
            .config(config)
            .transport(
                "ws://localhost/api/websocket",
                Arc::clone(&transport) as Arc<dyn Transport>,
            )
            .probe(Arc::new(MockProbe::always(ProbeResult::Ok)))
            .validator(Arc::clone(&validator) as Arc<dyn CredentialValidator>)
            .credentials(credentials)
            .notifier(Arc::clone(&notifier) as Arc<dyn Notifier>)
            .build()
            .unwrap();

        Fixture {
            client,
            transport,
            validator,
            notifier,
        }
    }

    fn kinds(frames: &[String]) -> Vec<String> {
        frames
            .iter()
            .map(|f| serde_json::from_str::<Value>(f).unwrap()["type"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_build_requires_transport() {
        let result = RealtimeClient::builder()
            .probe(Arc::new(MockProbe::always(ProbeResult::Ok)))
            .build();
        assert!(matches!(result, Err(ConfigError::MissingField { .. })));
    }

    #[tokio::test]
    async fn test_open_sends_authenticate_then_subscribe_then_queue() {
        let config = RealtimeConfig::builder()
            .channel(ChannelId::new("console").unwrap())
            .build();
        let f = fixture(config);
        let status = f.client.send(OutboundMessage::new("queued")).await.unwrap();
        assert_eq!(status, SendStatus::Queued);

        f.client.start().await.unwrap();
        let conn = f.transport.last_connection().unwrap();
        while conn.sent().len() < 3 {
            yield_now().await;
        }

        assert_eq!(
            kinds(&conn.sent()),
            vec!["authenticate", "subscribe", "queued"]
        );
        let auth: Value = serde_json::from_str(&conn.sent()[0]).unwrap();
        assert_eq!(auth["token"], "tok");
        assert_eq!(f.client.status(), LinkStatus::Connected);
    }

    #[tokio::test]
    async fn test_inbound_message_reaches_handler() {
        let f = fixture(RealtimeConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        f.client.on(
            "console_output",
            handler(move |data: &Value| {
                let _ = tx.send(data["message"].as_str().unwrap_or_default().to_string());
                Ok(())
            }),
        );
        f.client.start().await.unwrap();

        f.transport.last_connection().unwrap().push(TransportEvent::Message(
            r#"{"type":"console_output","data":{"level":"info","message":"hello"}}"#.to_string(),
        ));

        assert_eq!(rx.recv().await.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_auth_expired_clears_token() {
        let f = fixture(RealtimeConfig::default());
        f.client.start().await.unwrap();

        f.transport
            .last_connection()
            .unwrap()
            .push(TransportEvent::Message(r#"{"type":"auth_expired"}"#.to_string()));
        while f.notifier.count(&Notification::SessionExpired) == 0 {
            yield_now().await;
        }

        assert!(f.client.credentials().token().is_none());
        assert_eq!(f.client.phase(), ReconnectPhase::SessionExpired);
        assert!(f.client.heartbeat_stats().last_heartbeat.is_none());
    }

    #[tokio::test]
    async fn test_unclean_close_enters_failure_path() {
        let f = fixture(RealtimeConfig::default());
        f.client.start().await.unwrap();
        let mut status = f.client.watch_status();

        f.transport
            .last_connection()
            .unwrap()
            .push(TransportEvent::Closed {
                code: ABNORMAL_CLOSE,
                was_clean: false,
            });
        status
            .wait_for(|s| *s == LinkStatus::Disconnected)
            .await
            .unwrap();
        while f.client.phase() == ReconnectPhase::Stable {
            yield_now().await;
        }

        assert_eq!(f.client.phase(), ReconnectPhase::Backoff(1));
        assert_eq!(f.notifier.problems(), vec![1]);
        assert_eq!(f.client.status(), LinkStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_shutdown_closes_cleanly() {
        let f = fixture(RealtimeConfig::default());
        f.client.start().await.unwrap();
        let conn = f.transport.last_connection().unwrap();

        f.client.shutdown().await;
        for _ in 0..10 {
            yield_now().await;
        }

        assert!(conn.is_closed());
        assert_eq!(f.client.phase(), ReconnectPhase::Stable);
        assert_eq!(f.client.status(), LinkStatus::Disconnected);
        assert!(f.notifier.problems().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_start_recovers_after_backoff() {
        let f = fixture(RealtimeConfig::default());
        f.transport.fail_next_connects(1);

        assert!(f.client.start().await.is_err());
        assert_eq!(f.client.phase(), ReconnectPhase::Backoff(1));

        tokio::time::sleep(Duration::from_millis(2_100)).await;

        assert_eq!(f.validator.calls(), 1);
        assert_eq!(f.transport.connect_count(), 2);
        assert_eq!(f.client.phase(), ReconnectPhase::Stable);
        assert_eq!(f.notifier.count(&Notification::ConnectionRestored), 1);
        assert_eq!(f.client.status(), LinkStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_reopen_failure_still_reconnects() {
        let f = fixture(RealtimeConfig::default());
        f.client.start().await.unwrap();
        let first = f.transport.last_connection().unwrap();
        f.transport.fail_next_connects(1);
        first.push(TransportEvent::Closed {
            code: ABNORMAL_CLOSE,
            was_clean: false,
        });

        // Heartbeats keep answering the whole time.
        tokio::time::sleep(Duration::from_secs(600)).await;

        assert_eq!(f.transport.connect_count(), 3);
        assert!(!f.transport.last_connection().unwrap().is_closed());
        assert_eq!(f.client.phase(), ReconnectPhase::Stable);
        assert_eq!(f.client.status(), LinkStatus::Connected);
        assert_eq!(f.notifier.problems(), vec![1, 2]);
        assert_eq!(f.notifier.count(&Notification::ConnectionRestored), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_resubscribes_on_new_connection() {
        let config = RealtimeConfig::builder()
            .channel(ChannelId::new("players").unwrap())
            .build();
        let f = fixture(config);
        f.client.start().await.unwrap();
        let first = f.transport.last_connection().unwrap();
        first.push(TransportEvent::Closed {
            code: ABNORMAL_CLOSE,
            was_clean: false,
        });

        tokio::time::sleep(Duration::from_millis(2_100)).await;

        let second = f.transport.last_connection().unwrap();
        assert_eq!(f.transport.connect_count(), 2);
        assert_eq!(kinds(&second.sent()), vec!["authenticate", "subscribe"]);
    }
}
