//! Message dispatcher: outbound queue, request/reply correlation and
//! routing of inbound messages to handlers by type.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;
use tether_core::types::{ChannelId, RequestId, Timestamp};
use tether_telemetry::metrics::TetherMetrics;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::protocol::{InboundMessage, MessageKind, OutboundMessage};
use crate::ws::RealtimeSession;

/// Late replies are recognised for this many expired request ids.
const EXPIRED_ID_MEMORY: usize = 256;

/// Dispatcher errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// No reply arrived in time.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The backend answered with an error.
    #[error("request rejected: {message}")]
    Rejected {
        /// Error reported by the backend.
        message: String,
    },

    /// The message could not be serialized.
    #[error("serialization failed: {reason}")]
    Serialization {
        /// Serializer error.
        reason: String,
    },

    /// The dispatcher was shut down before a reply arrived.
    #[error("dispatcher closed")]
    Closed,
}

/// Result of [`MessageDispatcher::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// Transmitted.
    Sent,
    /// Held in the outbound queue until the session opens.
    Queued,
}

/// What happened to an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Settled a pending request.
    Settled(RequestId),
    /// Reply for a request that already timed out; dropped.
    LateReply(RequestId),
    /// Delivered to the registered handler.
    Handled(MessageKind),
    /// The handler returned an error or panicked; logged.
    HandlerFailed(MessageKind),
    /// No handler registered; dropped.
    Unhandled(MessageKind),
    /// Not a valid frame; dropped.
    Malformed,
}

/// Error returned by a message handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// Handles the payload of one message kind.
pub trait MessageHandler: Send + Sync {
    /// Handles `data`. Errors are logged by the dispatcher.
    fn handle(&self, data: &Value) -> Result<(), HandlerError>;
}

/// Adapts a closure into a [`MessageHandler`].
pub struct FnHandler<F>(F);

impl<F> MessageHandler for FnHandler<F>
where
    F: Fn(&Value) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, data: &Value) -> Result<(), HandlerError> {
        (self.0)(data)
    }
}

/// Wraps a closure as a handler.
///
/// ```
/// use tether_gateway::realtime::handler;
///
/// let on_console = handler(|data| {
///     println!("{}", data["message"]);
///     Ok(())
/// });
/// # let _ = on_console;
/// ```
pub fn handler<F>(f: F) -> FnHandler<F>
where
    F: Fn(&Value) -> Result<(), HandlerError> + Send + Sync,
{
    FnHandler(f)
}

struct PendingRequest {
    reply: oneshot::Sender<Result<Value, DispatchError>>,
    created_at: Timestamp,
}

struct QueuedFrame {
    kind: String,
    text: String,
}

/// Whether sends may go straight to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Link {
    /// No session; sends queue up.
    #[default]
    Down,
    /// Opened, handshake or drain still running; sends queue up.
    Handshake,
    /// Handshake sent and queue drained.
    Ready,
}

#[derive(Default)]
struct DispatcherState {
    link: Link,
    queue: VecDeque<QueuedFrame>,
    pending: HashMap<RequestId, PendingRequest>,
    expired: VecDeque<RequestId>,
    handlers: HashMap<MessageKind, Arc<dyn MessageHandler>>,
    subscriptions: BTreeSet<ChannelId>,
}

impl DispatcherState {
    fn remember_expired(&mut self, id: RequestId) {
        if self.expired.len() == EXPIRED_ID_MEMORY {
            self.expired.pop_front();
        }
        self.expired.push_back(id);
    }

    fn forget_expired(&mut self, id: &RequestId) -> bool {
        match self.expired.iter().position(|e| e == id) {
            Some(index) => {
                self.expired.remove(index);
                true
            }
            None => false,
        }
    }
}

/// Routes realtime messages between the session and the application.
pub struct MessageDispatcher {
    session: Arc<dyn RealtimeSession>,
    request_timeout: Duration,
    state: Mutex<DispatcherState>,
}

impl MessageDispatcher {
    /// Creates a dispatcher sending through `session`.
    #[must_use]
    pub fn new(session: Arc<dyn RealtimeSession>, request_timeout: Duration) -> Self {
        Self {
            session,
            request_timeout,
            state: Mutex::new(DispatcherState::default()),
        }
    }

    /// Sends `message` now if the link is ready and nothing is queued ahead of
    /// it, otherwise queues it.
    ///
    /// A failed transmission also queues the message. Queuing is not an error.
    pub async fn send(&self, message: OutboundMessage) -> Result<SendStatus, DispatchError> {
        let text = message
            .to_json()
            .map_err(|e| DispatchError::Serialization {
                reason: e.to_string(),
            })?;
        let frame = QueuedFrame {
            kind: message.kind,
            text,
        };

        let Some(frame) = self.hold_unless_ready(frame) else {
            return Ok(SendStatus::Queued);
        };
        match self.session.send_frame(frame.text.clone()).await {
            Ok(()) => {
                debug!(kind = %frame.kind, "Message sent");
                Ok(SendStatus::Sent)
            }
            Err(e) => {
                warn!(kind = %frame.kind, error = %e, "Send failed, queueing message");
                self.enqueue(frame);
                Ok(SendStatus::Queued)
            }
        }
    }

    /// Queues `frame` unless the link is ready with an empty queue. Checked and
    /// queued under one lock so a finishing drain cannot strand the frame.
    fn hold_unless_ready(&self, frame: QueuedFrame) -> Option<QueuedFrame> {
        let mut state = self.state.lock();
        if state.link == Link::Ready && state.queue.is_empty() && self.session.is_open() {
            return Some(frame);
        }
        debug!(kind = %frame.kind, link = ?state.link, "Link not ready, queueing message");
        state.queue.push_back(frame);
        TetherMetrics::outbound_queue_depth(state.queue.len());
        None
    }

    fn enqueue(&self, frame: QueuedFrame) {
        let depth = {
            let mut state = self.state.lock();
            state.queue.push_back(frame);
            state.queue.len()
        };
        TetherMetrics::outbound_queue_depth(depth);
    }

    /// Runs the open handshake and returns the number of queued frames sent.
    ///
    /// `greeting` (the authentication frame) goes out first, then a subscribe
    /// frame per channel in the subscription set, then the outbound queue in
    /// arrival order. Messages sent meanwhile join the back of the queue, so
    /// nothing overtakes the handshake or an older message. A queued frame that
    /// fails to send goes back to the end of the queue and the drain continues;
    /// direct sends resume only once the queue has been emptied.
    pub async fn on_open(&self, greeting: Option<OutboundMessage>) -> usize {
        let channels: Vec<ChannelId> = {
            let mut state = self.state.lock();
            state.link = Link::Handshake;
            state.subscriptions.iter().cloned().collect()
        };

        if let Some(greeting) = greeting {
            self.send_handshake_frame(&greeting).await;
        }
        for channel in &channels {
            self.send_handshake_frame(&OutboundMessage::subscribe(channel))
                .await;
        }
        if !channels.is_empty() {
            debug!(count = channels.len(), "Resubscribed channels");
        }

        let mut sent = 0;
        let mut failed = 0;
        loop {
            let batch: Vec<QueuedFrame> = {
                let mut state = self.state.lock();
                if state.link != Link::Handshake {
                    break;
                }
                if state.queue.is_empty() {
                    state.link = Link::Ready;
                    break;
                }
                if failed > 0 {
                    break;
                }
                state.queue.drain(..).collect()
            };
            for frame in batch {
                if self.session.is_open() {
                    match self.session.send_frame(frame.text.clone()).await {
                        Ok(()) => {
                            sent += 1;
                            continue;
                        }
                        Err(e) => {
                            warn!(kind = %frame.kind, error = %e, "Queued send failed, requeueing");
                        }
                    }
                }
                failed += 1;
                self.enqueue(frame);
            }
        }

        let depth = self.state.lock().queue.len();
        TetherMetrics::outbound_queue_depth(depth);
        if sent > 0 || depth > 0 {
            info!(sent, remaining = depth, "Drained outbound queue");
        }
        sent
    }

    /// Frames that belong to one connection only; a failure is logged, not queued.
    async fn send_handshake_frame(&self, message: &OutboundMessage) {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(kind = %message.kind, error = %e, "Failed to encode handshake frame");
                return;
            }
        };
        if let Err(e) = self.session.send_frame(text).await {
            warn!(kind = %message.kind, error = %e, "Failed to send handshake frame");
        }
    }

    /// The session closed; sends queue up until the next [`Self::on_open`].
    pub fn on_close(&self) {
        self.state.lock().link = Link::Down;
    }

    /// Handles one inbound frame.
    ///
    /// A reply to a pending request settles it and goes no further. Anything
    /// else is delivered to the single handler registered for its kind.
    pub fn on_message(&self, raw: &str) -> DispatchOutcome {
        let message = match InboundMessage::parse(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Malformed realtime frame");
                return DispatchOutcome::Malformed;
            }
        };
        TetherMetrics::message_received(message.kind.as_str());

        if let Some(id) = message.request_id() {
            let pending = self.state.lock().pending.remove(&id);
            if let Some(pending) = pending {
                let elapsed_ms = pending.created_at.elapsed_until(Timestamp::now()).as_millis();
                let result = match message.error_message() {
                    Some(error) => Err(DispatchError::Rejected { message: error }),
                    None => Ok(message.data),
                };
                debug!(id = %id, elapsed_ms, ok = result.is_ok(), "Request settled");
                let _ = pending.reply.send(result);
                return DispatchOutcome::Settled(id);
            }
            if self.state.lock().forget_expired(&id) {
                debug!(id = %id, "Dropping reply to expired request");
                return DispatchOutcome::LateReply(id);
            }
        }

        let handler = self.state.lock().handlers.get(&message.kind).cloned();
        let Some(handler) = handler else {
            if message.kind.is_unknown() {
                warn!(kind = %message.kind, "Unknown message type");
            } else {
                debug!(kind = %message.kind, "No handler registered");
            }
            return DispatchOutcome::Unhandled(message.kind);
        };

        match catch_unwind(AssertUnwindSafe(|| handler.handle(&message.data))) {
            Ok(Ok(())) => DispatchOutcome::Handled(message.kind),
            Ok(Err(e)) => {
                error!(kind = %message.kind, error = %e, "Message handler failed");
                DispatchOutcome::HandlerFailed(message.kind)
            }
            Err(_) => {
                error!(kind = %message.kind, "Message handler panicked");
                DispatchOutcome::HandlerFailed(message.kind)
            }
        }
    }

    /// Sends `{type, data, id}` and waits for the reply carrying the same id.
    ///
    /// Fails with [`DispatchError::Timeout`] once the request timeout elapses;
    /// the pending entry is discarded and a later reply has no effect.
    pub async fn request(&self, kind: &str, data: Value) -> Result<Value, DispatchError> {
        let id = RequestId::generate();
        let (reply, rx) = oneshot::channel();
        self.state.lock().pending.insert(
            id.clone(),
            PendingRequest {
                reply,
                created_at: Timestamp::now(),
            },
        );

        let message = OutboundMessage::new(kind).with_data(data).with_id(id.clone());
        if let Err(e) = self.send(message).await {
            self.state.lock().pending.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(DispatchError::Closed),
            Err(_) => {
                {
                    let mut state = self.state.lock();
                    state.pending.remove(&id);
                    state.remember_expired(id.clone());
                }
                let timeout_ms = u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX);
                TetherMetrics::request_timeout();
                warn!(id = %id, kind, timeout_ms, "Request timed out");
                Err(DispatchError::Timeout { timeout_ms })
            }
        }
    }

    /// Registers the handler for `kind`, replacing any previous one.
    pub fn on(&self, kind: impl Into<MessageKind>, handler: impl MessageHandler + 'static) {
        let kind = kind.into();
        let replaced = self
            .state
            .lock()
            .handlers
            .insert(kind.clone(), Arc::new(handler))
            .is_some();
        debug!(kind = %kind, replaced, "Handler registered");
    }

    /// Removes the handler for `kind`. Returns whether one was registered.
    pub fn off(&self, kind: impl Into<MessageKind>) -> bool {
        self.state.lock().handlers.remove(&kind.into()).is_some()
    }

    /// Adds `channel` to the subscription set and subscribes.
    ///
    /// While the link is down the subscription goes out with the handshake of
    /// the next open. Once a handshake has started the frame takes the normal
    /// send path, so each channel is subscribed exactly once per connection.
    pub async fn subscribe(&self, channel: ChannelId) -> Result<SendStatus, DispatchError> {
        let link = {
            let mut state = self.state.lock();
            state.subscriptions.insert(channel.clone());
            state.link
        };
        if link == Link::Down {
            return Ok(SendStatus::Queued);
        }
        self.send(OutboundMessage::subscribe(&channel)).await
    }

    /// Removes `channel` from the subscription set and unsubscribes.
    pub async fn unsubscribe(&self, channel: &ChannelId) -> Result<SendStatus, DispatchError> {
        let link = {
            let mut state = self.state.lock();
            state.subscriptions.remove(channel);
            state.link
        };
        if link == Link::Down {
            return Ok(SendStatus::Queued);
        }
        self.send(OutboundMessage::unsubscribe(channel)).await
    }

    /// Current subscription set.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<ChannelId> {
        self.state.lock().subscriptions.iter().cloned().collect()
    }

    /// Number of queued frames.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Number of requests awaiting a reply.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Fails every pending request with [`DispatchError::Closed`].
    pub fn close_pending(&self) {
        let pending: Vec<PendingRequest> = self
            .state
            .lock()
            .pending
            .drain()
            .map(|(_, pending)| pending)
            .collect();
        for request in pending {
            let _ = request.reply.send(Err(DispatchError::Closed));
        }
    }
}

impl std::fmt::Debug for MessageDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MessageDispatcher")
            .field("queued", &state.queue.len())
            .field("pending", &state.pending.len())
            .field("handlers", &state.handlers.len())
            .field("subscriptions", &state.subscriptions)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSession;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dispatcher(session: &Arc<MockSession>) -> MessageDispatcher {
        MessageDispatcher::new(
            Arc::clone(session) as Arc<dyn RealtimeSession>,
            Duration::from_secs(30),
        )
    }

    /// Dispatcher past its first handshake.
    async fn ready_dispatcher(session: &Arc<MockSession>) -> MessageDispatcher {
        let dispatcher = dispatcher(session);
        dispatcher.on_open(None).await;
        dispatcher
    }

    fn kinds(frames: &[String]) -> Vec<String> {
        frames
            .iter()
            .map(|f| serde_json::from_str::<Value>(f).unwrap()["type"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_send_while_closed_is_queued() {
        let session = Arc::new(MockSession::closed());
        let dispatcher = dispatcher(&session);

        let status = dispatcher.send(OutboundMessage::new("a")).await.unwrap();

        assert_eq!(status, SendStatus::Queued);
        assert_eq!(dispatcher.queue_len(), 1);
        assert!(session.sent().is_empty());
    }

    #[tokio::test]
    async fn test_queue_drains_in_fifo_order() {
        let session = Arc::new(MockSession::closed());
        let dispatcher = dispatcher(&session);
        for kind in ["first", "second", "third"] {
            dispatcher.send(OutboundMessage::new(kind)).await.unwrap();
        }

        session.set_open(true);
        let sent = dispatcher.on_open(None).await;

        assert_eq!(sent, 3);
        assert_eq!(kinds(&session.sent()), vec!["first", "second", "third"]);
        assert_eq!(dispatcher.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_failed_send_during_drain_is_requeued() {
        let session = Arc::new(MockSession::closed());
        let dispatcher = dispatcher(&session);
        for kind in ["first", "second", "third"] {
            dispatcher.send(OutboundMessage::new(kind)).await.unwrap();
        }

        session.set_open(true);
        session.fail_sends_at(&[2]);
        let sent = dispatcher.on_open(None).await;

        assert_eq!(sent, 2);
        assert_eq!(kinds(&session.sent()), vec!["first", "third"]);
        assert_eq!(dispatcher.queue_len(), 1);

        dispatcher.on_open(None).await;
        assert_eq!(kinds(&session.sent()), vec!["first", "third", "second"]);
    }

    #[tokio::test]
    async fn test_failed_immediate_send_is_queued() {
        let session = Arc::new(MockSession::open());
        session.fail_sends_at(&[1]);
        let dispatcher = ready_dispatcher(&session).await;

        let status = dispatcher.send(OutboundMessage::new("a")).await.unwrap();

        assert_eq!(status, SendStatus::Queued);
        assert_eq!(dispatcher.queue_len(), 1);
    }

    #[tokio::test]
    async fn test_send_before_drain_waits_behind_queue() {
        let session = Arc::new(MockSession::closed());
        let dispatcher = dispatcher(&session);
        dispatcher
            .send(OutboundMessage::new("queued_first"))
            .await
            .unwrap();

        // Open, but the handshake has not run yet.
        session.set_open(true);
        let status = dispatcher
            .send(OutboundMessage::new("sent_second"))
            .await
            .unwrap();
        assert_eq!(status, SendStatus::Queued);
        assert!(session.sent().is_empty());

        assert_eq!(dispatcher.on_open(None).await, 2);
        assert_eq!(kinds(&session.sent()), vec!["queued_first", "sent_second"]);

        let status = dispatcher.send(OutboundMessage::new("third")).await.unwrap();
        assert_eq!(status, SendStatus::Sent);
        assert_eq!(
            kinds(&session.sent()),
            vec!["queued_first", "sent_second", "third"]
        );
    }

    #[tokio::test]
    async fn test_handshake_frames_go_before_queue() {
        let session = Arc::new(MockSession::closed());
        let dispatcher = dispatcher(&session);
        dispatcher
            .subscribe(ChannelId::new("console").unwrap())
            .await
            .unwrap();
        dispatcher.send(OutboundMessage::new("queued")).await.unwrap();

        session.set_open(true);
        dispatcher
            .on_open(Some(OutboundMessage::authenticate("tok")))
            .await;

        assert_eq!(
            kinds(&session.sent()),
            vec!["authenticate", "subscribe", "queued"]
        );
    }

    #[tokio::test]
    async fn test_close_queues_sends_until_next_open() {
        let session = Arc::new(MockSession::open());
        let dispatcher = ready_dispatcher(&session).await;

        dispatcher.on_close();
        // The session may still report open until its close completes.
        let status = dispatcher.send(OutboundMessage::new("late")).await.unwrap();
        assert_eq!(status, SendStatus::Queued);
        assert!(session.sent().is_empty());

        dispatcher.on_open(None).await;
        assert_eq!(kinds(&session.sent()), vec!["late"]);
    }

    #[tokio::test]
    async fn test_console_output_reaches_only_its_handler() {
        let session = Arc::new(MockSession::open());
        let dispatcher = ready_dispatcher(&session).await;
        let console_calls = Arc::new(Mutex::new(Vec::new()));
        let other_calls = Arc::new(AtomicUsize::new(0));

        let calls = Arc::clone(&console_calls);
        dispatcher.on(
            MessageKind::ConsoleOutput,
            handler(move |data| {
                calls.lock().push(data.clone());
                Ok(())
            }),
        );
        for kind in [MessageKind::ServerStats, MessageKind::PlayerJoin] {
            let counter = Arc::clone(&other_calls);
            dispatcher.on(
                kind,
                handler(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            );
        }

        dispatcher
            .subscribe(ChannelId::new("console").unwrap())
            .await
            .unwrap();
        let outcome = dispatcher.on_message(
            r#"{"type":"console_output","data":{"level":"info","message":"hello"}}"#,
        );

        assert_eq!(outcome, DispatchOutcome::Handled(MessageKind::ConsoleOutput));
        assert_eq!(
            *console_calls.lock(),
            vec![json!({"level": "info", "message": "hello"})]
        );
        assert_eq!(other_calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            session.sent(),
            vec![r#"{"type":"subscribe","channel":"console"}"#.to_string()]
        );
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let session = Arc::new(MockSession::open());
        let dispatcher = dispatcher(&session);
        let hits = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second"] {
            let hits = Arc::clone(&hits);
            dispatcher.on(
                "notification",
                handler(move |_| {
                    hits.lock().push(name);
                    Ok(())
                }),
            );
        }
        dispatcher.on_message(r#"{"type":"notification","data":{}}"#);

        assert_eq!(*hits.lock(), vec!["second"]);
        assert!(dispatcher.off(MessageKind::Notification));
        assert_eq!(
            dispatcher.on_message(r#"{"type":"notification"}"#),
            DispatchOutcome::Unhandled(MessageKind::Notification)
        );
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_frames_are_dropped() {
        let session = Arc::new(MockSession::open());
        let dispatcher = dispatcher(&session);

        assert_eq!(
            dispatcher.on_message(r#"{"type":"weather","data":1}"#),
            DispatchOutcome::Unhandled(MessageKind::Unknown("weather".to_string()))
        );
        assert_eq!(dispatcher.on_message("not json"), DispatchOutcome::Malformed);
    }

    #[tokio::test]
    async fn test_handler_errors_and_panics_are_contained() {
        let session = Arc::new(MockSession::open());
        let dispatcher = dispatcher(&session);
        dispatcher.on("module_event", handler(|_| Err("bad payload".into())));
        dispatcher.on("security_alert", handler(|_| panic!("handler bug")));

        assert_eq!(
            dispatcher.on_message(r#"{"type":"module_event"}"#),
            DispatchOutcome::HandlerFailed(MessageKind::ModuleEvent)
        );
        assert_eq!(
            dispatcher.on_message(r#"{"type":"security_alert"}"#),
            DispatchOutcome::HandlerFailed(MessageKind::SecurityAlert)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_settles_request() {
        let session = Arc::new(MockSession::open());
        let dispatcher = Arc::new(ready_dispatcher(&session).await);

        let task = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.request("get_players", json!({})).await })
        };
        while session.sent().is_empty() {
            tokio::task::yield_now().await;
        }

        let frame: Value = serde_json::from_str(&session.sent()[0]).unwrap();
        let id = frame["id"].as_str().unwrap().to_string();
        assert_eq!(frame["type"], "get_players");

        let handled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&handled);
        dispatcher.on(
            "get_players",
            handler(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        let reply = json!({"type": "get_players", "id": id, "data": ["alex"]}).to_string();
        assert!(matches!(dispatcher.on_message(&reply), DispatchOutcome::Settled(_)));

        assert_eq!(task.await.unwrap(), Ok(json!(["alex"])));
        assert_eq!(handled.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.pending_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_reply_rejects_request() {
        let session = Arc::new(MockSession::open());
        let dispatcher = Arc::new(ready_dispatcher(&session).await);

        let task = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.request("kick_player", json!({"name": "x"})).await })
        };
        while session.sent().is_empty() {
            tokio::task::yield_now().await;
        }

        let frame: Value = serde_json::from_str(&session.sent()[0]).unwrap();
        let reply = json!({"type": "kick_player", "id": frame["id"], "error": "forbidden"});
        dispatcher.on_message(&reply.to_string());

        assert_eq!(
            task.await.unwrap(),
            Err(DispatchError::Rejected {
                message: "forbidden".to_string()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_times_out_at_boundary_and_late_reply_is_ignored() {
        let session = Arc::new(MockSession::open());
        let dispatcher = Arc::new(ready_dispatcher(&session).await);

        let task = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.request("slow", Value::Null).await })
        };
        while session.sent().is_empty() {
            tokio::task::yield_now().await;
        }
        let frame: Value = serde_json::from_str(&session.sent()[0]).unwrap();

        tokio::time::advance(Duration::from_millis(29_999)).await;
        tokio::task::yield_now().await;
        assert!(!task.is_finished());
        assert_eq!(dispatcher.pending_requests(), 1);

        tokio::time::advance(Duration::from_millis(1)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert!(task.is_finished());
        assert_eq!(
            task.await.unwrap(),
            Err(DispatchError::Timeout { timeout_ms: 30_000 })
        );
        assert_eq!(dispatcher.pending_requests(), 0);

        let late = json!({"type": "slow", "id": frame["id"], "data": 1}).to_string();
        assert!(matches!(dispatcher.on_message(&late), DispatchOutcome::LateReply(_)));
    }

    #[tokio::test]
    async fn test_subscribe_while_closed_goes_out_with_handshake() {
        let session = Arc::new(MockSession::closed());
        let dispatcher = dispatcher(&session);

        let status = dispatcher
            .subscribe(ChannelId::new("players").unwrap())
            .await
            .unwrap();
        assert_eq!(status, SendStatus::Queued);
        assert_eq!(dispatcher.queue_len(), 0);

        session.set_open(true);
        dispatcher.on_open(None).await;
        assert_eq!(
            session.sent(),
            vec![r#"{"type":"subscribe","channel":"players"}"#.to_string()]
        );

        dispatcher
            .unsubscribe(&ChannelId::new("players").unwrap())
            .await
            .unwrap();
        assert!(dispatcher.subscriptions().is_empty());
    }

    #[tokio::test]
    async fn test_close_pending_fails_requests() {
        let session = Arc::new(MockSession::open());
        let dispatcher = Arc::new(ready_dispatcher(&session).await);

        let task = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.request("x", Value::Null).await })
        };
        while dispatcher.pending_requests() == 0 {
            tokio::task::yield_now().await;
        }
        dispatcher.close_pending();

        assert_eq!(task.await.unwrap(), Err(DispatchError::Closed));
    }
}
