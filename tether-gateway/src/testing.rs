//! In-process doubles for the gateway seams, used by unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tether_core::error::{AuthError, NetworkError, TetherError};
use tokio::sync::mpsc;

use crate::realtime::{Notification, Notifier};
use crate::rest::{CredentialValidator, LivenessProbe};
use crate::ws::{ConnectionState, Connection, RealtimeSession, Transport, TransportEvent};

fn refused() -> NetworkError {
    NetworkError::ConnectionFailed {
        reason: "connection refused".to_string(),
    }
}

/// Transport whose connections are driven by the test.
#[derive(Default)]
pub struct MockTransport {
    connects: AtomicUsize,
    fail_next: AtomicUsize,
    connections: Mutex<Vec<Arc<MockConnection>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn fail_next_connects(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    pub fn last_connection(&self) -> Option<Arc<MockConnection>> {
        self.connections.lock().last().cloned()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(
        &self,
        _url: &str,
    ) -> Result<(Arc<dyn Connection>, mpsc::UnboundedReceiver<TransportEvent>), NetworkError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(refused());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Arc::new(MockConnection {
            events: tx,
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        self.connections.lock().push(Arc::clone(&connection));
        Ok((connection as Arc<dyn Connection>, rx))
    }
}

/// One connection handed out by [`MockTransport`].
pub struct MockConnection {
    events: mpsc::UnboundedSender<TransportEvent>,
    sent: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl MockConnection {
    /// Raises a transport event.
    pub fn push(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn send(&self, text: String) -> Result<(), NetworkError> {
        if self.is_closed() {
            return Err(NetworkError::ConnectionClosed {
                code: 1006,
                reason: "closed".to_string(),
            });
        }
        self.sent.lock().push(text);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct SessionInner {
    open: bool,
    sent: Vec<String>,
    send_calls: usize,
    fail_at: HashSet<usize>,
    open_calls: usize,
    fail_opens: usize,
}

/// Session double that records frames instead of sending them.
#[derive(Default)]
pub struct MockSession {
    inner: Mutex<SessionInner>,
}

impl MockSession {
    pub fn closed() -> Self {
        Self::default()
    }

    pub fn open() -> Self {
        let session = Self::default();
        session.set_open(true);
        session
    }

    pub fn set_open(&self, open: bool) {
        self.inner.lock().open = open;
    }

    pub fn sent(&self) -> Vec<String> {
        self.inner.lock().sent.clone()
    }

    /// Fails the `send_frame` calls with these 1-based indices.
    pub fn fail_sends_at(&self, calls: &[usize]) {
        self.inner.lock().fail_at.extend(calls.iter().copied());
    }

    pub fn fail_next_opens(&self, count: usize) {
        self.inner.lock().fail_opens = count;
    }

    pub fn open_count(&self) -> usize {
        self.inner.lock().open_calls
    }
}

#[async_trait]
impl RealtimeSession for MockSession {
    fn state(&self) -> ConnectionState {
        if self.inner.lock().open {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }

    async fn open(&self) -> Result<(), NetworkError> {
        let mut inner = self.inner.lock();
        inner.open_calls += 1;
        if inner.fail_opens > 0 {
            inner.fail_opens -= 1;
            return Err(refused());
        }
        inner.open = true;
        Ok(())
    }

    async fn close(&self) {
        self.inner.lock().open = false;
    }

    async fn send_frame(&self, text: String) -> Result<(), NetworkError> {
        let mut inner = self.inner.lock();
        inner.send_calls += 1;
        let call = inner.send_calls;
        if !inner.open || inner.fail_at.contains(&call) {
            return Err(refused());
        }
        inner.sent.push(text);
        Ok(())
    }
}

/// Scripted heartbeat result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    Ok,
    Fail,
    /// Never completes.
    Hang,
}

/// Liveness probe that replays a script, then repeats the fallback.
pub struct MockProbe {
    script: Mutex<VecDeque<ProbeResult>>,
    fallback: ProbeResult,
    calls: AtomicUsize,
}

impl MockProbe {
    pub fn always(result: ProbeResult) -> Self {
        Self::scripted(Vec::new(), result)
    }

    pub fn scripted(script: Vec<ProbeResult>, fallback: ProbeResult) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LivenessProbe for MockProbe {
    async fn probe(&self, _token: Option<&str>) -> Result<(), NetworkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().pop_front().unwrap_or(self.fallback);
        match next {
            ProbeResult::Ok => Ok(()),
            ProbeResult::Fail => Err(NetworkError::Http {
                status_code: 503,
                reason: "Service Unavailable".to_string(),
            }),
            ProbeResult::Hang => std::future::pending().await,
        }
    }
}

/// Scripted credential validation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Valid,
    Invalid,
    NetworkDown,
}

pub struct MockValidator {
    result: Mutex<Validation>,
    calls: AtomicUsize,
}

impl MockValidator {
    pub fn new(result: Validation) -> Self {
        Self {
            result: Mutex::new(result),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, result: Validation) {
        *self.result.lock() = result;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialValidator for MockValidator {
    async fn validate(&self, _token: &str) -> Result<(), TetherError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = *self.result.lock();
        match result {
            Validation::Valid => Ok(()),
            Validation::Invalid => Err(AuthError::InvalidToken { status_code: 401 }.into()),
            Validation::NetworkDown => Err(refused().into()),
        }
    }
}

/// Notifier that keeps everything it was given.
#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn all(&self) -> Vec<Notification> {
        self.seen.lock().clone()
    }

    pub fn problems(&self) -> Vec<u32> {
        self.seen
            .lock()
            .iter()
            .filter_map(|n| match n {
                Notification::ConnectionProblem { attempt, .. } => Some(*attempt),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &Notification) -> usize {
        self.seen.lock().iter().filter(|n| *n == wanted).count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen.lock().push(notification);
    }
}
