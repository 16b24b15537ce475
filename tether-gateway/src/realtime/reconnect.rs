//! Reconnect controller: turns failure signals into backoff, credential
//! validation and session reopening.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tether_telemetry::metrics::TetherMetrics;
use tether_telemetry::spans::reconnect_span;
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, warn};

use super::config::RealtimeConfig;
use super::notify::{LinkStatus, Notification, Notifier};
use crate::auth::CredentialStore;
use crate::rest::CredentialValidator;
use crate::ws::RealtimeSession;

/// Phase of the reconnect state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "attempt", rename_all = "snake_case")]
pub enum ReconnectPhase {
    /// No failure pending.
    Stable,
    /// Attempt `n` is scheduled or running.
    Backoff(u32),
    /// Too many failures; nothing happens until [`ReconnectController::reset`].
    GivenUp,
    /// The credential was rejected; the user must log in again.
    SessionExpired,
}

impl ReconnectPhase {
    /// Returns true for phases that ignore further failures.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::GivenUp | Self::SessionExpired)
    }

    /// Failures counted so far.
    #[must_use]
    pub fn attempt_count(&self) -> u32 {
        match self {
            Self::Backoff(n) => *n,
            _ => 0,
        }
    }
}

/// Snapshot of the reconnect counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconnectState {
    /// Failures counted since the last recovery.
    pub attempt_count: u32,
    /// Delay before the current attempt, the base delay when none is pending.
    pub backoff_ms: u64,
    /// Failures tolerated before giving up.
    pub max_attempts: u32,
    /// Current phase.
    pub phase: ReconnectPhase,
}

/// What reported the failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// A heartbeat probe failed or timed out.
    Heartbeat(String),
    /// The session closed without a clean close.
    TransportClosed {
        /// Close code.
        code: u16,
    },
    /// Opening the session failed.
    ConnectFailed(String),
    /// The credential could not be validated for a reason other than rejection.
    ValidationFailed(String),
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Heartbeat(reason) => write!(f, "heartbeat failed: {reason}"),
            Self::TransportClosed { code } => write!(f, "transport closed with code {code}"),
            Self::ConnectFailed(reason) => write!(f, "connect failed: {reason}"),
            Self::ValidationFailed(reason) => write!(f, "credential validation failed: {reason}"),
        }
    }
}

#[derive(Debug)]
struct ControllerState {
    phase: ReconnectPhase,
    /// Bumped whenever a scheduled attempt becomes obsolete.
    generation: u64,
}

/// Drives recovery after heartbeat failures and unclean closes.
///
/// Failure `n` (counting from 1) schedules one attempt after
/// `2^n * base_delay`. An attempt validates the stored credential and reopens
/// the session; a rejected credential expires the session. Any other failed
/// attempt counts as the next failure, so recovery ends either with an open
/// session or, after more than `max_attempts` failures, with giving up.
pub struct ReconnectController {
    config: RealtimeConfig,
    session: Arc<dyn RealtimeSession>,
    validator: Arc<dyn CredentialValidator>,
    credentials: Arc<CredentialStore>,
    notifier: Arc<dyn Notifier>,
    state: Mutex<ControllerState>,
    phase_tx: watch::Sender<ReconnectPhase>,
}

impl ReconnectController {
    /// Creates a controller in the `Stable` phase.
    #[must_use]
    pub fn new(
        config: RealtimeConfig,
        session: Arc<dyn RealtimeSession>,
        validator: Arc<dyn CredentialValidator>,
        credentials: Arc<CredentialStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (phase_tx, _) = watch::channel(ReconnectPhase::Stable);
        Self {
            config,
            session,
            validator,
            credentials,
            notifier,
            state: Mutex::new(ControllerState {
                phase: ReconnectPhase::Stable,
                generation: 0,
            }),
            phase_tx,
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> ReconnectPhase {
        self.state.lock().phase
    }

    /// Watches phase changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ReconnectPhase> {
        self.phase_tx.subscribe()
    }

    /// Counter snapshot.
    #[must_use]
    pub fn reconnect_state(&self) -> ReconnectState {
        let phase = self.phase();
        let attempt_count = phase.attempt_count();
        let backoff_ms = if attempt_count == 0 {
            self.config.base_delay_ms
        } else {
            u64::try_from(self.delay_for(attempt_count).as_millis()).unwrap_or(u64::MAX)
        };
        ReconnectState {
            attempt_count,
            backoff_ms,
            max_attempts: self.config.max_attempts,
            phase,
        }
    }

    /// Delay before attempt `attempt`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.config.backoff_delay(attempt)
    }

    fn publish(&self, phase: ReconnectPhase) {
        self.phase_tx.send_replace(phase);
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state.lock().generation == generation
    }

    /// Records one failure and schedules the next attempt.
    ///
    /// Ignored once the controller has given up or the session expired.
    pub fn on_failure(self: &Arc<Self>, cause: FailureCause) {
        let max = self.config.max_attempts;
        let scheduled = {
            let mut state = self.state.lock();
            let attempt = match state.phase {
                ReconnectPhase::GivenUp | ReconnectPhase::SessionExpired => {
                    debug!(phase = ?state.phase, cause = %cause, "Failure ignored");
                    return;
                }
                ReconnectPhase::Stable => 1,
                ReconnectPhase::Backoff(n) => n.saturating_add(1),
            };
            state.generation += 1;
            if attempt > max {
                state.phase = ReconnectPhase::GivenUp;
                None
            } else {
                state.phase = ReconnectPhase::Backoff(attempt);
                Some((attempt, state.generation))
            }
        };

        let Some((attempt, generation)) = scheduled else {
            self.publish(ReconnectPhase::GivenUp);
            error!(max_attempts = max, cause = %cause, "Giving up on reconnecting");
            self.notifier.notify(Notification::ConnectionLost);
            self.notifier.notify(Notification::StatusChanged {
                status: LinkStatus::Disconnected,
            });
            return;
        };

        let delay = self.delay_for(attempt);
        self.publish(ReconnectPhase::Backoff(attempt));
        TetherMetrics::reconnect_attempt(attempt);
        warn!(
            attempt,
            max_attempts = max,
            delay_ms = delay.as_millis() as u64,
            cause = %cause,
            "Connection problem, reconnect scheduled"
        );
        self.notifier
            .notify(Notification::ConnectionProblem { attempt, max });
        self.notifier.notify(Notification::StatusChanged {
            status: LinkStatus::Connecting,
        });

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !this.is_current(generation) {
                debug!(attempt, "Superseded reconnect attempt skipped");
                return;
            }
            this.attempt(attempt, generation).await;
        });
    }

    async fn attempt(self: Arc<Self>, attempt: u32, generation: u64) {
        let span = reconnect_span(attempt, self.config.max_attempts);
        async {
            info!("Attempting reconnection");

            let Some(token) = self.credentials.token() else {
                self.expire_session("no stored session token");
                return;
            };

            match self.validator.validate(&token).await {
                Ok(()) => {}
                Err(e) if e.is_auth_error() => {
                    self.expire_session(&e.to_string());
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "Credential validation failed");
                    self.attempt_failed(generation, FailureCause::ValidationFailed(e.to_string()));
                    return;
                }
            }

            if !self.session.is_open() {
                if let Err(e) = self.session.open().await {
                    warn!(error = %e, "Reopening the session failed");
                    self.attempt_failed(generation, FailureCause::ConnectFailed(e.to_string()));
                    return;
                }
            }

            self.restore("reconnected");
        }
        .instrument(span)
        .await;
    }

    /// A failure already recorded since this attempt was scheduled stands in for it.
    fn attempt_failed(self: &Arc<Self>, generation: u64, cause: FailureCause) {
        if self.is_current(generation) {
            self.on_failure(cause);
        } else {
            debug!(cause = %cause, "Failed attempt superseded by a newer failure");
        }
    }

    /// A heartbeat succeeded; a pending backoff counts as recovered only while
    /// the session is open.
    pub fn on_heartbeat_success(&self) {
        if !self.session.is_open() {
            return;
        }
        self.restore("heartbeat succeeded");
    }

    fn restore(&self, via: &str) -> bool {
        {
            let mut state = self.state.lock();
            if !matches!(state.phase, ReconnectPhase::Backoff(_)) {
                return false;
            }
            state.phase = ReconnectPhase::Stable;
        }
        self.publish(ReconnectPhase::Stable);
        info!(via, "Connection restored");
        self.notifier.notify(Notification::ConnectionRestored);
        true
    }

    /// Clears the stored credential and stops all recovery.
    pub fn expire_session(&self, reason: &str) {
        {
            let mut state = self.state.lock();
            if state.phase == ReconnectPhase::SessionExpired {
                return;
            }
            state.phase = ReconnectPhase::SessionExpired;
            state.generation += 1;
        }
        self.publish(ReconnectPhase::SessionExpired);
        if let Err(e) = self.credentials.clear_token() {
            warn!(error = %e, "Failed to clear session token");
        }
        warn!(reason, "Session expired");
        self.notifier.notify(Notification::SessionExpired);
    }

    /// Returns to `Stable`, dropping any scheduled attempt.
    pub fn reset(&self) {
        {
            let mut state = self.state.lock();
            state.phase = ReconnectPhase::Stable;
            state.generation += 1;
        }
        self.publish(ReconnectPhase::Stable);
        info!("Reconnect controller reset");
    }
}

impl fmt::Debug for ReconnectController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconnectController")
            .field("state", &*self.state.lock())
            .field("max_attempts", &self.config.max_attempts)
            .finish_non_exhaustive()
    }
}
