//! Heartbeat monitor: probes backend liveness on a fixed period.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tether_core::types::Timestamp;
use tether_telemetry::metrics::TetherMetrics;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tracing::{debug, info, warn};

use super::reconnect::{FailureCause, ReconnectController};
use crate::auth::CredentialStore;
use crate::rest::LivenessProbe;

/// Heartbeat bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HeartbeatStats {
    /// Time of the last successful probe.
    pub last_heartbeat: Option<Timestamp>,
    /// Round trip of the last successful probe.
    pub last_latency_ms: Option<u64>,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Probes sent.
    pub total_probes: u64,
    /// Probes failed.
    pub total_failures: u64,
}

/// Periodically calls the [`LivenessProbe`] and reports the outcome to the
/// [`ReconnectController`].
///
/// The first probe runs one interval after [`start`](Self::start). Each probe
/// is bounded by the heartbeat timeout; a timeout counts as a failure. The
/// monitor stops by itself once the controller reaches a terminal phase.
pub struct HeartbeatMonitor {
    probe: Arc<dyn LivenessProbe>,
    credentials: Arc<CredentialStore>,
    controller: Arc<ReconnectController>,
    interval: Duration,
    timeout: Duration,
    stats: Arc<Mutex<HeartbeatStats>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatMonitor {
    /// Creates a stopped monitor.
    #[must_use]
    pub fn new(
        probe: Arc<dyn LivenessProbe>,
        credentials: Arc<CredentialStore>,
        controller: Arc<ReconnectController>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            probe,
            credentials,
            controller,
            interval,
            timeout,
            stats: Arc::new(Mutex::new(HeartbeatStats::default())),
            task: Mutex::new(None),
        }
    }

    /// Starts the periodic probe. Returns false if it was already running.
    pub fn start(&self) -> bool {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("Heartbeat already running");
            return false;
        }

        let beat = Beat {
            probe: Arc::clone(&self.probe),
            credentials: Arc::clone(&self.credentials),
            controller: Arc::clone(&self.controller),
            timeout: self.timeout,
            stats: Arc::clone(&self.stats),
        };
        let period = self.interval;
        let mut phases = self.controller.subscribe();

        *task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                if phases.borrow_and_update().is_terminal() {
                    info!("Heartbeat stopped, reconnecting has ended");
                    return;
                }
                tokio::select! {
                    _ = ticker.tick() => beat.run().await,
                    changed = phases.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
            }
        }));
        info!(interval_ms = period.as_millis() as u64, "Heartbeat started");
        true
    }

    /// Stops the periodic probe. Safe to call when not running.
    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
            info!("Heartbeat stopped");
        }
    }

    /// Returns true while the probe task is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Current bookkeeping.
    #[must_use]
    pub fn stats(&self) -> HeartbeatStats {
        self.stats.lock().clone()
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for HeartbeatMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatMonitor")
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("stats", &*self.stats.lock())
            .finish_non_exhaustive()
    }
}

/// Everything one probe needs, owned by the probe task.
struct Beat {
    probe: Arc<dyn LivenessProbe>,
    credentials: Arc<CredentialStore>,
    controller: Arc<ReconnectController>,
    timeout: Duration,
    stats: Arc<Mutex<HeartbeatStats>>,
}

impl Beat {
    async fn run(&self) {
        let token = self.credentials.token();
        let started = Instant::now();
        self.stats.lock().total_probes += 1;

        let reason = match timeout(self.timeout, self.probe.probe(token.as_deref())).await {
            Ok(Ok(())) => {
                let latency = started.elapsed();
                let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
                {
                    let mut stats = self.stats.lock();
                    stats.last_heartbeat = Some(Timestamp::now());
                    stats.last_latency_ms = Some(latency_ms);
                    stats.consecutive_failures = 0;
                }
                TetherMetrics::heartbeat_latency(latency.as_secs_f64());
                debug!(latency_ms, "Heartbeat ok");
                self.controller.on_heartbeat_success();
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("no response within {}ms", self.timeout.as_millis()),
        };

        let failures = {
            let mut stats = self.stats.lock();
            stats.consecutive_failures += 1;
            stats.total_failures += 1;
            stats.consecutive_failures
        };
        TetherMetrics::heartbeat_failure();
        warn!(consecutive_failures = failures, reason = %reason, "Heartbeat failed");
        self.controller.on_failure(FailureCause::Heartbeat(reason));
    }
}
