//! Upstream connectivity probing.
//!
//! Background sync fires when the upstream becomes reachable, the same way a
//! browser fires sync events when the network returns.

use std::sync::Arc;
use std::time::Duration;
use tether_cache::{CacheRequest, CacheWorker, SyncOutcome, SyncTag};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// Path probed on the upstream.
pub const PROBE_PATH: &str = "/api/heartbeat";

/// Last observed reachability of the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// No probe has finished yet.
    Unknown,
    /// The upstream answered.
    Online,
    /// The upstream could not be reached.
    Offline,
}

/// Probes the upstream and drives background sync on transitions.
pub struct ConnectivityMonitor {
    worker: Arc<CacheWorker>,
    period: Duration,
    analytics_sync: bool,
    state: watch::Sender<Connectivity>,
}

impl ConnectivityMonitor {
    /// Creates a monitor probing through the worker's fetcher every `period`.
    #[must_use]
    pub fn new(worker: Arc<CacheWorker>, period: Duration) -> Self {
        let (state, _) = watch::channel(Connectivity::Unknown);
        Self {
            worker,
            period,
            analytics_sync: false,
            state,
        }
    }

    /// Registers an analytics sync every time the upstream goes offline.
    #[must_use]
    pub fn with_analytics_sync(mut self, enabled: bool) -> Self {
        self.analytics_sync = enabled;
        self
    }

    /// Current reachability.
    #[must_use]
    pub fn state(&self) -> Connectivity {
        *self.state.borrow()
    }

    /// Receiver notified on every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.state.subscribe()
    }

    /// Runs one probe and handles the resulting transition.
    ///
    /// Any HTTP answer counts as reachable; only transport failures and
    /// timeouts count as offline.
    pub async fn check_once(&self) -> Connectivity {
        let probe = CacheRequest::get(PROBE_PATH);
        let next = match self.worker.router().fetcher().fetch(&probe).await {
            Ok(response) => {
                debug!(status = response.status, "Upstream probe answered");
                Connectivity::Online
            }
            Err(e) => {
                debug!(error = %e, "Upstream probe failed");
                Connectivity::Offline
            }
        };

        let previous = self.state.send_replace(next);
        match (previous, next) {
            (Connectivity::Unknown | Connectivity::Offline, Connectivity::Online) => {
                info!("Upstream reachable, firing pending background sync");
                self.fire_pending().await;
            }
            (Connectivity::Unknown | Connectivity::Online, Connectivity::Offline) => {
                warn!("Upstream unreachable, serving from cache");
                if self.analytics_sync
                    && let Err(e) = self.worker.register_sync(SyncTag::Analytics).await
                {
                    warn!(error = %e, "Failed to register analytics sync");
                }
            }
            _ => {}
        }
        next
    }

    /// Spawns the probe loop. The first probe runs immediately.
    #[must_use]
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.check_once().await;
            }
        })
    }

    async fn fire_pending(&self) {
        for (tag, result) in self.worker.fire_pending_syncs().await {
            match result {
                Ok(SyncOutcome::Replayed(report)) => info!(
                    tag = %tag,
                    attempted = report.attempted,
                    delivered = report.delivered,
                    failed = report.failed,
                    "Offline commands replayed"
                ),
                Ok(SyncOutcome::AnalyticsSent(_)) => info!(tag = %tag, "Analytics delivered"),
                Err(e) => warn!(tag = %tag, error = %e, "Background sync failed"),
            }
        }
    }
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("period", &self.period)
            .field("analytics_sync", &self.analytics_sync)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
