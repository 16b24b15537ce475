//! Connection session state.

#![allow(clippy::redundant_pub_crate)]

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::session::Connection;

/// Connection state of a realtime session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Transport is being established.
    Connecting,
    /// Transport is open and accepting frames.
    Open,
    /// Close has been requested.
    Closing,
    /// No transport.
    #[default]
    Closed,
}

impl ConnectionState {
    /// Returns true if frames can be sent.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns true if `open()` would start a new transport.
    #[must_use]
    pub fn can_open(&self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Open => write!(f, "Open"),
            Self::Closing => write!(f, "Closing"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// Internal state tracking for the connection session.
#[derive(Default)]
pub(crate) struct SessionState {
    /// Current connection state.
    pub state: ConnectionState,
    /// Incremented on every `open()` and `close()`; events from older epochs are stale.
    pub epoch: u64,
    /// Live transport, present only while Open.
    pub connection: Option<Arc<dyn Connection>>,
}

impl SessionState {
    /// Starts a new connect attempt and returns its epoch.
    pub fn begin_connect(&mut self) -> u64 {
        self.epoch += 1;
        self.state = ConnectionState::Connecting;
        self.connection = None;
        self.epoch
    }

    /// Marks the session open on `connection` if `epoch` is still current.
    pub fn mark_open(&mut self, epoch: u64, connection: Arc<dyn Connection>) -> bool {
        if self.epoch != epoch {
            return false;
        }
        self.state = ConnectionState::Open;
        self.connection = Some(connection);
        true
    }

    /// Marks the session closed if `epoch` is still current.
    pub fn mark_closed(&mut self, epoch: u64) -> bool {
        if self.epoch != epoch {
            return false;
        }
        self.state = ConnectionState::Closed;
        self.connection = None;
        true
    }

    /// Invalidates the current epoch and hands back the live transport.
    pub fn begin_close(&mut self) -> Option<Arc<dyn Connection>> {
        self.epoch += 1;
        self.state = ConnectionState::Closing;
        self.connection.take()
    }
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("state", &self.state)
            .field("epoch", &self.epoch)
            .field("connected", &self.connection.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_helpers() {
        assert!(ConnectionState::Open.is_open());
        assert!(!ConnectionState::Connecting.is_open());
        assert!(ConnectionState::Closed.can_open());
        assert!(ConnectionState::Closing.can_open());
        assert!(!ConnectionState::Connecting.can_open());
        assert_eq!(ConnectionState::default(), ConnectionState::Closed);
    }

    #[test]
    fn test_stale_epoch_is_ignored() {
        let mut state = SessionState::default();
        let first = state.begin_connect();
        let second = state.begin_connect();
        assert_ne!(first, second);

        assert!(!state.mark_closed(first));
        assert_eq!(state.state, ConnectionState::Connecting);
        assert!(state.mark_closed(second));
        assert_eq!(state.state, ConnectionState::Closed);
    }
}
