//! Connectivity monitor - reachability flag for the page side
//!
//! Tracks online/offline strictly from platform-delivered transition events;
//! there is no probing or polling here. Observers subscribe through a
//! cloneable watch handle and are only woken on real transitions.

use serde::Serialize;
use std::fmt;
use tracing::info;

/// Reachability as last reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    Online,
    Offline,
}

impl ConnectivityState {
    pub fn is_online(&self) -> bool {
        matches!(self, ConnectivityState::Online)
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectivityState::Online => write!(f, "online"),
            ConnectivityState::Offline => write!(f, "offline"),
        }
    }
}

/// Owns the reachability flag; platform event glue calls the setters
pub struct ConnectivityMonitor {
    state_tx: tokio::sync::watch::Sender<ConnectivityState>,
}

impl ConnectivityMonitor {
    pub fn new(initial: ConnectivityState) -> Self {
        let (state_tx, _) = tokio::sync::watch::channel(initial);
        Self { state_tx }
    }

    /// Current reachability snapshot
    pub fn current(&self) -> ConnectivityState {
        *self.state_tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.current().is_online()
    }

    /// Record a platform connectivity event. Observers only wake when the
    /// state actually changes.
    pub fn deliver(&self, state: ConnectivityState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current != state {
                *current = state;
                true
            } else {
                false
            }
        });
        if changed {
            info!(state = %state, "Connectivity changed");
        }
    }

    pub fn set_online(&self) {
        self.deliver(ConnectivityState::Online);
    }

    pub fn set_offline(&self) {
        self.deliver(ConnectivityState::Offline);
    }

    /// Create a handle for observers (UI, sync gating)
    pub fn watch(&self) -> ConnectivityWatch {
        ConnectivityWatch {
            state_rx: self.state_tx.subscribe(),
        }
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(ConnectivityState::Online)
    }
}

/// Cloneable observer handle over the reachability flag
#[derive(Clone)]
pub struct ConnectivityWatch {
    state_rx: tokio::sync::watch::Receiver<ConnectivityState>,
}

impl ConnectivityWatch {
    /// Latest reachability snapshot
    pub fn current(&self) -> ConnectivityState {
        *self.state_rx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.current().is_online()
    }

    /// Wait for the next transition. Returns `None` once the monitor is gone.
    pub async fn changed(&mut self) -> Option<ConnectivityState> {
        self.state_rx.changed().await.ok()?;
        Some(*self.state_rx.borrow_and_update())
    }
}
