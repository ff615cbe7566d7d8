//! Network reachability as reported by the host.

use tokio::sync::watch;

use crate::observable::Observable;

/// Online/offline oracle. Implementations only report; they never retry.
pub trait ConnectivityMonitor: Send + Sync {
    fn is_online(&self) -> bool;

    /// Receives the new state on every transition.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Connectivity state driven by the embedding application.
#[derive(Debug)]
pub struct SharedConnectivity {
    state: Observable<bool>,
}

impl SharedConnectivity {
    pub fn new(online: bool) -> Self {
        Self {
            state: Observable::new(online),
        }
    }

    /// Record the device's connectivity; only transitions notify subscribers.
    pub fn set_online(&self, online: bool) {
        if self.state.publish_if_changed(online) {
            tracing::info!(online, "Connectivity changed");
        }
    }
}

impl Default for SharedConnectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivityMonitor for SharedConnectivity {
    fn is_online(&self) -> bool {
        self.state.get()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}
