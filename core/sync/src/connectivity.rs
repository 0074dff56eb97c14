//! Connectivity monitoring.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

/// Reachability of the internet as seen by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkAccess {
    /// The internet is reachable.
    Internet,
    /// No usable connection.
    None,
}

/// Reports online/offline state and its transitions.
pub trait ConnectivityMonitor: Send + Sync {
    /// Current network access.
    fn network_access(&self) -> NetworkAccess;

    /// Watch channel that changes on every transition.
    fn subscribe(&self) -> watch::Receiver<NetworkAccess>;

    /// Whether the internet is reachable right now.
    fn has_internet(&self) -> bool {
        self.network_access() == NetworkAccess::Internet
    }
}

/// Monitor whose state is set explicitly.
///
/// Used in tests, and by hosts that learn about connectivity from the OS.
#[derive(Debug)]
pub struct ManualConnectivity {
    tx: watch::Sender<NetworkAccess>,
}

impl ManualConnectivity {
    pub fn new(initial: NetworkAccess) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Monitor that is always online.
    pub fn online() -> Self {
        Self::new(NetworkAccess::Internet)
    }

    /// Update the state; subscribers are notified only on an actual change.
    pub fn set(&self, access: NetworkAccess) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == access {
                false
            } else {
                *current = access;
                true
            }
        });
        if changed {
            debug!("Network access changed to {:?}", access);
        }
    }
}

impl ConnectivityMonitor for ManualConnectivity {
    fn network_access(&self) -> NetworkAccess {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<NetworkAccess> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_internet() {
        let monitor = ManualConnectivity::new(NetworkAccess::None);
        assert!(!monitor.has_internet());

        monitor.set(NetworkAccess::Internet);
        assert!(monitor.has_internet());
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions_only() {
        let monitor = ManualConnectivity::online();
        let mut rx = monitor.subscribe();

        monitor.set(NetworkAccess::Internet);
        assert!(!rx.has_changed().unwrap());

        monitor.set(NetworkAccess::None);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), NetworkAccess::None);
    }
}
