//! Connectivity monitor.
//!
//! A thin wrapper over platform connectivity signals: the embedding shell
//! reports transitions via [`ConnectivityMonitor::set_online`], and consumers
//! either query the current state synchronously or subscribe to a watch
//! channel for became-online / became-offline notifications. Reporting
//! "online" says nothing about whether the transaction service is actually
//! reachable — the submission paths handle that separately.

use tokio::sync::watch;
use tracing::info;

pub struct ConnectivityMonitor {
    online: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (online, _) = watch::channel(initially_online);
        Self { online }
    }

    /// Current connectivity as last reported by the platform.
    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    /// Report a platform connectivity change. Repeated reports of the same
    /// state are ignored; subscribers are only woken on transitions.
    pub fn set_online(&self, online: bool) {
        let changed = self.online.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });
        if changed {
            if online {
                info!("Connectivity restored");
            } else {
                info!("Connectivity lost; sales will queue locally");
            }
        }
    }

    /// Subscribe to transition notifications.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }
}
