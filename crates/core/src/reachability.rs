// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Network reachability service.
//!
//! One [`ReachabilityNotifier`] is created per process by the embedding
//! application and handed to every component that reacts to connectivity.
//! Platform integrations call [`ReachabilityNotifier::set_reachable`];
//! consumers hold a [`ReachabilityWatcher`].

use tokio::sync::watch;

/// Publishes reachable/unreachable transitions.
#[derive(Debug)]
pub struct ReachabilityNotifier {
    tx: watch::Sender<bool>,
}

impl ReachabilityNotifier {
    pub fn new(initially_reachable: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_reachable);
        ReachabilityNotifier { tx }
    }

    /// Record the current reachability. Watchers are only woken on change.
    pub fn set_reachable(&self, reachable: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == reachable {
                return false;
            }
            *current = reachable;
            true
        });
        if changed {
            tracing::debug!(reachable, "network reachability changed");
        }
    }

    pub fn is_reachable(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn watch(&self) -> ReachabilityWatcher {
        ReachabilityWatcher {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ReachabilityNotifier {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Receiving side of a [`ReachabilityNotifier`].
#[derive(Debug, Clone)]
pub struct ReachabilityWatcher {
    rx: watch::Receiver<bool>,
}

impl ReachabilityWatcher {
    pub fn is_reachable(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for the next transition and return the new value.
    ///
    /// Never resolves once the notifier has been dropped.
    pub async fn changed(&mut self) -> bool {
        if self.rx.changed().await.is_err() {
            return std::future::pending().await;
        }
        *self.rx.borrow_and_update()
    }

    /// Wait for the next unreachable-to-reachable transition.
    pub async fn restored(&mut self) {
        while !self.changed().await {}
    }
}

#[cfg(test)]
#[path = "reachability_tests.rs"]
mod tests;
