// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Application lifecycle events.
//!
//! The embedding application forwards foreground/background transitions to
//! a [`LifecycleNotifier`]; delta sync resyncs on every foreground event.

use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    WillEnterForeground,
    DidEnterBackground,
}

#[derive(Debug, Clone)]
pub struct LifecycleNotifier {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl LifecycleNotifier {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        LifecycleNotifier { tx }
    }

    /// Publish an event. Having no subscribers is fine.
    pub fn notify(&self, event: LifecycleEvent) {
        tracing::debug!(?event, "lifecycle event");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }
}

impl Default for LifecycleNotifier {
    fn default() -> Self {
        Self::new()
    }
}
