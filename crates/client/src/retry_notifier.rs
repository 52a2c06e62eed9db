// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot retry timer that also fires when the network comes back.

use std::time::Duration;

use gqlsync_core::retry::{retry_delay, MAX_RETRY_WAIT_MILLIS};
use gqlsync_core::{ReachabilityWatcher, RetryStrategy};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Why a retry wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrySignal {
    TimerElapsed,
    ReachabilityRestored,
    Cancelled,
}

/// Waits out the backoff for one retry attempt.
pub struct RetryNotifier {
    reachability: ReachabilityWatcher,
    cancel: CancellationToken,
}

impl RetryNotifier {
    pub fn new(reachability: ReachabilityWatcher, cancel: CancellationToken) -> Self {
        RetryNotifier {
            reachability,
            cancel,
        }
    }

    /// Exponential backoff for `attempt`, capped at the maximum wait.
    pub fn delay(attempt: u32) -> Duration {
        retry_delay(attempt, RetryStrategy::Exponential)
            .min(Duration::from_millis(MAX_RETRY_WAIT_MILLIS))
    }

    /// Resolve at whichever comes first: the backoff for `attempt`, a
    /// reachability restore, or cancellation. The losers are dropped.
    pub async fn wait(&mut self, attempt: u32) -> RetrySignal {
        let delay = Self::delay(attempt);
        let signal = tokio::select! {
            _ = self.cancel.cancelled() => RetrySignal::Cancelled,
            _ = tokio::time::sleep(delay) => RetrySignal::TimerElapsed,
            _ = self.reachability.restored() => RetrySignal::ReachabilityRestored,
        };
        debug!(attempt, ?delay, ?signal, "retry wait finished");
        signal
    }
}

#[cfg(test)]
#[path = "retry_notifier_tests.rs"]
mod tests;
