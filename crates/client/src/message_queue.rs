// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Ordered holding area for subscription messages that arrive mid-sync.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

/// A message and the time it was received.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMessage<T> {
    pub message: T,
    pub received_at: DateTime<Utc>,
}

/// Passes messages straight through while delivering, and buffers them in
/// arrival order while stopped.
#[derive(Debug)]
pub struct SubscriptionMessageQueue<T> {
    buffered: VecDeque<QueuedMessage<T>>,
    delivering: bool,
}

impl<T> SubscriptionMessageQueue<T> {
    pub fn new() -> Self {
        SubscriptionMessageQueue {
            buffered: VecDeque::new(),
            delivering: true,
        }
    }

    pub fn is_delivering(&self) -> bool {
        self.delivering
    }

    pub fn len(&self) -> usize {
        self.buffered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffered.is_empty()
    }

    pub fn stop_delivery(&mut self) {
        self.delivering = false;
    }

    /// Hand back the message for immediate delivery, or hold it.
    pub fn offer(&mut self, message: T, received_at: DateTime<Utc>) -> Option<QueuedMessage<T>> {
        let queued = QueuedMessage {
            message,
            received_at,
        };
        if self.delivering {
            return Some(queued);
        }
        self.buffered.push_back(queued);
        None
    }

    /// Resume delivery, returning everything held so far, oldest first.
    pub fn start_delivery(&mut self) -> Vec<QueuedMessage<T>> {
        self.delivering = true;
        self.buffered.drain(..).collect()
    }
}

impl<T> Default for SubscriptionMessageQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "message_queue_tests.rs"]
mod tests;
