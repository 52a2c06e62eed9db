// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Retry wait computation and retry advice.
//!
//! Two strategies are supported:
//! - `exponential`: `2^attempt * 100ms + jitter`, each wait capped at five minutes
//! - `aggressive`: `1s + jitter` per attempt, giving up after 30 attempts
//!
//! Jitter is uniformly random in `[0, 100)` milliseconds.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ConnectionProviderError, RequestError};

/// Upper bound for a single computed wait.
pub const MAX_RETRY_WAIT_MILLIS: u64 = 300 * 1000;

/// Exclusive upper bound of the random jitter added to each wait.
pub const JITTER_MILLIS: u64 = 100;

/// Attempt count after which the aggressive strategy stops retrying.
pub const MAX_AGGRESSIVE_ATTEMPTS: u32 = 30;

const AGGRESSIVE_BASE_MILLIS: u64 = 1000;
const EXPONENTIAL_BASE_MILLIS: u64 = 100;
const MAX_EXPONENT: u32 = 31;

/// How retries are spaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    #[default]
    Exponential,
    Aggressive,
}

impl std::str::FromStr for RetryStrategy {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_lowercase().as_str() {
            "exponential" => Ok(RetryStrategy::Exponential),
            "aggressive" => Ok(RetryStrategy::Aggressive),
            _ => Err(crate::Error::InvalidInput(format!(
                "invalid retry strategy: '{s}'\n  hint: valid strategies are: exponential, aggressive"
            ))),
        }
    }
}

/// A retry decision and the wait to apply before the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAdvice {
    pub should_retry: bool,
    pub retry_interval: Option<Duration>,
}

impl RetryAdvice {
    pub fn retry_after(interval: Duration) -> Self {
        RetryAdvice {
            should_retry: true,
            retry_interval: Some(interval),
        }
    }

    pub fn give_up() -> Self {
        RetryAdvice {
            should_retry: false,
            retry_interval: None,
        }
    }
}

/// Wait before `attempt` with the jitter supplied by the caller.
///
/// Exponential waits are capped at [`MAX_RETRY_WAIT_MILLIS`].
pub fn retry_delay_millis_with_jitter(attempt: u32, strategy: RetryStrategy, jitter: u64) -> u64 {
    match strategy {
        RetryStrategy::Exponential => {
            let exponent = attempt.min(MAX_EXPONENT);
            let base = (1u64 << exponent) * EXPONENTIAL_BASE_MILLIS;
            (base + jitter).min(MAX_RETRY_WAIT_MILLIS)
        }
        RetryStrategy::Aggressive => AGGRESSIVE_BASE_MILLIS + jitter,
    }
}

/// Wait before `attempt` with random jitter.
pub fn retry_delay_millis(attempt: u32, strategy: RetryStrategy) -> u64 {
    let jitter = rand::thread_rng().gen_range(0..JITTER_MILLIS);
    retry_delay_millis_with_jitter(attempt, strategy, jitter)
}

/// Convenience wrapper around [`retry_delay_millis`].
pub fn retry_delay(attempt: u32, strategy: RetryStrategy) -> Duration {
    Duration::from_millis(retry_delay_millis(attempt, strategy))
}

/// Stateful retry evaluator.
///
/// Each call to one of the `should_retry_*` methods counts as one attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    strategy: RetryStrategy,
    attempt: u32,
}

impl RetryPolicy {
    pub fn new(strategy: RetryStrategy) -> Self {
        RetryPolicy {
            strategy,
            attempt: 0,
        }
    }

    pub fn strategy(&self) -> RetryStrategy {
        self.strategy
    }

    /// Attempts evaluated so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    fn next_attempt(&mut self) -> Option<u32> {
        self.attempt = self.attempt.saturating_add(1);
        if self.strategy == RetryStrategy::Aggressive && self.attempt > MAX_AGGRESSIVE_ATTEMPTS {
            return None;
        }
        Some(self.attempt)
    }

    /// Advice for a failed HTTP request.
    ///
    /// Only errors that captured an HTTP response are retried. A numeric
    /// `Retry-After` header wins over the computed wait; otherwise 429 and
    /// 5xx responses are retried after the strategy's wait.
    pub fn should_retry_request(&mut self, error: &RequestError) -> RetryAdvice {
        let Some(attempt) = self.next_attempt() else {
            return RetryAdvice::give_up();
        };
        let Some(response) = error.response() else {
            return RetryAdvice::give_up();
        };
        if let Some(secs) = response.retry_after_secs() {
            return RetryAdvice::retry_after(Duration::from_secs(secs));
        }
        match response.status {
            429 | 500..=599 => RetryAdvice::retry_after(retry_delay(attempt, self.strategy)),
            _ => RetryAdvice::give_up(),
        }
    }

    /// Advice for an error reported by a realtime connection.
    ///
    /// Connection drops and subscription limits are retried; everything else
    /// is terminal.
    pub fn should_retry_connection(&mut self, error: &ConnectionProviderError) -> RetryAdvice {
        let Some(attempt) = self.next_attempt() else {
            return RetryAdvice::give_up();
        };
        match error {
            ConnectionProviderError::Connection | ConnectionProviderError::LimitExceeded { .. } => {
                RetryAdvice::retry_after(retry_delay(attempt, self.strategy))
            }
            _ => RetryAdvice::give_up(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryStrategy::default())
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
