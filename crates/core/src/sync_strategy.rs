// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Choosing between a full and a partial (delta) sync.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::mutation::GraphQLRequest;

/// Default interval after which a full base query is forced: one day.
pub const DEFAULT_BASE_REFRESH_INTERVAL_SECS: u64 = 86_400;

/// How the next sync cycle fetches data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMethod {
    /// Run the base query against the network.
    Full,
    /// Run the delta query with the last sync time.
    Partial,
}

/// Tunables for delta sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfiguration {
    #[serde(default = "default_base_refresh_interval_secs")]
    pub base_refresh_interval_secs: u64,
}

fn default_base_refresh_interval_secs() -> u64 {
    DEFAULT_BASE_REFRESH_INTERVAL_SECS
}

impl SyncConfiguration {
    pub fn new(base_refresh_interval_secs: u64) -> Self {
        SyncConfiguration {
            base_refresh_interval_secs,
        }
    }

    pub fn base_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.base_refresh_interval_secs)
    }
}

impl Default for SyncConfiguration {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_REFRESH_INTERVAL_SECS)
    }
}

/// Sync bookkeeping for one delta-sync target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStrategy {
    pub last_sync_time: Option<DateTime<Utc>>,
    base_refresh_interval: Duration,
    has_delta_query: bool,
}

impl SyncStrategy {
    pub fn new(has_delta_query: bool, base_refresh_interval: Duration) -> Self {
        SyncStrategy {
            last_sync_time: None,
            base_refresh_interval,
            has_delta_query,
        }
    }

    pub fn base_refresh_interval(&self) -> Duration {
        self.base_refresh_interval
    }

    pub fn has_delta_query(&self) -> bool {
        self.has_delta_query
    }

    /// Method to use for a sync starting now.
    pub fn method(&self) -> SyncMethod {
        self.method_at(Utc::now())
    }

    /// Method to use for a sync starting at `now`.
    ///
    /// Partial only when a last sync time exists and is no older than the
    /// base refresh interval.
    pub fn method_at(&self, now: DateTime<Utc>) -> SyncMethod {
        let Some(last) = self.last_sync_time else {
            return SyncMethod::Full;
        };
        let elapsed = now.signed_duration_since(last);
        match chrono::Duration::from_std(self.base_refresh_interval) {
            Ok(interval) if elapsed <= interval => SyncMethod::Partial,
            _ => SyncMethod::Full,
        }
    }
}

/// Stable identity of a delta-sync target, used as its metadata key.
///
/// Exactly one operation contributes: the subscription when present, else
/// the delta query, else the base query. The result is the base64 SHA-256
/// of the operation text followed by its JSON variables.
pub fn operation_hash(
    base_query: &GraphQLRequest,
    subscription: Option<&GraphQLRequest>,
    delta_query: Option<&GraphQLRequest>,
) -> String {
    let source = subscription.or(delta_query).unwrap_or(base_query);
    let variables = serde_json::Value::Object(source.variables.clone()).to_string();

    let mut hasher = Sha256::new();
    hasher.update(source.query.as_bytes());
    hasher.update(variables.as_bytes());
    STANDARD.encode(hasher.finalize())
}

#[cfg(test)]
#[path = "sync_strategy_tests.rs"]
mod tests;
