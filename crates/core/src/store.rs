// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Persistence contracts for queued mutations and sync metadata.
//!
//! [`crate::db::Database`] implements both on SQLite.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::mutation::MutationRecord;

/// Durable storage for queued mutations.
pub trait MutationStore: Send + Sync {
    /// Insert a new record.
    fn save(&self, record: &MutationRecord) -> Result<()>;

    /// Persist a changed record state. The mutation queue itself does not
    /// call this; it is for tools that mark records `sent` or `discarded`.
    fn update(&self, record: &MutationRecord) -> Result<()>;

    /// Remove a record. Missing records are not an error.
    fn delete(&self, id: &str) -> Result<()>;

    /// All records still in the queue, oldest first.
    fn list_queued(&self) -> Result<Vec<MutationRecord>>;
}

/// Durable storage for per-operation last sync times.
pub trait SyncMetadataStore: Send + Sync {
    fn last_sync_time(&self, operation_hash: &str) -> Result<Option<DateTime<Utc>>>;

    fn set_last_sync_time(&self, operation_hash: &str, time: DateTime<Utc>) -> Result<()>;
}
