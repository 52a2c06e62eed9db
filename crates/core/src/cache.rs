// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Normalized cache contract and an in-memory implementation.
//!
//! Records are keyed by object identity; fields hold scalar JSON values or
//! references to other records. The root record [`QUERY_ROOT`] always
//! exists so reads against an empty cache resolve to "no data" rather than
//! failing.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use serde_json::{Map, Value};

use crate::error::Result;

/// Key of the root query record.
pub const QUERY_ROOT: &str = "QUERY_ROOT";

/// One normalized cache record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CacheRecord {
    pub key: String,
    pub fields: Map<String, Value>,
}

impl CacheRecord {
    pub fn new(key: impl Into<String>) -> Self {
        CacheRecord {
            key: key.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }
}

/// Storage engine behind the client cache.
pub trait NormalizedCache: Send + Sync {
    /// Load records in the order of `keys`; missing keys yield `None`.
    fn load_records(&self, keys: &[String]) -> Result<Vec<Option<CacheRecord>>>;

    /// Merge records field by field, returning the changed `key.field` paths.
    fn merge(&self, records: Vec<CacheRecord>) -> Result<HashSet<String>>;

    /// Drop every record, leaving an empty root record.
    fn clear(&self) -> Result<()>;
}

/// Process-local [`NormalizedCache`].
#[derive(Debug)]
pub struct InMemoryNormalizedCache {
    records: Mutex<HashMap<String, Map<String, Value>>>,
}

impl InMemoryNormalizedCache {
    pub fn new() -> Self {
        InMemoryNormalizedCache {
            records: Mutex::new(Self::empty_records()),
        }
    }

    fn empty_records() -> HashMap<String, Map<String, Value>> {
        let mut records = HashMap::new();
        records.insert(QUERY_ROOT.to_string(), Map::new());
        records
    }
}

impl Default for InMemoryNormalizedCache {
    fn default() -> Self {
        Self::new()
    }
}

impl NormalizedCache for InMemoryNormalizedCache {
    fn load_records(&self, keys: &[String]) -> Result<Vec<Option<CacheRecord>>> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(keys
            .iter()
            .map(|key| {
                records.get(key).map(|fields| CacheRecord {
                    key: key.clone(),
                    fields: fields.clone(),
                })
            })
            .collect())
    }

    fn merge(&self, incoming: Vec<CacheRecord>) -> Result<HashSet<String>> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let mut changed = HashSet::new();
        for record in incoming {
            let existing = records.entry(record.key.clone()).or_default();
            for (field, value) in record.fields {
                if existing.get(&field) != Some(&value) {
                    changed.insert(format!("{}.{}", record.key, field));
                    existing.insert(field, value);
                }
            }
        }
        Ok(changed)
    }

    fn clear(&self) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        *records = Self::empty_records();
        Ok(())
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
