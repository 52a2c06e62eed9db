// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed storage for queued mutations and sync metadata.
//!
//! The [`Database`] struct implements [`MutationStore`] and
//! [`SyncMetadataStore`]. Writes are serialized through a single connection.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::mutation::{BinaryObject, MutationRecord, RecordState};
use crate::store::{MutationStore, SyncMetadataStore};

/// SQL schema for the client database.
pub const SCHEMA: &str = r#"
-- Mutations waiting to be delivered
CREATE TABLE IF NOT EXISTS mutation_records (
    _id INTEGER PRIMARY KEY AUTOINCREMENT,
    record_id TEXT NOT NULL UNIQUE,
    data BLOB NOT NULL,
    state TEXT NOT NULL,            -- in_queue|sent|discarded
    created_at TEXT NOT NULL,
    s3_bucket TEXT,
    s3_key TEXT,
    s3_region TEXT,
    s3_local_uri TEXT,
    s3_mime_type TEXT,
    operation TEXT NOT NULL
);

-- Last successful sync per delta-sync operation hash
CREATE TABLE IF NOT EXISTS subscription_metadata (
    operation_hash TEXT PRIMARY KEY,
    last_sync_time TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_mutation_records_state ON mutation_records(state, created_at);
"#;

fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC3339 timestamp from the database.
fn parse_timestamp(
    value: &str,
    column: &str,
) -> std::result::Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(Error::CorruptedData(format!(
                    "invalid timestamp '{value}' in column '{column}'"
                ))),
            )
        })
}

/// Parse a record state from the database.
fn parse_state(value: &str) -> std::result::Result<RecordState, rusqlite::Error> {
    value.parse().map_err(|e: Error| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_record(row: &rusqlite::Row<'_>) -> std::result::Result<MutationRecord, rusqlite::Error> {
    let state: String = row.get("state")?;
    let created_at: String = row.get("created_at")?;

    let bucket: Option<String> = row.get("s3_bucket")?;
    let key: Option<String> = row.get("s3_key")?;
    let region: Option<String> = row.get("s3_region")?;
    let local_uri: Option<String> = row.get("s3_local_uri")?;
    let mime_type: Option<String> = row.get("s3_mime_type")?;
    let binary_object = match (bucket, key, region, local_uri, mime_type) {
        (Some(bucket), Some(key), Some(region), Some(local_uri), Some(mime_type)) => {
            Some(BinaryObject {
                bucket,
                key,
                region,
                mime_type,
                local_uri,
            })
        }
        _ => None,
    };

    Ok(MutationRecord {
        id: row.get("record_id")?,
        data: row.get("data")?,
        state: parse_state(&state)?,
        created_at: parse_timestamp(&created_at, "created_at")?,
        binary_object,
        operation: row.get("operation")?,
    })
}

/// SQLite database holding client-side persistent state.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open a database at the given path, creating it if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fetch a single record by identifier.
    pub fn get_record(&self, id: &str) -> Result<MutationRecord> {
        self.conn()
            .query_row(
                "SELECT * FROM mutation_records WHERE record_id = ?1",
                [id],
                row_to_record,
            )
            .optional()?
            .ok_or_else(|| Error::RecordNotFound(id.to_string()))
    }

    /// Number of stored records in any state.
    pub fn count_records(&self) -> Result<usize> {
        let count: i64 =
            self.conn()
                .query_row("SELECT COUNT(*) FROM mutation_records", [], |row| {
                    row.get(0)
                })?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

impl MutationStore for Database {
    fn save(&self, record: &MutationRecord) -> Result<()> {
        let object = record.binary_object.as_ref();
        self.conn().execute(
            "INSERT INTO mutation_records (record_id, data, state, created_at,
             s3_bucket, s3_key, s3_region, s3_local_uri, s3_mime_type, operation)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.id,
                record.data,
                record.state.to_string(),
                format_timestamp(&record.created_at),
                object.map(|o| o.bucket.as_str()),
                object.map(|o| o.key.as_str()),
                object.map(|o| o.region.as_str()),
                object.map(|o| o.local_uri.as_str()),
                object.map(|o| o.mime_type.as_str()),
                record.operation,
            ],
        )?;
        Ok(())
    }

    fn update(&self, record: &MutationRecord) -> Result<()> {
        let changed = self.conn().execute(
            "UPDATE mutation_records SET state = ?1 WHERE record_id = ?2",
            params![record.state.to_string(), record.id],
        )?;
        if changed == 0 {
            return Err(Error::RecordNotFound(record.id.clone()));
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM mutation_records WHERE record_id = ?1", [id])?;
        Ok(())
    }

    fn list_queued(&self) -> Result<Vec<MutationRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT * FROM mutation_records WHERE state = ?1 ORDER BY created_at ASC, _id ASC",
        )?;
        let records = stmt
            .query_map([RecordState::InQueue.to_string()], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

impl SyncMetadataStore for Database {
    fn last_sync_time(&self, operation_hash: &str) -> Result<Option<DateTime<Utc>>> {
        let value: Option<String> = self
            .conn()
            .query_row(
                "SELECT last_sync_time FROM subscription_metadata WHERE operation_hash = ?1",
                [operation_hash],
                |row| row.get(0),
            )
            .optional()?;
        match value {
            Some(text) => Ok(Some(parse_timestamp(&text, "last_sync_time")?)),
            None => Ok(None),
        }
    }

    fn set_last_sync_time(&self, operation_hash: &str, time: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "INSERT INTO subscription_metadata (operation_hash, last_sync_time)
             VALUES (?1, ?2)
             ON CONFLICT(operation_hash) DO UPDATE SET last_sync_time = excluded.last_sync_time",
            params![operation_hash, format_timestamp(&time)],
        )?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "db_tests.rs"]
mod tests;
