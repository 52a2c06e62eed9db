// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use gqlsync_core::{BinaryObject, MutationRecord, MutationStore, RecordState};
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::error::Result;

use super::open_db;

#[derive(Serialize)]
struct PendingMutation<'a> {
    id: &'a str,
    state: RecordState,
    created_at: DateTime<Utc>,
    operation: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    binary_object: Option<&'a BinaryObject>,
}

impl<'a> From<&'a MutationRecord> for PendingMutation<'a> {
    fn from(record: &'a MutationRecord) -> Self {
        PendingMutation {
            id: &record.id,
            state: record.state,
            created_at: record.created_at,
            operation: &record.operation,
            binary_object: record.binary_object.as_ref(),
        }
    }
}

pub fn run(config_path: &Path, output: OutputFormat) -> Result<()> {
    let db = open_db(config_path)?;
    run_impl(&db, output, &mut std::io::stdout())
}

/// Internal implementation that accepts the store for testing.
pub(crate) fn run_impl(store: &dyn MutationStore, output: OutputFormat, out: &mut impl Write) -> Result<()> {
    let records = store.list_queued()?;
    match output {
        OutputFormat::Json => {
            let pending: Vec<PendingMutation<'_>> = records.iter().map(PendingMutation::from).collect();
            writeln!(out, "{}", serde_json::to_string_pretty(&pending)?)?;
        }
        OutputFormat::Text => {
            if records.is_empty() {
                writeln!(out, "No pending mutations")?;
            }
            for record in &records {
                writeln!(out, "{}", format_record(record))?;
            }
        }
    }
    Ok(())
}

fn format_record(record: &MutationRecord) -> String {
    let mut line = format!(
        "{}  {}  {}  {}",
        record.id,
        record.created_at.format("%Y-%m-%d %H:%M:%S"),
        record.state,
        summarize(&record.operation)
    );
    if let Some(object) = &record.binary_object {
        line.push_str(&format!("  [upload {}/{}]", object.bucket, object.key));
    }
    line
}

/// Collapse an operation document to one line.
fn summarize(operation: &str) -> String {
    operation.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
#[path = "pending_tests.rs"]
mod tests;
