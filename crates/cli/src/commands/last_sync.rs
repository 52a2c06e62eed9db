// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::io::Write;
use std::path::Path;

use gqlsync::DeltaSyncOperations;
use gqlsync_core::{GraphQLRequest, SyncMetadataStore};
use serde_json::Value;

use crate::cli::SyncTargetArgs;
use crate::error::{Error, Result};

use super::{open_db, parse_variables};

pub fn run(config_path: &Path, target: &SyncTargetArgs) -> Result<()> {
    let hash = resolve_hash(target)?;
    let db = open_db(config_path)?;
    run_impl(&db, &hash, &mut std::io::stdout())
}

pub(crate) fn run_impl(store: &dyn SyncMetadataStore, hash: &str, out: &mut impl Write) -> Result<()> {
    match store.last_sync_time(hash)? {
        Some(time) => writeln!(out, "{hash}  {}", time.to_rfc3339())?,
        None => writeln!(out, "{hash}  never synced")?,
    }
    Ok(())
}

/// The hash given directly, or the one derived from the operations.
pub(crate) fn resolve_hash(target: &SyncTargetArgs) -> Result<String> {
    if let Some(hash) = &target.hash {
        return Ok(hash.clone());
    }
    let Some(base_query) = &target.base_query else {
        return Err(Error::InvalidInput(
            "either a hash or --base-query is required".to_string(),
        ));
    };
    let variables = parse_variables(target.variables.as_deref())?.map(Value::Object);
    let request = |query: &str| {
        let request = GraphQLRequest::new(query);
        match &variables {
            Some(variables) => request.with_variables(variables.clone()),
            None => request,
        }
    };

    let mut operations = DeltaSyncOperations::new(request(base_query));
    if let Some(delta) = &target.delta_query {
        operations = operations.with_delta_query(request(delta));
    }
    if let Some(subscription) = &target.subscription {
        operations = operations.with_subscription(request(subscription));
    }
    Ok(operations.operation_hash())
}

#[cfg(test)]
#[path = "last_sync_tests.rs"]
mod tests;
