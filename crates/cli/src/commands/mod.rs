// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

pub mod last_sync;
pub mod pending;
pub mod subscribe;

use std::path::Path;

use gqlsync_core::{ClientConfig, Database};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};

pub(crate) fn load_config(path: &Path) -> Result<ClientConfig> {
    debug!(path = %path.display(), "loading config");
    Ok(ClientConfig::load(path)?)
}

/// Open the database named by the configuration at `path`.
pub(crate) fn open_db(path: &Path) -> Result<Database> {
    let config = load_config(path)?;
    let db_path = config.database_path()?;
    debug!(path = %db_path.display(), "opening database");
    Ok(Database::open(&db_path)?)
}

/// Parse `--variables`, which must be a JSON object when given.
pub(crate) fn parse_variables(raw: Option<&str>) -> Result<Option<Map<String, Value>>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(Some(map)),
        Ok(other) => Err(Error::InvalidVariables(format!("expected an object, got {other}"))),
        Err(e) => Err(Error::InvalidVariables(e.to_string())),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
