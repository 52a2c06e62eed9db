// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client configuration.
//!
//! Configuration is stored as TOML and includes:
//! - `[api]`: GraphQL endpoint, auth type and credentials
//! - `[storage]`: optional database path for queued mutations and sync metadata
//! - `[retry]`: retry strategy for realtime reconnects
//! - `[sync]`: delta-sync refresh interval

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::AuthType;
use crate::error::{Error, Result};
use crate::retry::RetryStrategy;
use crate::sync_strategy::SyncConfiguration;

const DATA_DIR_NAME: &str = "gqlsync";
const DB_FILE_NAME: &str = "gqlsync.db";

/// Top-level client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub sync: SyncConfiguration,
}

/// GraphQL endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// HTTPS GraphQL endpoint. The realtime endpoint is derived from it.
    pub url: String,
    pub auth_type: AuthType,
    /// Required when `auth_type` is `API_KEY`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// Local persistence settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file. Defaults to the platform data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub strategy: RetryStrategy,
}

impl ClientConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let endpoint = self.endpoint()?;
        if endpoint.host_str().is_none() {
            return Err(Error::InvalidConfig(format!(
                "api.url '{}' has no host",
                self.api.url
            )));
        }
        let has_api_key = matches!(self.api.api_key.as_deref(), Some(key) if !key.is_empty());
        if self.api.auth_type == AuthType::ApiKey && !has_api_key {
            return Err(Error::InvalidConfig(
                "api.api_key is required when auth_type is API_KEY".to_string(),
            ));
        }
        if self.sync.base_refresh_interval_secs == 0 {
            return Err(Error::InvalidConfig(
                "sync.base_refresh_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn endpoint(&self) -> Result<Url> {
        Ok(Url::parse(&self.api.url)?)
    }

    /// Database path, falling back to `<data_dir>/gqlsync/gqlsync.db`.
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.storage.database {
            return Ok(path.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join(DATA_DIR_NAME).join(DB_FILE_NAME))
            .ok_or_else(|| {
                Error::InvalidConfig(
                    "no data directory available; set storage.database".to_string(),
                )
            })
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
