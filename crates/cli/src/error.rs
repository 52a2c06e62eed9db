// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] gqlsync_core::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid variables: {0}\n  hint: pass a JSON object, e.g. --variables '{{\"id\":\"1\"}}'")]
    InvalidVariables(String),

    #[error("auth type {0} cannot be used from the command line\n  hint: API_KEY needs api.api_key in the config; token auth types need --token")]
    AuthNotConfigured(&'static str),

    #[error("{0}")]
    InvalidInput(String),

    #[error("subscription failed: {0}")]
    SubscriptionFailed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
