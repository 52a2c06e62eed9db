// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for gqlsync-core operations.
//!
//! Besides the crate-level [`Error`], this module defines the two error
//! taxonomies shared by the rest of the workspace:
//! - [`ConnectionProviderError`] for the realtime subscription transport
//! - [`RequestError`] for request/response (mutation, query, upload) traffic

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// All possible errors that can occur in gqlsync-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("mutation record not found: {0}")]
    RecordNotFound(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("corrupted data: {0}")]
    CorruptedData(String),
}

/// A specialized Result type for gqlsync-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors emitted by a realtime connection provider to its listeners.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConnectionProviderError {
    /// Transport-level failure; the connection is gone.
    #[error("connection error")]
    Connection,

    /// A message could not be encoded or decoded.
    #[error("json parse error: {message}")]
    JsonParse { id: Option<String>, message: String },

    /// The server refused another subscription.
    #[error("subscription limit exceeded")]
    LimitExceeded { id: Option<String> },

    /// Server-reported error for a single subscription.
    #[error("subscription error for {id}: {payload}")]
    Subscription {
        id: String,
        payload: serde_json::Value,
    },

    /// Credentials were rejected.
    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Other(String),
}

impl ConnectionProviderError {
    /// The subscription identifier this error is scoped to, if any.
    pub fn identifier(&self) -> Option<&str> {
        match self {
            ConnectionProviderError::JsonParse { id, .. }
            | ConnectionProviderError::LimitExceeded { id } => id.as_deref(),
            ConnectionProviderError::Subscription { id, .. } => Some(id),
            _ => None,
        }
    }
}

/// Underlying network failure codes surfaced by transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkErrorKind {
    NotConnectedToInternet,
    DnsLookupFailed,
    CannotConnectToHost,
    CannotFindHost,
    TimedOut,
    /// Any other platform-specific network failure code.
    Other(i32),
}

impl NetworkErrorKind {
    /// Whether this failure indicates a missing or flaky network rather than
    /// a request the server will keep rejecting.
    pub fn is_transient(&self) -> bool {
        !matches!(self, NetworkErrorKind::Other(_))
    }
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkErrorKind::NotConnectedToInternet => write!(f, "not connected to internet"),
            NetworkErrorKind::DnsLookupFailed => write!(f, "dns lookup failed"),
            NetworkErrorKind::CannotConnectToHost => write!(f, "cannot connect to host"),
            NetworkErrorKind::CannotFindHost => write!(f, "cannot find host"),
            NetworkErrorKind::TimedOut => write!(f, "timed out"),
            NetworkErrorKind::Other(code) => write!(f, "network error {code}"),
        }
    }
}

/// The HTTP response captured alongside a failed request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponseInfo {
    pub status: u16,
    pub headers: HashMap<String, String>,
}

impl HttpResponseInfo {
    pub fn new(status: u16) -> Self {
        HttpResponseInfo {
            status,
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The `Retry-After` header, when present and expressed in whole seconds.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.header("Retry-After")
            .and_then(|value| value.trim().parse().ok())
    }
}

/// Errors produced by request/response operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    /// Raw network failure with no HTTP exchange.
    #[error("network error: {0}")]
    Network(NetworkErrorKind),

    #[error("request failed: {message}")]
    RequestFailed {
        message: String,
        response: Option<HttpResponseInfo>,
        cause: Option<NetworkErrorKind>,
    },

    #[error("response contained no data")]
    NoData { response: Option<HttpResponseInfo> },

    #[error("could not parse response: {message}")]
    Parse {
        message: String,
        response: Option<HttpResponseInfo>,
    },

    #[error("authentication failed: {message}")]
    Authentication {
        message: String,
        cause: Option<NetworkErrorKind>,
    },

    #[error("{0}")]
    Other(String),
}

impl RequestError {
    /// The HTTP response captured with this error, if any.
    pub fn response(&self) -> Option<&HttpResponseInfo> {
        match self {
            RequestError::RequestFailed { response, .. }
            | RequestError::NoData { response }
            | RequestError::Parse { response, .. } => response.as_ref(),
            _ => None,
        }
    }
}

/// Returns true when a failed mutation or upload should be retried because
/// the network was unavailable.
///
/// Plain network errors qualify when their code is transient; request and
/// authentication failures qualify only when they wrap such a code.
pub fn is_retryable_network_error(err: &RequestError) -> bool {
    match err {
        RequestError::Network(kind) => kind.is_transient(),
        RequestError::RequestFailed {
            cause: Some(kind), ..
        }
        | RequestError::Authentication {
            cause: Some(kind), ..
        } => kind.is_transient(),
        _ => false,
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
