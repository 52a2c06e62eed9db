// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Network collaborators and the caching query executor.

use std::sync::Arc;

use gqlsync_core::sync_strategy::operation_hash;
use gqlsync_core::{
    BinaryObject, BoxFuture, CacheRecord, GraphQLRequest, NormalizedCache, RequestError,
    QUERY_ROOT,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::delta_sync::LAST_SYNC_VARIABLE;

/// Message prefix the server uses when a conditional mutation is rejected.
pub const CONDITIONAL_REQUEST_FAILED: &str = "The conditional request failed";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(default, rename = "errorType", skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// Server-side state attached to conflict errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl GraphQLError {
    pub fn new(message: impl Into<String>) -> Self {
        GraphQLError {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn is_conditional_check_failure(&self) -> bool {
        self.message.starts_with(CONDITIONAL_REQUEST_FAILED)
    }
}

/// A decoded GraphQL response body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQLResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,
}

impl GraphQLResponse {
    pub fn from_data(data: Value) -> Self {
        GraphQLResponse {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    pub fn with_error(mut self, error: GraphQLError) -> Self {
        self.errors.push(error);
        self
    }

    /// The conflict error, when the first error is a conditional check failure.
    pub fn conflict(&self) -> Option<&GraphQLError> {
        self.errors
            .first()
            .filter(|error| error.is_conditional_check_failure())
    }
}

/// Sends one GraphQL request. Retrying is the caller's job.
pub trait NetworkTransport: Send + Sync {
    fn send(&self, request: GraphQLRequest) -> BoxFuture<'_, Result<GraphQLResponse, RequestError>>;
}

/// Uploads the local file behind a [`BinaryObject`].
pub trait ObjectUploader: Send + Sync {
    fn upload(&self, object: BinaryObject) -> BoxFuture<'_, Result<(), RequestError>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Answer from the cache, fetching only on a miss.
    ReturnCacheDataElseFetch,
    /// Answer from the cache only; a miss yields an empty response.
    ReturnCacheDataDontFetch,
    /// Always fetch, then update the cache.
    FetchIgnoringCacheData,
}

/// Runs read queries against the network and the local cache.
pub trait QueryExecutor: Send + Sync {
    fn fetch(
        &self,
        request: GraphQLRequest,
        policy: CachePolicy,
    ) -> BoxFuture<'_, Result<GraphQLResponse, RequestError>>;
}

/// [`QueryExecutor`] that stores each query's `data` under the root record,
/// keyed by the query's operation hash.
///
/// The `lastSync` variable is left out of the key, so a delta query keeps a
/// single entry holding its latest result. Delta data is not merged into the
/// base query's entry; a cache-only base read returns the last full result.
pub struct CachingQueryExecutor {
    transport: Arc<dyn NetworkTransport>,
    cache: Arc<dyn NormalizedCache>,
}

impl CachingQueryExecutor {
    pub fn new(transport: Arc<dyn NetworkTransport>, cache: Arc<dyn NormalizedCache>) -> Self {
        CachingQueryExecutor { transport, cache }
    }

    fn cache_key(request: &GraphQLRequest) -> String {
        if !request.variables.contains_key(LAST_SYNC_VARIABLE) {
            return operation_hash(request, None, None);
        }
        let mut keyed = request.clone();
        keyed.variables.remove(LAST_SYNC_VARIABLE);
        operation_hash(&keyed, None, None)
    }

    fn read_cache(&self, request: &GraphQLRequest) -> Option<Value> {
        let records = match self.cache.load_records(&[QUERY_ROOT.to_string()]) {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "cache read failed");
                return None;
            }
        };
        records
            .into_iter()
            .flatten()
            .next()
            .and_then(|mut root| root.fields.remove(&Self::cache_key(request)))
    }

    fn write_cache(&self, request: &GraphQLRequest, data: &Value) {
        let record = CacheRecord::new(QUERY_ROOT).with_field(Self::cache_key(request), data.clone());
        if let Err(e) = self.cache.merge(vec![record]) {
            warn!(error = %e, "cache write failed");
        }
    }

    async fn fetch_network(&self, request: GraphQLRequest) -> Result<GraphQLResponse, RequestError> {
        let response = self.transport.send(request.clone()).await?;
        if let Some(data) = &response.data {
            self.write_cache(&request, data);
        }
        Ok(response)
    }
}

impl QueryExecutor for CachingQueryExecutor {
    fn fetch(
        &self,
        request: GraphQLRequest,
        policy: CachePolicy,
    ) -> BoxFuture<'_, Result<GraphQLResponse, RequestError>> {
        Box::pin(async move {
            match policy {
                CachePolicy::FetchIgnoringCacheData => self.fetch_network(request).await,
                CachePolicy::ReturnCacheDataDontFetch => Ok(self
                    .read_cache(&request)
                    .map(GraphQLResponse::from_data)
                    .unwrap_or_default()),
                CachePolicy::ReturnCacheDataElseFetch => match self.read_cache(&request) {
                    Some(data) => Ok(GraphQLResponse::from_data(data)),
                    None => self.fetch_network(request).await,
                },
            }
        })
    }
}

#[cfg(test)]
#[path = "network_tests.rs"]
mod tests;
