// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! gqlsync-core: Shared library for the offline-capable GraphQL client
//!
//! This crate provides the data model, error taxonomy, retry policy, realtime
//! wire protocol and persistence used by the realtime and client crates.

use std::future::Future;
use std::pin::Pin;

pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod mutation;
pub mod protocol;
pub mod reachability;
pub mod retry;
pub mod store;
pub mod sync_strategy;

pub use auth::{AuthError, AuthType, StaticTokenProvider, TokenProvider};
pub use cache::{CacheRecord, InMemoryNormalizedCache, NormalizedCache, QUERY_ROOT};
pub use config::ClientConfig;
pub use db::Database;
pub use error::{
    is_retryable_network_error, ConnectionProviderError, Error, HttpResponseInfo,
    NetworkErrorKind, RequestError, Result,
};
pub use mutation::{BinaryObject, GraphQLRequest, MutationRecord, RecordState};
pub use protocol::{RealtimeMessage, RealtimeResponse, SubscriptionResponse};
pub use reachability::{ReachabilityNotifier, ReachabilityWatcher};
pub use retry::{RetryAdvice, RetryPolicy, RetryStrategy};
pub use store::{MutationStore, SyncMetadataStore};
pub use sync_strategy::{SyncConfiguration, SyncMethod, SyncStrategy};

/// Boxed future returned by async collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
