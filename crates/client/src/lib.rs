// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! gqlsync: offline-capable GraphQL client
//!
//! Mutations go through a persistent, serialized [`MutationQueue`] that
//! survives restarts and network loss. Reads are kept current by
//! [`DeltaSyncCoordinator`], which pairs base and delta queries with a live
//! subscription from `gqlsync-realtime`.

pub mod delta_sync;
pub mod lifecycle;
pub mod message_queue;
pub mod mutation_operation;
pub mod mutation_queue;
pub mod network;
pub mod retry_notifier;

#[cfg(test)]
mod test_support;

pub use delta_sync::{
    DeltaSyncContext, DeltaSyncCoordinator, DeltaSyncHandle, DeltaSyncHandler,
    DeltaSyncOperations, RealtimeSubscriptionStarter, SubscriptionError, SubscriptionMessage,
    SubscriptionSink, SubscriptionStarter, SubscriptionWatcher, SyncStatus,
};
pub use lifecycle::{LifecycleEvent, LifecycleNotifier};
pub use message_queue::SubscriptionMessageQueue;
pub use mutation_operation::{
    ConflictHandler, MutationContext, MutationOperation, MutationResult, OperationState,
};
pub use mutation_queue::{MutationHandle, MutationQueue, OfflineMutationDelegate};
pub use network::{
    CachePolicy, CachingQueryExecutor, GraphQLError, GraphQLResponse, NetworkTransport,
    ObjectUploader, QueryExecutor,
};
pub use retry_notifier::{RetryNotifier, RetrySignal};
