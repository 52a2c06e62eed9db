// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Delta sync: keep a base query, an optional delta query and an optional
//! live subscription in step with the server.
//!
//! Each coordinator runs in its own task. A sync cycle (re)starts the
//! subscription, then runs either the delta query (when the last sync is
//! recent enough) or the base query. Subscription data that arrives while a
//! cycle runs is held and delivered, in arrival order, once it ends.
//! Cycles repeat every base refresh interval, back off after failures, and
//! also run on foreground and reachability-restored events.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gqlsync_core::retry::{retry_delay, MAX_RETRY_WAIT_MILLIS};
use gqlsync_core::sync_strategy::operation_hash;
use gqlsync_core::{
    BoxFuture, ConnectionProviderError, GraphQLRequest, ReachabilityNotifier, RequestError,
    RetryStrategy, SyncConfiguration, SyncMetadataStore, SyncMethod, SyncStrategy,
};
use gqlsync_realtime::{
    SubscriptionConnection, SubscriptionConnectionState, SubscriptionItem, SubscriptionItemEvent,
};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::lifecycle::{LifecycleEvent, LifecycleNotifier};
use crate::message_queue::{QueuedMessage, SubscriptionMessageQueue};
use crate::network::{CachePolicy, GraphQLResponse, QueryExecutor};

/// Clock skew allowance, in seconds, subtracted from every recorded sync time.
pub const SYNC_TIME_SKEW_SECS: i64 = 2;

/// Variable carrying the last sync time, in epoch seconds, to delta queries.
pub const LAST_SYNC_VARIABLE: &str = "lastSync";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubscriptionError {
    /// The server ended the subscription, usually across a connectivity
    /// change. A later foreground or reachability event restarts it.
    #[error("Subscription Terminated.")]
    Terminated,

    #[error("subscription connection failed: {0}")]
    Connection(ConnectionProviderError),

    #[error("{0}")]
    Other(String),
}

/// A subscription message stamped with its arrival time.
pub type SubscriptionMessage = (Result<Value, SubscriptionError>, DateTime<Utc>);

/// Where a running subscription pushes its messages.
#[derive(Debug, Clone)]
pub struct SubscriptionSink {
    tx: mpsc::UnboundedSender<SubscriptionMessage>,
}

impl SubscriptionSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SubscriptionMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SubscriptionSink { tx }, rx)
    }

    /// Stamp `message` with the current time and forward it. Returns false
    /// once the receiving side is gone.
    pub fn send(&self, message: Result<Value, SubscriptionError>) -> bool {
        self.tx.send((message, Utc::now())).is_ok()
    }
}

/// A running subscription.
pub trait SubscriptionWatcher: Send + Sync {
    fn cancel(&mut self);
}

/// Starts subscriptions for delta sync.
pub trait SubscriptionStarter: Send + Sync {
    /// Resolve once the subscription is acknowledged, or with the error that
    /// prevented it. After success, data and later errors go to `sink`.
    fn subscribe(
        &self,
        request: GraphQLRequest,
        sink: SubscriptionSink,
    ) -> BoxFuture<'_, Result<Box<dyn SubscriptionWatcher>, SubscriptionError>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncStatus {
    Active,
    Failed(String),
    Interrupted,
    Cancelled,
}

/// Application callbacks for one delta-sync target.
pub trait DeltaSyncHandler: Send + Sync {
    fn base_query_result(&self, result: &Result<GraphQLResponse, RequestError>);

    fn delta_query_result(&self, result: &Result<GraphQLResponse, RequestError>);

    fn subscription_result(&self, result: &Result<Value, SubscriptionError>);

    fn sync_status(&self, _status: SyncStatus) {}
}

/// The operations kept in sync.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaSyncOperations {
    pub base_query: GraphQLRequest,
    pub delta_query: Option<GraphQLRequest>,
    pub subscription: Option<GraphQLRequest>,
}

impl DeltaSyncOperations {
    pub fn new(base_query: GraphQLRequest) -> Self {
        DeltaSyncOperations {
            base_query,
            delta_query: None,
            subscription: None,
        }
    }

    pub fn with_delta_query(mut self, delta_query: GraphQLRequest) -> Self {
        self.delta_query = Some(delta_query);
        self
    }

    pub fn with_subscription(mut self, subscription: GraphQLRequest) -> Self {
        self.subscription = Some(subscription);
        self
    }

    /// Key under which the last sync time is stored.
    pub fn operation_hash(&self) -> String {
        operation_hash(
            &self.base_query,
            self.subscription.as_ref(),
            self.delta_query.as_ref(),
        )
    }
}

/// Collaborators shared by delta-sync targets.
#[derive(Clone)]
pub struct DeltaSyncContext {
    pub executor: Arc<dyn QueryExecutor>,
    pub subscriptions: Option<Arc<dyn SubscriptionStarter>>,
    pub metadata: Option<Arc<dyn SyncMetadataStore>>,
    pub reachability: Arc<ReachabilityNotifier>,
    pub lifecycle: Option<LifecycleNotifier>,
}

impl DeltaSyncContext {
    pub fn new(executor: Arc<dyn QueryExecutor>, reachability: Arc<ReachabilityNotifier>) -> Self {
        DeltaSyncContext {
            executor,
            subscriptions: None,
            metadata: None,
            reachability,
            lifecycle: None,
        }
    }

    pub fn with_subscriptions(mut self, subscriptions: Arc<dyn SubscriptionStarter>) -> Self {
        self.subscriptions = Some(subscriptions);
        self
    }

    pub fn with_metadata(mut self, metadata: Arc<dyn SyncMetadataStore>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: LifecycleNotifier) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }
}

/// Caller side of a running coordinator.
pub struct DeltaSyncHandle {
    hash: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl DeltaSyncHandle {
    pub fn operation_hash(&self) -> &str {
        &self.hash
    }

    /// Stop syncing and release the subscription.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

pub struct DeltaSyncCoordinator {
    hash: String,
    operations: DeltaSyncOperations,
    handler: Arc<dyn DeltaSyncHandler>,
    context: DeltaSyncContext,
    strategy: SyncStrategy,
    failures: u32,
    next_sync: Instant,
    watcher: Option<Box<dyn SubscriptionWatcher>>,
    messages: SubscriptionMessageQueue<Value>,
    sink: SubscriptionSink,
    incoming: mpsc::UnboundedReceiver<SubscriptionMessage>,
    cancel: CancellationToken,
}

impl DeltaSyncCoordinator {
    /// Spawn a coordinator for `operations`. Must be called within a tokio
    /// runtime.
    pub fn start(
        context: DeltaSyncContext,
        mut operations: DeltaSyncOperations,
        handler: Arc<dyn DeltaSyncHandler>,
        config: SyncConfiguration,
    ) -> DeltaSyncHandle {
        let hash = operations.operation_hash();
        if operations.subscription.is_some() && context.subscriptions.is_none() {
            warn!(hash = %hash, "no subscription starter configured, syncing without subscription");
            operations.subscription = None;
        }

        let (sink, incoming) = SubscriptionSink::channel();
        let cancel = CancellationToken::new();
        let coordinator = DeltaSyncCoordinator {
            hash: hash.clone(),
            strategy: SyncStrategy::new(
                operations.delta_query.is_some(),
                config.base_refresh_interval(),
            ),
            operations,
            handler,
            context,
            failures: 0,
            next_sync: Instant::now(),
            watcher: None,
            messages: SubscriptionMessageQueue::new(),
            sink,
            incoming,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(coordinator.run());

        DeltaSyncHandle { hash, cancel, task }
    }

    async fn run(mut self) {
        let mut reachability = self.context.reachability.watch();
        let mut lifecycle = self.context.lifecycle.as_ref().map(LifecycleNotifier::subscribe);

        self.load_last_sync_time();
        self.read_base_from_cache().await;

        if self.sync_or_cancel("initial").await {
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep_until(self.next_sync) => {
                        if !self.sync_or_cancel("scheduled").await {
                            break;
                        }
                    }
                    event = next_lifecycle_event(&mut lifecycle) => match event {
                        Ok(LifecycleEvent::WillEnterForeground) | Err(broadcast::error::RecvError::Lagged(_)) => {
                            if !self.sync_or_cancel("foreground").await {
                                break;
                            }
                        }
                        Ok(LifecycleEvent::DidEnterBackground) => {}
                        Err(broadcast::error::RecvError::Closed) => lifecycle = None,
                    },
                    reachable = reachability.changed() => {
                        if reachable && !self.sync_or_cancel("reachability restored").await {
                            break;
                        }
                    }
                    Some((message, received_at)) = self.incoming.recv() => {
                        self.handle_message(message, received_at)
                    }
                }
            }
        }

        if let Some(mut watcher) = self.watcher.take() {
            watcher.cancel();
        }
        info!(hash = %self.hash, "delta sync cancelled");
        self.handler.sync_status(SyncStatus::Cancelled);
    }

    /// Run one cycle unless cancelled first. Returns false on cancellation.
    async fn sync_or_cancel(&mut self, reason: &str) -> bool {
        let cancel = self.cancel.clone();
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = self.perform_sync(reason) => true,
        }
    }

    fn load_last_sync_time(&mut self) {
        let Some(metadata) = &self.context.metadata else {
            return;
        };
        match metadata.last_sync_time(&self.hash) {
            Ok(time) => {
                debug!(hash = %self.hash, last_sync = ?time, "loaded last sync time");
                self.strategy.last_sync_time = time;
            }
            Err(e) => warn!(hash = %self.hash, error = %e, "could not load last sync time"),
        }
    }

    async fn read_base_from_cache(&self) {
        debug!(hash = %self.hash, "reading base query from cache");
        let result = self
            .context
            .executor
            .fetch(self.operations.base_query.clone(), CachePolicy::ReturnCacheDataDontFetch)
            .await;
        self.handler.base_query_result(&result);
    }

    async fn perform_sync(&mut self, reason: &str) {
        info!(hash = %self.hash, reason, "starting sync");
        self.messages.stop_delivery();
        let cycle_start = Instant::now();

        let succeeded = self.run_cycle().await;

        while let Ok((message, received_at)) = self.incoming.try_recv() {
            self.handle_message(message, received_at);
        }
        for queued in self.messages.start_delivery() {
            self.deliver(queued);
        }

        if succeeded {
            self.failures = 0;
            self.next_sync = cycle_start + self.strategy.base_refresh_interval();
            self.handler.sync_status(SyncStatus::Active);
        } else {
            self.failures = self.failures.saturating_add(1);
            let delay = retry_delay(self.failures, RetryStrategy::Exponential)
                .min(Duration::from_millis(MAX_RETRY_WAIT_MILLIS));
            debug!(hash = %self.hash, failures = self.failures, ?delay, "sync failed, backing off");
            self.next_sync = Instant::now() + delay;
        }
    }

    async fn run_cycle(&mut self) -> bool {
        if !self.start_subscription().await {
            return false;
        }

        let method = self.strategy.method_at(Utc::now());
        match (&self.operations.delta_query, self.strategy.last_sync_time, method) {
            (Some(delta), Some(last_sync), SyncMethod::Partial) => {
                self.run_delta_query(delta.clone(), last_sync).await
            }
            _ => self.run_base_query().await,
        }
    }

    /// Start a fresh subscription. On success the previous watcher is
    /// cancelled. Succeeds trivially when there is nothing to subscribe to.
    async fn start_subscription(&mut self) -> bool {
        let (Some(request), Some(starter)) =
            (&self.operations.subscription, &self.context.subscriptions)
        else {
            return true;
        };
        debug!(hash = %self.hash, "starting subscription");
        match starter.subscribe(request.clone(), self.sink.clone()).await {
            Ok(watcher) => {
                if let Some(mut previous) = self.watcher.replace(watcher) {
                    previous.cancel();
                }
                true
            }
            Err(SubscriptionError::Terminated) => {
                debug!(hash = %self.hash, "subscription terminated while starting");
                self.handler.sync_status(SyncStatus::Interrupted);
                false
            }
            Err(e) => {
                error!(hash = %self.hash, error = %e, "unable to start subscription");
                self.handler.subscription_result(&Err(e));
                self.handler.sync_status(SyncStatus::Interrupted);
                false
            }
        }
    }

    async fn run_base_query(&mut self) -> bool {
        info!(hash = %self.hash, "running base query");
        let fetch_started = Utc::now();
        let result = self
            .context
            .executor
            .fetch(self.operations.base_query.clone(), CachePolicy::FetchIgnoringCacheData)
            .await;
        self.handler.base_query_result(&result);
        match result {
            Ok(_) => {
                self.record_sync_time(fetch_started);
                true
            }
            Err(e) => {
                self.handler.sync_status(SyncStatus::Failed(e.to_string()));
                false
            }
        }
    }

    async fn run_delta_query(&mut self, delta: GraphQLRequest, last_sync: DateTime<Utc>) -> bool {
        info!(hash = %self.hash, %last_sync, "running delta query");
        let mut request = delta;
        request
            .variables
            .insert(LAST_SYNC_VARIABLE.to_string(), Value::from(last_sync.timestamp()));
        let result = self
            .context
            .executor
            .fetch(request, CachePolicy::FetchIgnoringCacheData)
            .await;
        self.handler.delta_query_result(&result);
        match result {
            Ok(_) => {
                self.record_sync_time(Utc::now());
                true
            }
            Err(e) => {
                self.handler.sync_status(SyncStatus::Failed(e.to_string()));
                false
            }
        }
    }

    fn handle_message(&mut self, message: Result<Value, SubscriptionError>, received_at: DateTime<Utc>) {
        match message {
            Ok(payload) => {
                if let Some(queued) = self.messages.offer(payload, received_at) {
                    self.deliver(queued);
                } else {
                    debug!(hash = %self.hash, held = self.messages.len(), "holding subscription message until sync completes");
                }
            }
            Err(SubscriptionError::Terminated) => {
                debug!(hash = %self.hash, "subscription terminated, waiting for resume");
                self.handler.sync_status(SyncStatus::Interrupted);
            }
            Err(e) => {
                warn!(hash = %self.hash, error = %e, "subscription failed");
                self.watcher = None;
                self.handler.subscription_result(&Err(e));
                self.handler.sync_status(SyncStatus::Interrupted);
            }
        }
    }

    fn deliver(&mut self, queued: QueuedMessage<Value>) {
        self.handler.subscription_result(&Ok(queued.message));
        self.record_sync_time(queued.received_at);
    }

    fn record_sync_time(&mut self, time: DateTime<Utc>) {
        let adjusted = time - chrono::Duration::seconds(SYNC_TIME_SKEW_SECS);
        self.strategy.last_sync_time = Some(adjusted);
        let Some(metadata) = &self.context.metadata else {
            return;
        };
        if let Err(e) = metadata.set_last_sync_time(&self.hash, adjusted) {
            warn!(hash = %self.hash, error = %e, "could not persist last sync time");
        }
    }
}

async fn next_lifecycle_event(
    lifecycle: &mut Option<broadcast::Receiver<LifecycleEvent>>,
) -> Result<LifecycleEvent, broadcast::error::RecvError> {
    match lifecycle {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// [`SubscriptionStarter`] over a realtime [`SubscriptionConnection`].
pub struct RealtimeSubscriptionStarter {
    connection: SubscriptionConnection,
}

impl RealtimeSubscriptionStarter {
    pub fn new(connection: SubscriptionConnection) -> Self {
        RealtimeSubscriptionStarter { connection }
    }
}

impl SubscriptionStarter for RealtimeSubscriptionStarter {
    fn subscribe(
        &self,
        request: GraphQLRequest,
        sink: SubscriptionSink,
    ) -> BoxFuture<'_, Result<Box<dyn SubscriptionWatcher>, SubscriptionError>> {
        Box::pin(async move {
            let variables = (!request.variables.is_empty()).then_some(request.variables);
            let (item, mut events) = self.connection.subscribe(request.query, variables);

            loop {
                match events.recv().await {
                    Some(SubscriptionItemEvent::Connection(SubscriptionConnectionState::Connected)) => {
                        break
                    }
                    Some(SubscriptionItemEvent::Connection(SubscriptionConnectionState::Connecting)) => {}
                    Some(SubscriptionItemEvent::Connection(SubscriptionConnectionState::Disconnected)) => {
                        self.connection.unsubscribe(&item);
                        return Err(SubscriptionError::Terminated);
                    }
                    Some(SubscriptionItemEvent::Data(payload)) => {
                        sink.send(Ok(payload));
                    }
                    Some(SubscriptionItemEvent::Failed(e)) => {
                        return Err(SubscriptionError::Connection(e));
                    }
                    None => {
                        return Err(SubscriptionError::Connection(ConnectionProviderError::Connection));
                    }
                }
            }

            let forwarder = tokio::spawn(forward_events(events, sink));
            let watcher: Box<dyn SubscriptionWatcher> = Box::new(RealtimeWatcher {
                connection: self.connection.clone(),
                item,
                forwarder,
                cancelled: false,
            });
            Ok(watcher)
        })
    }
}

async fn forward_events(
    mut events: mpsc::UnboundedReceiver<SubscriptionItemEvent>,
    sink: SubscriptionSink,
) {
    while let Some(event) = events.recv().await {
        let message = match event {
            SubscriptionItemEvent::Data(payload) => Ok(payload),
            SubscriptionItemEvent::Connection(SubscriptionConnectionState::Disconnected) => {
                Err(SubscriptionError::Terminated)
            }
            SubscriptionItemEvent::Connection(_) => continue,
            SubscriptionItemEvent::Failed(e) => {
                sink.send(Err(SubscriptionError::Connection(e)));
                return;
            }
        };
        if !sink.send(message) {
            return;
        }
    }
}

struct RealtimeWatcher {
    connection: SubscriptionConnection,
    item: SubscriptionItem,
    forwarder: JoinHandle<()>,
    cancelled: bool,
}

impl SubscriptionWatcher for RealtimeWatcher {
    fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        self.forwarder.abort();
        self.connection.unsubscribe(&self.item);
    }
}

impl Drop for RealtimeWatcher {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
#[path = "delta_sync_tests.rs"]
mod tests;
