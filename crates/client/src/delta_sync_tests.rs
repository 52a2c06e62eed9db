// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::test_support::{eventually, settle, AckingWebSocket};
use gqlsync_core::protocol::ResponseType;
use gqlsync_core::{Database, NetworkErrorKind, RealtimeResponse, SyncMetadataStore};
use gqlsync_realtime::{ConnectionProvider, Interceptors};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::oneshot;

type QueryResult = Result<GraphQLResponse, RequestError>;

#[derive(Debug, Clone, PartialEq)]
enum Seen {
    Base(QueryResult),
    Delta(QueryResult),
    Subscription(Result<Value, SubscriptionError>),
    Status(SyncStatus),
}

#[derive(Default)]
struct RecordingHandler {
    seen: Mutex<Vec<Seen>>,
}

impl RecordingHandler {
    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    fn count(&self, matches: impl Fn(&Seen) -> bool) -> usize {
        self.seen().iter().filter(|s| matches(s)).count()
    }

    fn active_count(&self) -> usize {
        self.count(|s| *s == Seen::Status(SyncStatus::Active))
    }
}

impl DeltaSyncHandler for RecordingHandler {
    fn base_query_result(&self, result: &QueryResult) {
        self.seen.lock().unwrap().push(Seen::Base(result.clone()));
    }

    fn delta_query_result(&self, result: &QueryResult) {
        self.seen.lock().unwrap().push(Seen::Delta(result.clone()));
    }

    fn subscription_result(&self, result: &Result<Value, SubscriptionError>) {
        self.seen.lock().unwrap().push(Seen::Subscription(result.clone()));
    }

    fn sync_status(&self, status: SyncStatus) {
        self.seen.lock().unwrap().push(Seen::Status(status));
    }
}

/// Executor that misses the cache and answers network fetches from a script.
#[derive(Default)]
struct MockExecutor {
    replies: Mutex<VecDeque<QueryResult>>,
    calls: Mutex<Vec<(GraphQLRequest, CachePolicy)>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl MockExecutor {
    fn reply(&self, reply: QueryResult) -> &Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    /// Hold the next network fetch until the returned sender fires.
    fn gate(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock().unwrap() = Some(rx);
        tx
    }

    fn network_calls(&self) -> Vec<GraphQLRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, policy)| *policy == CachePolicy::FetchIgnoringCacheData)
            .map(|(request, _)| request.clone())
            .collect()
    }
}

impl QueryExecutor for MockExecutor {
    fn fetch(&self, request: GraphQLRequest, policy: CachePolicy) -> BoxFuture<'_, QueryResult> {
        self.calls.lock().unwrap().push((request, policy));
        if policy == CachePolicy::ReturnCacheDataDontFetch {
            return Box::pin(async { Ok(GraphQLResponse::default()) });
        }
        let gate = self.gate.lock().unwrap().take();
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(GraphQLResponse::from_data(json!({ "items": [] }))));
        Box::pin(async move {
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            reply
        })
    }
}

struct MockWatcher {
    cancelled: Arc<AtomicUsize>,
}

impl SubscriptionWatcher for MockWatcher {
    fn cancel(&mut self) {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct MockStarter {
    sinks: Mutex<Vec<SubscriptionSink>>,
    failures: Mutex<VecDeque<SubscriptionError>>,
    cancelled: Arc<AtomicUsize>,
}

impl MockStarter {
    fn subscribe_count(&self) -> usize {
        self.sinks.lock().unwrap().len()
    }

    fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn push(&self, message: Result<Value, SubscriptionError>) {
        assert!(self.sinks.lock().unwrap().last().unwrap().send(message));
    }
}

impl SubscriptionStarter for MockStarter {
    fn subscribe(
        &self,
        _request: GraphQLRequest,
        sink: SubscriptionSink,
    ) -> BoxFuture<'_, Result<Box<dyn SubscriptionWatcher>, SubscriptionError>> {
        let failure = self.failures.lock().unwrap().pop_front();
        if failure.is_none() {
            self.sinks.lock().unwrap().push(sink);
        }
        let cancelled = self.cancelled.clone();
        Box::pin(async move {
            match failure {
                Some(e) => Err(e),
                None => {
                    let watcher: Box<dyn SubscriptionWatcher> = Box::new(MockWatcher { cancelled });
                    Ok(watcher)
                }
            }
        })
    }
}

struct Harness {
    executor: Arc<MockExecutor>,
    starter: Arc<MockStarter>,
    db: Arc<Database>,
    handler: Arc<RecordingHandler>,
    reachability: Arc<ReachabilityNotifier>,
    lifecycle: LifecycleNotifier,
}

impl Harness {
    fn new() -> Self {
        Harness {
            executor: Arc::new(MockExecutor::default()),
            starter: Arc::new(MockStarter::default()),
            db: Arc::new(Database::open_in_memory().unwrap()),
            handler: Arc::new(RecordingHandler::default()),
            reachability: Arc::new(ReachabilityNotifier::new(true)),
            lifecycle: LifecycleNotifier::new(),
        }
    }

    fn start(&self, operations: DeltaSyncOperations, interval_secs: u64) -> DeltaSyncHandle {
        let context = DeltaSyncContext::new(self.executor.clone(), self.reachability.clone())
            .with_subscriptions(self.starter.clone())
            .with_metadata(self.db.clone())
            .with_lifecycle(self.lifecycle.clone());
        DeltaSyncCoordinator::start(
            context,
            operations,
            self.handler.clone(),
            SyncConfiguration::new(interval_secs),
        )
    }
}

fn base() -> GraphQLRequest {
    GraphQLRequest::new("query ListPosts { listPosts { id } }")
}

fn delta() -> GraphQLRequest {
    GraphQLRequest::new("query Delta($lastSync: AWSTimestamp) { listPostsDelta(lastSync: $lastSync) { id } }")
}

fn subscription() -> GraphQLRequest {
    GraphQLRequest::new("subscription OnPost { onPost { id } }")
}

fn full_operations() -> DeltaSyncOperations {
    DeltaSyncOperations::new(base())
        .with_delta_query(delta())
        .with_subscription(subscription())
}

#[tokio::test(start_paused = true)]
async fn initial_sync_reads_cache_then_runs_base_query() {
    let h = Harness::new();
    h.executor.reply(Ok(GraphQLResponse::from_data(json!({ "listPosts": [] }))));
    let before = Utc::now();
    let operations = DeltaSyncOperations::new(base());
    let hash = operations.operation_hash();

    let handle = h.start(operations, 3600);
    eventually(|| h.handler.active_count() == 1).await;

    assert_eq!(
        h.handler.seen(),
        vec![
            Seen::Base(Ok(GraphQLResponse::default())),
            Seen::Base(Ok(GraphQLResponse::from_data(json!({ "listPosts": [] })))),
            Seen::Status(SyncStatus::Active),
        ]
    );
    let last_sync = h.db.last_sync_time(&hash).unwrap().unwrap();
    assert!(last_sync <= before);
    assert!(last_sync >= before - chrono::Duration::seconds(3));
    assert_eq!(handle.operation_hash(), hash);
}

async fn first_network_query(last_sync_age_secs: Option<i64>, operations: DeltaSyncOperations) -> (GraphQLRequest, Harness) {
    let h = Harness::new();
    if let Some(age) = last_sync_age_secs {
        h.db.set_last_sync_time(&operations.operation_hash(), Utc::now() - chrono::Duration::seconds(age))
            .unwrap();
    }
    let _handle = h.start(operations, 10);
    eventually(|| h.handler.active_count() == 1).await;
    let request = h.executor.network_calls()[0].clone();
    (request, h)
}

#[tokio::test(start_paused = true)]
async fn recent_sync_runs_delta_query_with_last_sync() {
    let operations = full_operations();
    let (request, h) = first_network_query(Some(5), operations.clone()).await;

    assert_eq!(request.query, delta().query);
    let last_sync = request.variables[LAST_SYNC_VARIABLE].as_i64().unwrap();
    assert!((Utc::now().timestamp() - 6..=Utc::now().timestamp() - 4).contains(&last_sync));
    assert_eq!(h.handler.count(|s| matches!(s, Seen::Delta(Ok(_)))), 1);
}

#[tokio::test(start_paused = true)]
async fn stale_sync_runs_base_query() {
    let (request, _h) = first_network_query(Some(15), full_operations()).await;
    assert_eq!(request.query, base().query);
}

#[tokio::test(start_paused = true)]
async fn recent_sync_without_delta_query_runs_base_query() {
    let operations = DeltaSyncOperations::new(base()).with_subscription(subscription());
    let (request, _h) = first_network_query(Some(5), operations).await;
    assert_eq!(request.query, base().query);
}

#[tokio::test(start_paused = true)]
async fn failed_sync_backs_off_then_retries() {
    let h = Harness::new();
    h.executor
        .reply(Err(RequestError::Network(NetworkErrorKind::TimedOut)));
    let _handle = h.start(DeltaSyncOperations::new(base()), 3600);

    eventually(|| h.handler.count(|s| matches!(s, Seen::Status(SyncStatus::Failed(_)))) == 1).await;
    assert_eq!(h.handler.active_count(), 0);

    tokio::time::sleep(Duration::from_secs(1)).await;
    eventually(|| h.handler.active_count() == 1).await;
    assert_eq!(h.executor.network_calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn successful_sync_repeats_after_refresh_interval() {
    let h = Harness::new();
    let _handle = h.start(DeltaSyncOperations::new(base()), 60);
    eventually(|| h.handler.active_count() == 1).await;

    tokio::time::sleep(Duration::from_secs(59)).await;
    settle().await;
    assert_eq!(h.executor.network_calls().len(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    eventually(|| h.handler.active_count() == 2).await;
    assert_eq!(h.executor.network_calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn subscription_data_is_held_until_sync_completes() {
    let h = Harness::new();
    let release = h.executor.gate();
    let operations = full_operations();
    let hash = operations.operation_hash();
    let _handle = h.start(operations, 3600);

    eventually(|| h.executor.network_calls().len() == 1).await;
    assert_eq!(h.starter.subscribe_count(), 1);
    h.starter.push(Ok(json!({ "n": 1 })));
    h.starter.push(Ok(json!({ "n": 2 })));
    settle().await;
    assert_eq!(h.handler.count(|s| matches!(s, Seen::Subscription(_))), 0);

    release.send(()).unwrap();
    eventually(|| h.handler.active_count() == 1).await;

    let seen = h.handler.seen();
    assert_eq!(
        &seen[2..],
        &[
            Seen::Subscription(Ok(json!({ "n": 1 }))),
            Seen::Subscription(Ok(json!({ "n": 2 }))),
            Seen::Status(SyncStatus::Active),
        ]
    );

    let synced = h.db.last_sync_time(&hash).unwrap().unwrap();
    h.starter.push(Ok(json!({ "n": 3 })));
    eventually(|| h.handler.count(|s| matches!(s, Seen::Subscription(_))) == 3).await;
    assert!(h.db.last_sync_time(&hash).unwrap().unwrap() >= synced);
}

#[tokio::test(start_paused = true)]
async fn held_messages_record_their_arrival_time() {
    let h = Harness::new();
    let release = h.executor.gate();
    let operations = full_operations();
    let hash = operations.operation_hash();
    let _handle = h.start(operations, 3600);

    eventually(|| h.executor.network_calls().len() == 1).await;
    h.starter.push(Ok(json!({ "n": 1 })));
    let pushed_by = Utc::now();
    std::thread::sleep(std::time::Duration::from_millis(50));

    release.send(()).unwrap();
    eventually(|| h.handler.active_count() == 1).await;

    let synced = h.db.last_sync_time(&hash).unwrap().unwrap();
    assert!(synced + chrono::Duration::seconds(SYNC_TIME_SKEW_SECS) <= pushed_by);
}

#[tokio::test(start_paused = true)]
async fn foreground_resubscribes_and_releases_previous_watcher() {
    let h = Harness::new();
    let _handle = h.start(full_operations(), 3600);
    eventually(|| h.handler.active_count() == 1).await;

    h.lifecycle.notify(LifecycleEvent::DidEnterBackground);
    settle().await;
    assert_eq!(h.starter.subscribe_count(), 1);

    h.lifecycle.notify(LifecycleEvent::WillEnterForeground);
    eventually(|| h.handler.active_count() == 2).await;
    assert_eq!(h.starter.subscribe_count(), 2);
    assert_eq!(h.starter.cancelled(), 1);
}

#[tokio::test(start_paused = true)]
async fn reachability_restore_triggers_sync() {
    let h = Harness::new();
    let _handle = h.start(DeltaSyncOperations::new(base()), 3600);
    eventually(|| h.handler.active_count() == 1).await;

    h.reachability.set_reachable(false);
    settle().await;
    assert_eq!(h.executor.network_calls().len(), 1);

    h.reachability.set_reachable(true);
    eventually(|| h.handler.active_count() == 2).await;
    assert_eq!(h.executor.network_calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn terminated_subscription_is_not_reported_as_a_result() {
    let h = Harness::new();
    let _handle = h.start(full_operations(), 3600);
    eventually(|| h.handler.active_count() == 1).await;

    h.starter.push(Err(SubscriptionError::Terminated));
    eventually(|| h.handler.count(|s| *s == Seen::Status(SyncStatus::Interrupted)) == 1).await;

    assert_eq!(h.handler.count(|s| matches!(s, Seen::Subscription(_))), 0);
}

#[tokio::test(start_paused = true)]
async fn subscription_start_failure_skips_queries_and_retries() {
    let h = Harness::new();
    h.starter
        .failures
        .lock()
        .unwrap()
        .push_back(SubscriptionError::Connection(ConnectionProviderError::Connection));
    let _handle = h.start(full_operations(), 3600);

    eventually(|| h.handler.count(|s| matches!(s, Seen::Subscription(Err(_)))) == 1).await;
    assert!(h.executor.network_calls().is_empty());

    tokio::time::sleep(Duration::from_secs(1)).await;
    eventually(|| h.handler.active_count() == 1).await;
    assert_eq!(h.starter.subscribe_count(), 1);
    assert_eq!(h.executor.network_calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_sync_and_releases_subscription() {
    let h = Harness::new();
    let handle = h.start(full_operations(), 60);
    eventually(|| h.handler.active_count() == 1).await;

    handle.cancel();
    eventually(|| handle.is_finished()).await;

    assert_eq!(h.handler.seen().last(), Some(&Seen::Status(SyncStatus::Cancelled)));
    assert_eq!(h.starter.cancelled(), 1);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.executor.network_calls().len(), 1);
}

#[test]
fn hash_prefers_subscription_then_delta_then_base() {
    let base_only = DeltaSyncOperations::new(base());
    let with_delta = base_only.clone().with_delta_query(delta());
    let with_all = with_delta.clone().with_subscription(subscription());

    assert_eq!(base_only.operation_hash(), operation_hash(&base(), None, None));
    assert_eq!(with_delta.operation_hash(), operation_hash(&delta(), None, None));
    assert_eq!(with_all.operation_hash(), operation_hash(&subscription(), None, None));
}

#[tokio::test]
async fn realtime_starter_waits_for_ack_and_forwards_data() {
    let socket = AckingWebSocket::new();
    let provider = ConnectionProvider::new(
        url::Url::parse("wss://example.com/graphql/realtime").unwrap(),
        socket.clone(),
        Interceptors::new(),
    );
    let starter = RealtimeSubscriptionStarter::new(SubscriptionConnection::new(&provider));
    let (sink, mut messages) = SubscriptionSink::channel();

    let mut watcher = starter.subscribe(subscription(), sink).await.unwrap();
    let id = socket.started_id().unwrap();

    socket.server_sends(
        RealtimeResponse::new(ResponseType::Data)
            .with_id(id.clone())
            .with_payload(json!({ "data": { "onPost": { "id": "p1" } } })),
    );
    let (message, _) = messages.recv().await.unwrap();
    assert_eq!(message.unwrap()["data"]["onPost"]["id"], "p1");

    socket.server_sends(RealtimeResponse::new(ResponseType::Complete).with_id(id.clone()));
    assert_eq!(messages.recv().await.unwrap().0, Err(SubscriptionError::Terminated));

    watcher.cancel();
    eventually(|| socket.written().iter().any(|w| w["type"] == "stop" && w["id"] == id.as_str())).await;
}
