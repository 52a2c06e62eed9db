// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::test_support::MockTransport;
use gqlsync_core::{InMemoryNormalizedCache, NetworkErrorKind};
use serde_json::json;

fn executor(transport: &Arc<MockTransport>) -> (CachingQueryExecutor, Arc<InMemoryNormalizedCache>) {
    let cache = Arc::new(InMemoryNormalizedCache::new());
    let executor = CachingQueryExecutor::new(transport.clone(), cache.clone());
    (executor, cache)
}

#[test]
fn response_decodes_error_type_and_data() {
    let body = json!({
        "data": null,
        "errors": [{
            "message": "The conditional request failed (Service: DynamoDb)",
            "errorType": "DynamoDB:ConditionalCheckFailedException",
            "data": { "version": 3 }
        }]
    });
    let response: GraphQLResponse = serde_json::from_value(body).unwrap();

    let conflict = response.conflict().unwrap();
    assert_eq!(
        conflict.error_type.as_deref(),
        Some("DynamoDB:ConditionalCheckFailedException")
    );
    assert_eq!(conflict.data, Some(json!({ "version": 3 })));
}

#[test]
fn only_the_first_error_is_a_conflict_candidate() {
    let response = GraphQLResponse::default()
        .with_error(GraphQLError::new("Unauthorized"))
        .with_error(GraphQLError::new("The conditional request failed"));
    assert!(response.conflict().is_none());
}

#[tokio::test]
async fn fetch_ignoring_cache_writes_through() {
    let transport = MockTransport::new();
    transport.reply_data(json!({ "posts": [1, 2] }));
    let (executor, _cache) = executor(&transport);
    let request = GraphQLRequest::new("query { posts }");

    let fetched = executor
        .fetch(request.clone(), CachePolicy::FetchIgnoringCacheData)
        .await
        .unwrap();
    assert_eq!(fetched.data, Some(json!({ "posts": [1, 2] })));

    let cached = executor
        .fetch(request, CachePolicy::ReturnCacheDataDontFetch)
        .await
        .unwrap();
    assert_eq!(cached.data, Some(json!({ "posts": [1, 2] })));
    assert_eq!(transport.sent().len(), 1);
}

#[tokio::test]
async fn cache_only_miss_returns_empty_response() {
    let transport = MockTransport::new();
    let (executor, _cache) = executor(&transport);

    let response = executor
        .fetch(GraphQLRequest::new("query { posts }"), CachePolicy::ReturnCacheDataDontFetch)
        .await
        .unwrap();

    assert_eq!(response, GraphQLResponse::default());
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn cache_else_fetch_only_hits_network_on_miss() {
    let transport = MockTransport::new();
    transport.reply_data(json!({ "n": 1 }));
    let (executor, _cache) = executor(&transport);
    let request = GraphQLRequest::new("query { n }");

    for _ in 0..2 {
        let response = executor
            .fetch(request.clone(), CachePolicy::ReturnCacheDataElseFetch)
            .await
            .unwrap();
        assert_eq!(response.data, Some(json!({ "n": 1 })));
    }
    assert_eq!(transport.sent().len(), 1);
}

#[tokio::test]
async fn variables_key_separate_cache_entries() {
    let transport = MockTransport::new();
    transport.reply_data(json!({ "a": true }));
    let (executor, _cache) = executor(&transport);
    let base = GraphQLRequest::new("query Post($id: ID!) { post(id: $id) }");

    executor
        .fetch(
            base.clone().with_variables(json!({ "id": "1" })),
            CachePolicy::FetchIgnoringCacheData,
        )
        .await
        .unwrap();
    let other = executor
        .fetch(
            base.with_variables(json!({ "id": "2" })),
            CachePolicy::ReturnCacheDataDontFetch,
        )
        .await
        .unwrap();

    assert!(other.data.is_none());
}

#[tokio::test]
async fn transport_errors_pass_through_without_caching() {
    let transport = MockTransport::new();
    transport.reply(Err(RequestError::Network(NetworkErrorKind::NotConnectedToInternet)));
    let (executor, cache) = executor(&transport);

    let err = executor
        .fetch(GraphQLRequest::new("query { x }"), CachePolicy::FetchIgnoringCacheData)
        .await
        .unwrap_err();

    assert!(matches!(err, RequestError::Network(_)));
    let root = cache.load_records(&[QUERY_ROOT.to_string()]).unwrap();
    assert!(root[0].as_ref().unwrap().fields.is_empty());
}

#[tokio::test]
async fn repeated_delta_queries_share_one_cache_entry() {
    let transport = MockTransport::new();
    let (executor, cache) = executor(&transport);
    let delta = GraphQLRequest::new("query Delta($lastSync: AWSTimestamp) { delta(lastSync: $lastSync) }");

    for n in 0..5 {
        transport.reply_data(json!({ "delta": n }));
        executor
            .fetch(
                delta.clone().with_variables(json!({ "lastSync": 1_700_000_000 + n })),
                CachePolicy::FetchIgnoringCacheData,
            )
            .await
            .unwrap();
    }

    let root = cache.load_records(&[QUERY_ROOT.to_string()]).unwrap();
    assert_eq!(root[0].as_ref().unwrap().fields.len(), 1);

    let cached = executor
        .fetch(
            delta.with_variables(json!({ "lastSync": 1 })),
            CachePolicy::ReturnCacheDataDontFetch,
        )
        .await
        .unwrap();
    assert_eq!(cached.data, Some(json!({ "delta": 4 })));
}

#[tokio::test]
async fn delta_results_do_not_replace_the_base_entry() {
    let transport = MockTransport::new();
    let (executor, _cache) = executor(&transport);
    let base = GraphQLRequest::new("query { posts }");
    let delta = GraphQLRequest::new("query Delta($lastSync: AWSTimestamp) { delta(lastSync: $lastSync) }");

    transport.reply_data(json!({ "posts": [1] }));
    executor.fetch(base.clone(), CachePolicy::FetchIgnoringCacheData).await.unwrap();
    transport.reply_data(json!({ "delta": [2] }));
    executor
        .fetch(delta.with_variables(json!({ "lastSync": 5 })), CachePolicy::FetchIgnoringCacheData)
        .await
        .unwrap();

    let cached = executor.fetch(base, CachePolicy::ReturnCacheDataDontFetch).await.unwrap();
    assert_eq!(cached.data, Some(json!({ "posts": [1] })));
}
