// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::error::{HttpResponseInfo, NetworkErrorKind};
use yare::parameterized;

#[parameterized(
    first = { 1, 200 },
    second = { 2, 400 },
    fifth = { 5, 3_200 },
    eleventh = { 11, 204_800 },
    twelfth_capped = { 12, MAX_RETRY_WAIT_MILLIS },
    huge_capped = { 1_000, MAX_RETRY_WAIT_MILLIS },
)]
fn exponential_delay_without_jitter(attempt: u32, expected: u64) {
    assert_eq!(
        retry_delay_millis_with_jitter(attempt, RetryStrategy::Exponential, 0),
        expected
    );
}

#[test]
fn exponential_delay_is_monotonic() {
    let mut previous = 0;
    for attempt in 0..64 {
        let delay = retry_delay_millis_with_jitter(attempt, RetryStrategy::Exponential, 0);
        assert!(delay >= previous, "attempt {attempt} decreased");
        previous = delay;
    }
}

#[test]
fn random_jitter_stays_in_range() {
    for attempt in 1..8 {
        let base = retry_delay_millis_with_jitter(attempt, RetryStrategy::Exponential, 0);
        let delay = retry_delay_millis(attempt, RetryStrategy::Exponential);
        assert!(delay >= base && delay < base + JITTER_MILLIS);
    }
    for _ in 0..20 {
        let delay = retry_delay_millis(3, RetryStrategy::Aggressive);
        assert!((1000..1100).contains(&delay));
    }
}

#[test]
fn aggressive_stops_after_thirty_attempts() {
    let mut policy = RetryPolicy::new(RetryStrategy::Aggressive);
    for _ in 0..MAX_AGGRESSIVE_ATTEMPTS {
        assert!(policy
            .should_retry_connection(&ConnectionProviderError::Connection)
            .should_retry);
    }
    for _ in 0..5 {
        assert!(
            !policy
                .should_retry_connection(&ConnectionProviderError::Connection)
                .should_retry
        );
        let err = RequestError::RequestFailed {
            message: "throttled".into(),
            response: Some(HttpResponseInfo::new(429).with_header("Retry-After", "1")),
            cause: None,
        };
        assert!(!policy.should_retry_request(&err).should_retry);
    }
}

#[test]
fn exponential_connection_retries_are_unbounded() {
    let mut policy = RetryPolicy::new(RetryStrategy::Exponential);
    for _ in 0..100 {
        let advice = policy.should_retry_connection(&ConnectionProviderError::Connection);
        assert!(advice.should_retry);
        assert!(advice.retry_interval.unwrap() <= Duration::from_millis(MAX_RETRY_WAIT_MILLIS));
    }
}

#[parameterized(
    too_many_requests = { 429 },
    internal = { 500 },
    unavailable = { 503 },
    edge = { 599 },
)]
fn retry_after_overrides_backoff(status: u16) {
    for strategy in [RetryStrategy::Exponential, RetryStrategy::Aggressive] {
        let mut policy = RetryPolicy::new(strategy);
        let err = RequestError::RequestFailed {
            message: "failed".into(),
            response: Some(HttpResponseInfo::new(status).with_header("Retry-After", "42")),
            cause: None,
        };
        let advice = policy.should_retry_request(&err);
        assert_eq!(advice, RetryAdvice::retry_after(Duration::from_secs(42)));
    }
}

#[parameterized(
    throttled = { 429, true },
    server_error = { 502, true },
    bad_request = { 400, false },
    forbidden = { 403, false },
    ok = { 200, false },
)]
fn http_status_retryability(status: u16, expected: bool) {
    let mut policy = RetryPolicy::default();
    let err = RequestError::NoData {
        response: Some(HttpResponseInfo::new(status)),
    };
    assert_eq!(policy.should_retry_request(&err).should_retry, expected);
}

#[parameterized(
    network = { RequestError::Network(NetworkErrorKind::TimedOut) },
    auth = { RequestError::Authentication { message: "expired".into(), cause: None } },
    other = { RequestError::Other("boom".into()) },
    no_response = { RequestError::RequestFailed { message: "x".into(), response: None, cause: None } },
)]
fn errors_without_response_are_not_retried(err: RequestError) {
    let mut policy = RetryPolicy::default();
    assert_eq!(policy.should_retry_request(&err), RetryAdvice::give_up());
}

#[parameterized(
    connection = { ConnectionProviderError::Connection, true },
    limit = { ConnectionProviderError::LimitExceeded { id: None }, true },
    unauthorized = { ConnectionProviderError::Unauthorized, false },
    other = { ConnectionProviderError::Other("x".into()), false },
    subscription = {
        ConnectionProviderError::Subscription { id: "a".into(), payload: serde_json::Value::Null },
        false
    },
)]
fn connection_error_retryability(err: ConnectionProviderError, expected: bool) {
    let mut policy = RetryPolicy::default();
    assert_eq!(policy.should_retry_connection(&err).should_retry, expected);
}

#[test]
fn reset_restarts_attempt_count() {
    let mut policy = RetryPolicy::new(RetryStrategy::Exponential);
    policy.should_retry_connection(&ConnectionProviderError::Connection);
    policy.should_retry_connection(&ConnectionProviderError::Connection);
    assert_eq!(policy.attempt(), 2);
    policy.reset();
    assert_eq!(policy.attempt(), 0);
}

#[test]
fn strategy_parses_case_insensitively() {
    assert_eq!(
        "Aggressive".parse::<RetryStrategy>().unwrap(),
        RetryStrategy::Aggressive
    );
    assert!("linear".parse::<RetryStrategy>().is_err());
}
