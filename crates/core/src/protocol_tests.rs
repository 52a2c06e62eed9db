// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::json;
use yare::parameterized;

#[test]
fn connection_init_serializes_type_only() {
    let json = RealtimeMessage::connection_init().to_json().unwrap();
    assert_eq!(json, r#"{"type":"connection_init"}"#);
}

#[test]
fn start_message_embeds_query_and_variables_as_string() {
    let variables = json!({ "owner": "alice" });
    let message =
        RealtimeMessage::start("sub-1", "subscription { onPost }", variables.as_object()).unwrap();
    let value: Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();

    assert_eq!(value["id"], "sub-1");
    assert_eq!(value["type"], "start");
    let data: Value = serde_json::from_str(value["payload"]["data"].as_str().unwrap()).unwrap();
    assert_eq!(data["query"], "subscription { onPost }");
    assert_eq!(data["variables"]["owner"], "alice");
    assert!(value["payload"].get("extensions").is_none());
}

#[test]
fn start_message_without_variables_omits_them() {
    let message = RealtimeMessage::start("sub-1", "subscription { a }", None).unwrap();
    let data: Value =
        serde_json::from_str(message.payload.unwrap().data.as_deref().unwrap()).unwrap();
    assert!(data.get("variables").is_none());
}

#[test]
fn authorization_lands_in_extensions() {
    let mut message = RealtimeMessage::start("sub-1", "subscription { a }", None).unwrap();
    let mut header = AuthHeader::new();
    header.insert("host".into(), "example.com".into());
    header.insert("x-api-key".into(), "da2-key".into());
    if let Some(payload) = message.payload.as_mut() {
        payload.set_authorization(header);
    }

    let value: Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();
    assert_eq!(
        value["payload"]["extensions"]["authorization"],
        json!({ "host": "example.com", "x-api-key": "da2-key" })
    );
}

#[test]
fn stop_message() {
    let json = RealtimeMessage::stop("sub-9").to_json().unwrap();
    assert_eq!(json, r#"{"id":"sub-9","type":"stop"}"#);
}

#[parameterized(
    ack = { r#"{"type":"connection_ack"}"#, ResponseType::ConnectionAck },
    start_ack = { r#"{"id":"a","type":"start_ack"}"#, ResponseType::StartAck },
    complete = { r#"{"id":"a","type":"complete"}"#, ResponseType::Complete },
    keepalive = { r#"{"type":"ka"}"#, ResponseType::KeepAlive },
    data = { r#"{"id":"a","type":"data","payload":{"data":{}}}"#, ResponseType::Data },
    error = { r#"{"id":"a","type":"error","payload":{}}"#, ResponseType::Error },
    connection_error = { r#"{"type":"connection_error"}"#, ResponseType::ConnectionError },
)]
fn response_types_decode(json: &str, expected: ResponseType) {
    assert_eq!(RealtimeResponse::from_json(json).unwrap().response_type, expected);
}

#[test]
fn unknown_response_type_fails_to_decode() {
    assert!(RealtimeResponse::from_json(r#"{"type":"bogus"}"#).is_err());
}

#[test]
fn connection_timeout_from_ack() {
    let response = RealtimeResponse::new(ResponseType::ConnectionAck)
        .with_payload(json!({ "connectionTimeoutMs": 300000 }));
    assert_eq!(
        response.connection_timeout(),
        Some(Duration::from_secs(300))
    );
    assert_eq!(
        RealtimeResponse::new(ResponseType::ConnectionAck).connection_timeout(),
        None
    );
}

#[parameterized(
    start_ack = { ResponseType::StartAck, Some(SubscriptionResponseKind::StartAck) },
    complete = { ResponseType::Complete, Some(SubscriptionResponseKind::Complete) },
    data = { ResponseType::Data, Some(SubscriptionResponseKind::Data) },
    keepalive = { ResponseType::KeepAlive, None },
    ack = { ResponseType::ConnectionAck, None },
)]
fn subscription_response_kinds(response_type: ResponseType, expected: Option<SubscriptionResponseKind>) {
    let response = RealtimeResponse::new(response_type).with_id("a");
    assert_eq!(response.to_subscription_response().map(|r| r.kind), expected);
}

#[test]
fn error_while_connecting_is_connection_error() {
    let response = RealtimeResponse::new(ResponseType::Error).with_id("a");
    assert_eq!(
        response.to_connection_provider_error(true),
        ConnectionProviderError::Connection
    );
}

#[test]
fn max_subscriptions_maps_to_limit_exceeded() {
    let response = RealtimeResponse::new(ResponseType::Error)
        .with_id("a")
        .with_payload(json!({ "errorType": "MaxSubscriptionsReachedException" }));
    assert_eq!(
        response.to_connection_provider_error(false),
        ConnectionProviderError::LimitExceeded { id: Some("a".into()) }
    );
}

#[test]
fn limit_exceeded_error_object_maps_to_limit_exceeded() {
    let response = RealtimeResponse::new(ResponseType::Error)
        .with_payload(json!({ "errors": { "errorType": "LimitExceededError" } }));
    assert_eq!(
        response.to_connection_provider_error(false),
        ConnectionProviderError::LimitExceeded { id: None }
    );
}

#[test]
fn unauthorized_takes_precedence() {
    let response = RealtimeResponse::new(ResponseType::Error)
        .with_id("a")
        .with_payload(json!({ "errors": [{ "errorType": "UnauthorizedException" }] }));
    assert_eq!(
        response.to_connection_provider_error(true),
        ConnectionProviderError::Unauthorized
    );
}

#[test]
fn error_with_id_is_subscription_error() {
    let payload = json!({ "errors": [{ "message": "bad filter" }] });
    let response = RealtimeResponse::new(ResponseType::Error)
        .with_id("a")
        .with_payload(payload.clone());
    assert_eq!(
        response.to_connection_provider_error(false),
        ConnectionProviderError::Subscription {
            id: "a".into(),
            payload
        }
    );
}

#[test]
fn error_without_id_is_other() {
    let response = RealtimeResponse::new(ResponseType::Error);
    assert!(matches!(
        response.to_connection_provider_error(false),
        ConnectionProviderError::Other(_)
    ));
}
