// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted network collaborators for unit tests.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use gqlsync_core::{BinaryObject, BoxFuture, GraphQLRequest, RequestError};
use serde_json::json;

use crate::network::{GraphQLResponse, NetworkTransport, ObjectUploader};

type Reply = Result<GraphQLResponse, RequestError>;

/// Transport that answers from a script, falling back to `{"data": {}}`.
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<VecDeque<Reply>>,
    sent: Mutex<Vec<GraphQLRequest>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, reply: Reply) -> &Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn reply_data(&self, data: serde_json::Value) -> &Self {
        self.reply(Ok(GraphQLResponse::from_data(data)))
    }

    pub fn sent(&self) -> Vec<GraphQLRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_queries(&self) -> Vec<String> {
        self.sent().into_iter().map(|r| r.query).collect()
    }
}

impl NetworkTransport for MockTransport {
    fn send(&self, request: GraphQLRequest) -> BoxFuture<'_, Reply> {
        self.sent.lock().unwrap().push(request);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(GraphQLResponse::from_data(json!({}))));
        Box::pin(async move { reply })
    }
}

/// Uploader that answers from a script, succeeding once it runs dry.
#[derive(Default)]
pub struct MockUploader {
    replies: Mutex<VecDeque<Result<(), RequestError>>>,
    uploads: Mutex<Vec<BinaryObject>>,
}

impl MockUploader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, reply: Result<(), RequestError>) -> &Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn uploads(&self) -> Vec<BinaryObject> {
        self.uploads.lock().unwrap().clone()
    }
}

impl ObjectUploader for MockUploader {
    fn upload(&self, object: BinaryObject) -> BoxFuture<'_, Result<(), RequestError>> {
        self.uploads.lock().unwrap().push(object);
        let reply = self.replies.lock().unwrap().pop_front().unwrap_or(Ok(()));
        Box::pin(async move { reply })
    }
}

/// Yield to the runtime until `condition` holds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    assert!(condition(), "condition not reached");
}

pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// WebSocket double that plays a cooperative realtime server: it acks the
/// connection and every `start`.
#[derive(Default)]
pub struct AckingWebSocket {
    events: Mutex<Option<gqlsync_realtime::transport::WebSocketEventSender>>,
    writes: Mutex<Vec<serde_json::Value>>,
}

impl AckingWebSocket {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn written(&self) -> Vec<serde_json::Value> {
        self.writes.lock().unwrap().clone()
    }

    pub fn started_id(&self) -> Option<String> {
        self.written()
            .iter()
            .find(|w| w["type"] == "start")
            .and_then(|w| w["id"].as_str().map(str::to_string))
    }

    pub fn server_sends(&self, response: gqlsync_core::RealtimeResponse) {
        self.send(gqlsync_realtime::WebSocketEvent::Text(response.to_json().unwrap()));
    }

    fn send(&self, event: gqlsync_realtime::WebSocketEvent) {
        if let Some(events) = self.events.lock().unwrap().as_ref() {
            let _ = events.send(event);
        }
    }
}

impl gqlsync_realtime::WebSocketProvider for AckingWebSocket {
    fn connect(
        &self,
        _url: url::Url,
        _protocols: Vec<String>,
        events: gqlsync_realtime::transport::WebSocketEventSender,
    ) {
        *self.events.lock().unwrap() = Some(events);
        self.send(gqlsync_realtime::WebSocketEvent::Connected);
    }

    fn write(&self, message: String) {
        use gqlsync_core::protocol::ResponseType;

        let frame: serde_json::Value = serde_json::from_str(&message).unwrap();
        self.writes.lock().unwrap().push(frame.clone());
        match frame["type"].as_str() {
            Some("connection_init") => {
                self.server_sends(gqlsync_core::RealtimeResponse::new(ResponseType::ConnectionAck))
            }
            Some("start") => {
                let id = frame["id"].as_str().unwrap_or_default();
                self.server_sends(gqlsync_core::RealtimeResponse::new(ResponseType::StartAck).with_id(id))
            }
            _ => {}
        }
    }

    fn disconnect(&self) {
        self.events.lock().unwrap().take();
    }

    fn is_connected(&self) -> bool {
        self.events.lock().unwrap().is_some()
    }
}
