// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use gqlsync_core::protocol::RealtimeResponse;
use serde_json::Value;
use url::Url;

use crate::transport::{WebSocketEvent, WebSocketEventSender, WebSocketProvider};

#[derive(Default)]
struct MockState {
    connects: Vec<(Url, Vec<String>)>,
    writes: Vec<String>,
    disconnects: usize,
    events: Option<WebSocketEventSender>,
}

/// WebSocket double that records calls and lets tests play the server.
#[derive(Default)]
pub struct MockWebSocket {
    state: Mutex<MockState>,
}

impl MockWebSocket {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().unwrap().connects.len()
    }

    pub fn last_connect(&self) -> Option<(Url, Vec<String>)> {
        self.state.lock().unwrap().connects.last().cloned()
    }

    pub fn disconnect_count(&self) -> usize {
        self.state.lock().unwrap().disconnects
    }

    /// Written frames decoded as JSON.
    pub fn written(&self) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .writes
            .iter()
            .map(|w| serde_json::from_str(w).unwrap())
            .collect()
    }

    /// Types of written frames, in order.
    pub fn written_types(&self) -> Vec<String> {
        self.written()
            .iter()
            .map(|w| w["type"].as_str().unwrap().to_string())
            .collect()
    }

    pub fn emit(&self, event: WebSocketEvent) {
        let events = self.state.lock().unwrap().events.clone();
        events.unwrap().send(event).unwrap();
    }

    pub fn server_sends(&self, response: RealtimeResponse) {
        self.emit(WebSocketEvent::Text(response.to_json().unwrap()));
    }
}

impl WebSocketProvider for MockWebSocket {
    fn connect(&self, url: Url, protocols: Vec<String>, events: WebSocketEventSender) {
        let mut state = self.state.lock().unwrap();
        state.connects.push((url, protocols));
        state.events = Some(events);
    }

    fn write(&self, message: String) {
        self.state.lock().unwrap().writes.push(message);
    }

    fn disconnect(&self) {
        self.state.lock().unwrap().disconnects += 1;
    }

    fn is_connected(&self) -> bool {
        self.state.lock().unwrap().events.is_some()
    }
}

/// Yield to spawned tasks until `check` holds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if check() {
            return;
        }
        tokio::task::yield_now().await;
    }
    assert!(check(), "condition not reached");
}

/// Give spawned tasks a chance to drain their queues.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
