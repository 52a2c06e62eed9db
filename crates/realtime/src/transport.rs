// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket transport abstraction.
//!
//! Providers never talk to a socket directly; they drive a
//! [`WebSocketProvider`] and receive [`WebSocketEvent`]s on a channel. This
//! keeps the connection state machine testable with a mock socket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Events reported by a socket to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebSocketEvent {
    Connected,
    /// The socket closed; carries the error text when it failed.
    Disconnected(Option<String>),
    Text(String),
}

/// Channel on which a socket reports its events.
pub type WebSocketEventSender = mpsc::UnboundedSender<WebSocketEvent>;

/// A WebSocket client driven by a connection provider.
pub trait WebSocketProvider: Send + Sync {
    /// Open a connection, reporting progress on `events`.
    ///
    /// Any previous connection is dropped first.
    fn connect(&self, url: Url, protocols: Vec<String>, events: WebSocketEventSender);

    /// Queue a text frame.
    fn write(&self, message: String);

    fn disconnect(&self);

    fn is_connected(&self) -> bool;
}

/// [`WebSocketProvider`] backed by tokio-tungstenite.
#[derive(Default)]
pub struct TungsteniteWebSocket {
    active: Mutex<Option<ActiveSocket>>,
}

struct ActiveSocket {
    outgoing: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
    connected: Arc<AtomicBool>,
}

impl TungsteniteWebSocket {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WebSocketProvider for TungsteniteWebSocket {
    fn connect(&self, url: Url, protocols: Vec<String>, events: WebSocketEventSender) {
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let connected = Arc::new(AtomicBool::new(false));

        let previous = self
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(ActiveSocket {
                outgoing,
                cancel: cancel.clone(),
                connected: Arc::clone(&connected),
            });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }

        tokio::spawn(run_socket(
            url,
            protocols,
            outgoing_rx,
            events,
            cancel,
            connected,
        ));
    }

    fn write(&self, message: String) {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        match active.as_ref() {
            Some(socket) => {
                if socket.outgoing.send(message).is_err() {
                    tracing::warn!("websocket writer closed, dropping message");
                }
            }
            None => tracing::warn!("websocket not connected, dropping message"),
        }
    }

    fn disconnect(&self) {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(socket) = active {
            socket.cancel.cancel();
        }
    }

    fn is_connected(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|socket| socket.connected.load(Ordering::Acquire))
    }
}

async fn run_socket(
    url: Url,
    protocols: Vec<String>,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    events: WebSocketEventSender,
    cancel: CancellationToken,
    connected: Arc<AtomicBool>,
) {
    let mut request = match url.as_str().into_client_request() {
        Ok(request) => request,
        Err(e) => {
            let _ = events.send(WebSocketEvent::Disconnected(Some(e.to_string())));
            return;
        }
    };
    if !protocols.is_empty() {
        if let Ok(value) = HeaderValue::from_str(&protocols.join(", ")) {
            request.headers_mut().insert("Sec-WebSocket-Protocol", value);
        }
    }

    let result = tokio::select! {
        _ = cancel.cancelled() => return,
        result = tokio_tungstenite::connect_async(request) => result,
    };
    let ws = match result {
        Ok((ws, _)) => ws,
        Err(e) => {
            let _ = events.send(WebSocketEvent::Disconnected(Some(e.to_string())));
            return;
        }
    };

    connected.store(true, Ordering::Release);
    let _ = events.send(WebSocketEvent::Connected);
    let (mut sink, mut stream) = ws.split();

    let reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.close().await;
                break None;
            }
            Some(text) = outgoing.recv() => {
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    break Some(e.to_string());
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(WebSocketEvent::Text(text.as_str().to_string()));
                }
                Some(Ok(Message::Close(_))) | None => break None,
                // Ping/pong is handled by tungstenite
                Some(Ok(_)) => continue,
                Some(Err(e)) => break Some(e.to_string()),
            }
        }
    };

    connected.store(false, Ordering::Release);
    let _ = events.send(WebSocketEvent::Disconnected(reason));
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
