// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Realtime connection provider.
//!
//! A provider owns one WebSocket connection and multiplexes every
//! subscription sharing its endpoint. All state lives in a single actor task;
//! the [`ConnectionProvider`] handle only sends commands to it, so status
//! transitions and listener dispatch are strictly sequential.
//!
//! Keepalive monitoring uses a deadline raced in `tokio::select!`. Any frame
//! from the server pushes the deadline out; if it passes, the connection is
//! treated as dead.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use gqlsync_core::protocol::{MessageType, RealtimeMessage, RealtimeResponse, ResponseType};
use gqlsync_core::{ConnectionProviderError, SubscriptionResponse};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, warn};
use url::Url;

use crate::interceptor::{ConnectionInterceptor, ConnectionRequest, MessageInterceptor};
use crate::transport::{WebSocketEvent, WebSocketProvider};

/// Keepalive window used until the server sends `connectionTimeoutMs`.
pub const DEFAULT_STALE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// WebSocket subprotocol spoken by the realtime gateway.
pub const GRAPHQL_WS_PROTOCOL: &str = "graphql-ws";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    NotConnected,
    InProgress,
    Connected,
}

/// Event fanned out to every registered listener.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionProviderEvent {
    Connection(ConnectionState),
    Data(SubscriptionResponse),
    Error(ConnectionProviderError),
}

/// Receiving side is owned by the listener; dispatch never filters by id.
pub type ConnectionListener = mpsc::UnboundedSender<ConnectionProviderEvent>;

/// Interceptor chains applied by a provider, in order.
#[derive(Default)]
pub struct Interceptors {
    pub connection: Vec<Box<dyn ConnectionInterceptor>>,
    pub message: Vec<Box<dyn MessageInterceptor>>,
}

impl Interceptors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connection(mut self, interceptor: impl ConnectionInterceptor + 'static) -> Self {
        self.connection.push(Box::new(interceptor));
        self
    }

    pub fn with_message(mut self, interceptor: impl MessageInterceptor + 'static) -> Self {
        self.message.push(Box::new(interceptor));
        self
    }
}

enum Command {
    Connect,
    Write(RealtimeMessage),
    Disconnect,
    AddListener(String, ConnectionListener),
    RemoveListener(String),
}

struct Shared {
    url: Url,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ConnectionState>,
}

/// Handle to a connection provider actor.
///
/// Clones share the same actor. The actor stops once every strong handle is
/// dropped.
#[derive(Clone)]
pub struct ConnectionProvider {
    shared: Arc<Shared>,
}

impl ConnectionProvider {
    /// Spawn a provider for `url`. Must be called within a tokio runtime.
    pub fn new(url: Url, websocket: Arc<dyn WebSocketProvider>, interceptors: Interceptors) -> Self {
        Self::with_stale_timeout(url, websocket, interceptors, DEFAULT_STALE_CONNECTION_TIMEOUT)
    }

    pub fn with_stale_timeout(
        url: Url,
        websocket: Arc<dyn WebSocketProvider>,
        interceptors: Interceptors,
        stale_timeout: Duration,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(ConnectionState::NotConnected);
        let actor = ProviderActor {
            url: url.clone(),
            websocket,
            interceptors,
            status: status_tx,
            listeners: HashMap::new(),
            socket: None,
            stale_timeout,
            stale_deadline: None,
        };
        tokio::spawn(actor.run(command_rx));
        ConnectionProvider {
            shared: Arc::new(Shared {
                url,
                commands,
                status,
            }),
        }
    }

    pub fn url(&self) -> &Url {
        &self.shared.url
    }

    pub fn status(&self) -> ConnectionState {
        *self.shared.status.borrow()
    }

    /// Open the connection, or re-emit the current status if already open.
    pub fn connect(&self) {
        self.send(Command::Connect);
    }

    pub fn write(&self, message: RealtimeMessage) {
        self.send(Command::Write(message));
    }

    pub fn disconnect(&self) {
        self.send(Command::Disconnect);
    }

    pub fn add_listener(&self, id: impl Into<String>, listener: ConnectionListener) {
        self.send(Command::AddListener(id.into(), listener));
    }

    /// Remove a listener; removing the last one closes the connection.
    pub fn remove_listener(&self, id: impl Into<String>) {
        self.send(Command::RemoveListener(id.into()));
    }

    /// Whether both handles drive the same actor.
    pub fn ptr_eq(&self, other: &ConnectionProvider) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub fn downgrade(&self) -> WeakConnectionProvider {
        WeakConnectionProvider {
            shared: Arc::downgrade(&self.shared),
        }
    }

    fn send(&self, command: Command) {
        if self.shared.commands.send(command).is_err() {
            warn!(url = %self.shared.url, "connection provider stopped");
        }
    }
}

/// Non-owning handle held by subscription connections.
#[derive(Clone)]
pub struct WeakConnectionProvider {
    shared: Weak<Shared>,
}

impl WeakConnectionProvider {
    pub fn upgrade(&self) -> Option<ConnectionProvider> {
        self.shared
            .upgrade()
            .map(|shared| ConnectionProvider { shared })
    }
}

struct ProviderActor {
    url: Url,
    websocket: Arc<dyn WebSocketProvider>,
    interceptors: Interceptors,
    status: watch::Sender<ConnectionState>,
    listeners: HashMap<String, ConnectionListener>,
    socket: Option<mpsc::UnboundedReceiver<WebSocketEvent>>,
    stale_timeout: Duration,
    stale_deadline: Option<Instant>,
}

impl ProviderActor {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                event = next_socket_event(&mut self.socket) => match event {
                    Some(event) => self.handle_socket_event(event).await,
                    None => self.socket = None,
                },
                _ = stale_expired(self.stale_deadline) => self.disconnect_stale(),
            }
        }
        self.websocket.disconnect();
        debug!(url = %self.url, "connection provider stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.connect().await,
            Command::Write(message) => self.write(message).await,
            Command::Disconnect => {
                if *self.status.borrow() != ConnectionState::NotConnected {
                    self.set_status(ConnectionState::NotConnected);
                    self.dispatch(ConnectionProviderEvent::Connection(
                        ConnectionState::NotConnected,
                    ));
                }
                self.disconnect();
            }
            Command::AddListener(id, listener) => {
                self.listeners.insert(id, listener);
            }
            Command::RemoveListener(id) => {
                self.listeners.remove(&id);
                if self.listeners.is_empty() {
                    debug!(url = %self.url, "all listeners removed, disconnecting");
                    self.set_status(ConnectionState::NotConnected);
                    self.disconnect();
                }
            }
        }
    }

    async fn connect(&mut self) {
        let status = *self.status.borrow();
        if status != ConnectionState::NotConnected {
            self.dispatch(ConnectionProviderEvent::Connection(status));
            return;
        }
        self.set_status(ConnectionState::InProgress);
        self.dispatch(ConnectionProviderEvent::Connection(ConnectionState::InProgress));

        let mut request = ConnectionRequest::new(self.url.clone());
        for interceptor in &self.interceptors.connection {
            request = interceptor.intercept_connection(request, &self.url).await;
        }

        let (events, socket) = mpsc::unbounded_channel();
        self.socket = Some(socket);
        self.websocket
            .connect(request.url, vec![GRAPHQL_WS_PROTOCOL.to_string()], events);
    }

    async fn write(&mut self, message: RealtimeMessage) {
        let mut message = message;
        for interceptor in &self.interceptors.message {
            message = interceptor.intercept_message(message, &self.url).await;
        }
        match message.to_json() {
            Ok(json) => self.websocket.write(json),
            Err(e) => {
                error!(error = %e, "failed to encode realtime message");
                if message.message_type == MessageType::ConnectionInit {
                    self.set_status(ConnectionState::NotConnected);
                    self.dispatch(ConnectionProviderEvent::Error(
                        ConnectionProviderError::Connection,
                    ));
                } else {
                    self.dispatch(ConnectionProviderEvent::Error(
                        ConnectionProviderError::JsonParse {
                            id: message.id,
                            message: e.to_string(),
                        },
                    ));
                }
            }
        }
    }

    /// Close the transport. Events still queued from it are dropped.
    fn disconnect(&mut self) {
        self.websocket.disconnect();
        self.socket = None;
        self.stale_deadline = None;
    }

    async fn handle_socket_event(&mut self, event: WebSocketEvent) {
        match event {
            WebSocketEvent::Connected => {
                debug!(url = %self.url, "websocket connected, sending connection_init");
                self.write(RealtimeMessage::connection_init()).await;
                self.start_stale_timer();
            }
            WebSocketEvent::Disconnected(reason) => {
                self.set_status(ConnectionState::NotConnected);
                self.stale_deadline = None;
                match reason {
                    None => self.dispatch(ConnectionProviderEvent::Connection(
                        ConnectionState::NotConnected,
                    )),
                    Some(reason) => {
                        warn!(url = %self.url, %reason, "websocket closed with error");
                        self.dispatch(ConnectionProviderEvent::Error(
                            ConnectionProviderError::Connection,
                        ));
                    }
                }
            }
            WebSocketEvent::Text(text) => match RealtimeResponse::from_json(&text) {
                Ok(response) => self.handle_response(response),
                Err(e) => {
                    error!(error = %e, "failed to decode realtime frame");
                    self.dispatch(ConnectionProviderEvent::Error(
                        ConnectionProviderError::JsonParse {
                            id: None,
                            message: e.to_string(),
                        },
                    ));
                }
            },
        }
    }

    fn handle_response(&mut self, response: RealtimeResponse) {
        self.reset_stale_timer();
        match response.response_type {
            ResponseType::ConnectionAck => self.handle_connection_ack(&response),
            ResponseType::Error | ResponseType::ConnectionError => {
                let in_progress = *self.status.borrow() == ConnectionState::InProgress;
                let error = response.to_connection_provider_error(in_progress);
                if in_progress {
                    self.set_status(ConnectionState::NotConnected);
                }
                self.dispatch(ConnectionProviderEvent::Error(error));
            }
            ResponseType::StartAck | ResponseType::Complete | ResponseType::Data => {
                if let Some(response) = response.to_subscription_response() {
                    self.dispatch(ConnectionProviderEvent::Data(response));
                }
            }
            ResponseType::KeepAlive => debug!(url = %self.url, "keepalive"),
        }
    }

    fn handle_connection_ack(&mut self, response: &RealtimeResponse) {
        if *self.status.borrow() != ConnectionState::InProgress {
            return;
        }
        self.set_status(ConnectionState::Connected);
        self.dispatch(ConnectionProviderEvent::Connection(ConnectionState::Connected));

        if let Some(timeout) = response.connection_timeout() {
            if timeout != self.stale_timeout {
                debug!(?timeout, "using server keepalive timeout");
                self.stale_timeout = timeout;
                self.start_stale_timer();
            }
        }
    }

    fn start_stale_timer(&mut self) {
        self.stale_deadline = Some(Instant::now() + self.stale_timeout);
    }

    fn reset_stale_timer(&mut self) {
        if self.stale_deadline.is_some() {
            self.start_stale_timer();
        }
    }

    fn disconnect_stale(&mut self) {
        self.set_status(ConnectionState::NotConnected);
        self.disconnect();
        error!(url = %self.url, "realtime connection is stale, disconnected");
        self.dispatch(ConnectionProviderEvent::Error(ConnectionProviderError::Connection));
    }

    fn set_status(&mut self, status: ConnectionState) {
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            debug!(from = ?*current, to = ?status, "connection status");
            *current = status;
            true
        });
    }

    fn dispatch(&self, event: ConnectionProviderEvent) {
        for listener in self.listeners.values() {
            let _ = listener.send(event.clone());
        }
    }
}

async fn next_socket_event(
    socket: &mut Option<mpsc::UnboundedReceiver<WebSocketEvent>>,
) -> Option<WebSocketEvent> {
    match socket {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn stale_expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
