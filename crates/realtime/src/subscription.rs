// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! One logical subscription over a shared connection provider.
//!
//! Each subscription registers as a listener on its provider and runs a task
//! that owns the item state. That task sends `start` once the connection is
//! up, tracks acknowledgements, and retries connection errors per the
//! attached [`RetryPolicy`].

use gqlsync_core::protocol::RealtimeMessage;
use gqlsync_core::protocol::SubscriptionResponseKind;
use gqlsync_core::{ConnectionProviderError, RetryPolicy, SubscriptionResponse};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::provider::{
    ConnectionProvider, ConnectionProviderEvent, ConnectionState, WeakConnectionProvider,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    NotSubscribed,
    InProgress,
    Subscribed,
}

/// Connection progress as seen by one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionItemEvent {
    Connection(SubscriptionConnectionState),
    /// The `payload` of a `data` frame.
    Data(Value),
    /// Terminal failure; the subscription is no longer listening.
    Failed(ConnectionProviderError),
}

/// Identity of an active subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionItem {
    pub id: String,
    pub query: String,
    pub variables: Option<Map<String, Value>>,
}

/// Subscriptions sharing one provider.
///
/// Holds only a weak reference; the owning pool keeps the provider alive.
#[derive(Clone)]
pub struct SubscriptionConnection {
    provider: WeakConnectionProvider,
    retry: Option<RetryPolicy>,
}

impl SubscriptionConnection {
    pub fn new(provider: &ConnectionProvider) -> Self {
        SubscriptionConnection {
            provider: provider.downgrade(),
            retry: None,
        }
    }

    /// Retry connection errors with `policy` instead of failing at once.
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn provider(&self) -> Option<ConnectionProvider> {
        self.provider.upgrade()
    }

    /// Subscribe to `query`. Events for the new item arrive on the returned
    /// receiver, starting with `Connection(Connecting)`.
    pub fn subscribe(
        &self,
        query: impl Into<String>,
        variables: Option<Map<String, Value>>,
    ) -> (SubscriptionItem, mpsc::UnboundedReceiver<SubscriptionItemEvent>) {
        let item = SubscriptionItem {
            id: uuid::Uuid::new_v4().to_string(),
            query: query.into(),
            variables,
        };
        let (events, event_rx) = mpsc::unbounded_channel();
        let (listener, listener_rx) = mpsc::unbounded_channel();

        let Some(provider) = self.provider.upgrade() else {
            warn!(id = %item.id, "no connection provider for subscription");
            let _ = events.send(SubscriptionItemEvent::Failed(
                ConnectionProviderError::Connection,
            ));
            return (item, event_rx);
        };

        provider.add_listener(item.id.clone(), listener);
        let _ = events.send(SubscriptionItemEvent::Connection(
            SubscriptionConnectionState::Connecting,
        ));
        provider.connect();

        let task = SubscriptionTask {
            item: item.clone(),
            provider: self.provider.clone(),
            retry: self.retry.clone(),
            state: SubscriptionState::NotSubscribed,
            events,
            reconnect_at: None,
        };
        tokio::spawn(task.run(listener_rx));
        (item, event_rx)
    }

    /// Send `stop` for `item` and stop listening.
    pub fn unsubscribe(&self, item: &SubscriptionItem) {
        debug!(id = %item.id, "unsubscribe");
        let Some(provider) = self.provider.upgrade() else {
            warn!(id = %item.id, "unsubscribe without connection provider");
            return;
        };
        provider.write(RealtimeMessage::stop(item.id.clone()));
        provider.remove_listener(item.id.clone());
    }
}

struct SubscriptionTask {
    item: SubscriptionItem,
    provider: WeakConnectionProvider,
    retry: Option<RetryPolicy>,
    state: SubscriptionState,
    events: mpsc::UnboundedSender<SubscriptionItemEvent>,
    reconnect_at: Option<Instant>,
}

impl SubscriptionTask {
    async fn run(mut self, mut listener: mpsc::UnboundedReceiver<ConnectionProviderEvent>) {
        loop {
            tokio::select! {
                event = listener.recv() => match event {
                    Some(ConnectionProviderEvent::Connection(state)) => self.handle_connection(state),
                    Some(ConnectionProviderEvent::Data(response)) => self.handle_data(response),
                    Some(ConnectionProviderEvent::Error(error)) => self.handle_error(error),
                    None => break,
                },
                _ = reconnect_due(self.reconnect_at) => {
                    self.reconnect_at = None;
                    if let Some(provider) = self.provider.upgrade() {
                        provider.connect();
                    }
                }
            }
        }
        debug!(id = %self.item.id, "subscription listener closed");
    }

    fn handle_connection(&mut self, state: ConnectionState) {
        match state {
            ConnectionState::NotConnected => match self.state {
                SubscriptionState::InProgress => {
                    self.handle_error(ConnectionProviderError::Connection);
                }
                // The server forgets subscriptions with the socket; `start`
                // goes out again on the next connection.
                SubscriptionState::Subscribed => {
                    debug!(id = %self.item.id, "connection closed, subscription dropped");
                    self.state = SubscriptionState::NotSubscribed;
                    self.emit(SubscriptionItemEvent::Connection(
                        SubscriptionConnectionState::Disconnected,
                    ));
                }
                SubscriptionState::NotSubscribed => {}
            },
            ConnectionState::Connected => self.start_subscription(),
            _ => {}
        }
    }

    fn start_subscription(&mut self) {
        if self.state != SubscriptionState::NotSubscribed {
            return;
        }
        self.state = SubscriptionState::InProgress;
        let message = match RealtimeMessage::start(
            self.item.id.clone(),
            &self.item.query,
            self.item.variables.as_ref(),
        ) {
            Ok(message) => message,
            Err(e) => {
                self.emit(SubscriptionItemEvent::Failed(
                    ConnectionProviderError::JsonParse {
                        id: None,
                        message: e.to_string(),
                    },
                ));
                return;
            }
        };
        if let Some(provider) = self.provider.upgrade() {
            provider.write(message);
        }
    }

    fn handle_data(&mut self, response: SubscriptionResponse) {
        if response.id.as_deref() != Some(self.item.id.as_str()) {
            return;
        }
        match response.kind {
            SubscriptionResponseKind::StartAck => {
                self.state = SubscriptionState::Subscribed;
                if let Some(retry) = self.retry.as_mut() {
                    retry.reset();
                }
                self.emit(SubscriptionItemEvent::Connection(
                    SubscriptionConnectionState::Connected,
                ));
            }
            SubscriptionResponseKind::Complete => {
                self.state = SubscriptionState::NotSubscribed;
                self.emit(SubscriptionItemEvent::Connection(
                    SubscriptionConnectionState::Disconnected,
                ));
            }
            SubscriptionResponseKind::Data => {
                let payload = response.payload.map(Value::Object).unwrap_or(Value::Null);
                self.emit(SubscriptionItemEvent::Data(payload));
            }
        }
    }

    fn handle_error(&mut self, error: ConnectionProviderError) {
        if let Some(id) = error.identifier() {
            if id != self.item.id {
                return;
            }
        }
        // A limit error without an id only fails subscriptions still starting.
        if matches!(error, ConnectionProviderError::LimitExceeded { id: None }) {
            if self.state == SubscriptionState::InProgress {
                self.state = SubscriptionState::NotSubscribed;
                self.fail(error);
            }
            return;
        }

        self.state = SubscriptionState::NotSubscribed;
        let advice = match self.retry.as_mut() {
            Some(retry) => retry.should_retry_connection(&error),
            None => {
                self.fail(error);
                return;
            }
        };
        match advice.retry_interval {
            Some(interval) if advice.should_retry => {
                debug!(id = %self.item.id, ?interval, %error, "retrying subscription");
                self.reconnect_at = Some(Instant::now() + interval);
            }
            _ => self.fail(error),
        }
    }

    fn fail(&mut self, error: ConnectionProviderError) {
        error!(id = %self.item.id, %error, "subscription failed");
        self.reconnect_at = None;
        self.emit(SubscriptionItemEvent::Failed(error));
        if let Some(provider) = self.provider.upgrade() {
            provider.remove_listener(self.item.id.clone());
        }
    }

    fn emit(&self, event: SubscriptionItemEvent) {
        let _ = self.events.send(event);
    }
}

async fn reconnect_due(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "subscription_tests.rs"]
mod tests;
