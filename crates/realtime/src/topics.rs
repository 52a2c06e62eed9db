// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Topic-based subscription registry for broker (MQTT style) connections.
//!
//! Watchers register interest in topics, and broker clients carry those
//! topics. Resubscribing replaces every client at once. The replaced clients
//! become "expiring" and stay connected until their replacement acknowledges
//! the same topic, so no message is lost during the handover.
//!
//! Ownership is explicit. A watcher stays registered until
//! [`TopicRegistry::cancel_subscription`] is called for it, and a client is
//! disconnected once it carries no watched topic.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::debug;
use url::Url;

pub type WatcherId = u64;

/// Arena key of a broker client owned by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientKey(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerStatus {
    Unknown,
    Connecting,
    Connected,
    Disconnected,
    ConnectionRefused,
    ConnectionError,
    ProtocolError,
}

impl BrokerStatus {
    /// The error reported to watchers when a client enters this status.
    pub fn disconnect_error(self) -> Option<TopicError> {
        match self {
            BrokerStatus::Disconnected => Some(TopicError::Disconnected),
            BrokerStatus::ConnectionRefused => Some(TopicError::ConnectionRefused),
            BrokerStatus::ConnectionError => Some(TopicError::ConnectionError),
            BrokerStatus::ProtocolError => Some(TopicError::ProtocolError),
            BrokerStatus::Unknown | BrokerStatus::Connecting | BrokerStatus::Connected => None,
        }
    }

    /// Whether the broker still accepts an unsubscribe in this status.
    fn accepts_unsubscribe(self) -> bool {
        !matches!(self, BrokerStatus::Disconnected | BrokerStatus::Unknown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TopicError {
    #[error("subscription disconnected")]
    Disconnected,
    #[error("connection refused")]
    ConnectionRefused,
    #[error("connection error")]
    ConnectionError,
    #[error("protocol error")]
    ProtocolError,
}

/// Where and how to open one broker connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionInfo {
    pub client_id: String,
    pub url: Url,
    pub topics: Vec<String>,
}

/// A broker connection. Implementations report back through
/// [`TopicRegistry::connection_status_changed`],
/// [`TopicRegistry::subscription_acknowledged`] and
/// [`TopicRegistry::received_message`].
pub trait BrokerClient: Send + Sync {
    fn connect(&self, client_id: &str, url: &Url);
    fn subscribe_topic(&self, topic: &str);
    fn unsubscribe_topic(&self, topic: &str);
    fn disconnect(&self);
    fn status(&self) -> BrokerStatus;
}

pub trait BrokerClientFactory: Send + Sync {
    fn create(&self, key: ClientKey) -> Arc<dyn BrokerClient>;
}

/// Receives messages and lifecycle callbacks for its topics.
pub trait TopicWatcher: Send + Sync {
    fn id(&self) -> WatcherId;
    fn on_message(&self, topic: &str, data: &[u8]);
    fn on_disconnect(&self, error: TopicError);

    fn on_status(&self, _status: BrokerStatus) {}
    fn on_connected(&self) {}
    fn on_subscription_ack(&self) {}
}

#[derive(Default)]
struct RegistryState {
    next_client: u64,
    clients: HashMap<ClientKey, Arc<dyn BrokerClient>>,
    topics_by_client: HashMap<ClientKey, HashSet<String>>,
    expiring_by_topic: HashMap<String, Vec<(ClientKey, Arc<dyn BrokerClient>)>>,
    watchers_by_topic: HashMap<String, Vec<Arc<dyn TopicWatcher>>>,
    /// Cancelled watchers; `true` once a pending resubscribe was skipped.
    cancelled: HashMap<WatcherId, bool>,
}

impl RegistryState {
    fn watchers_for<'a>(&self, topics: impl IntoIterator<Item = &'a String>) -> Vec<Arc<dyn TopicWatcher>> {
        let mut seen = HashSet::new();
        topics
            .into_iter()
            .filter_map(|topic| self.watchers_by_topic.get(topic))
            .flatten()
            .filter(|watcher| seen.insert(watcher.id()))
            .cloned()
            .collect()
    }

    fn client_topics(&self, key: ClientKey) -> Vec<String> {
        let mut topics: Vec<String> = self
            .topics_by_client
            .get(&key)
            .map(|topics| topics.iter().cloned().collect())
            .unwrap_or_default();
        topics.sort();
        topics
    }
}

/// Many-to-many registry of watchers, topics and broker clients.
///
/// Callbacks run after the internal lock is released, so watchers and
/// clients may call back into the registry.
pub struct TopicRegistry {
    factory: Arc<dyn BrokerClientFactory>,
    state: Mutex<RegistryState>,
}

impl TopicRegistry {
    pub fn new(factory: Arc<dyn BrokerClientFactory>) -> Self {
        TopicRegistry {
            factory,
            state: Mutex::new(RegistryState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `watcher` for `topics`.
    pub fn add_watcher(&self, watcher: Arc<dyn TopicWatcher>, topics: &[String]) {
        let mut state = self.state();
        for topic in topics {
            let watchers = state.watchers_by_topic.entry(topic.clone()).or_default();
            if !watchers.iter().any(|w| w.id() == watcher.id()) {
                watchers.push(watcher.clone());
            }
        }
    }

    /// Replace all clients with new ones built from `infos`.
    ///
    /// Current clients become expiring. If `watcher_id` was cancelled in the
    /// meantime no new clients are started.
    pub fn reset_and_start_subscriptions(&self, infos: &[SubscriptionInfo], watcher_id: WatcherId) {
        let mut to_connect = Vec::new();
        {
            let mut state = self.state();
            debug!(
                new = infos.len(),
                old = state.topics_by_client.len(),
                "resetting broker clients"
            );
            let old: Vec<(ClientKey, HashSet<String>)> = state.topics_by_client.drain().collect();
            for (key, topics) in old {
                let Some(client) = state.clients.remove(&key) else {
                    continue;
                };
                for topic in topics {
                    state
                        .expiring_by_topic
                        .entry(topic)
                        .or_default()
                        .push((key, client.clone()));
                }
            }
            state.clients.clear();

            if let Some(skipped) = state.cancelled.get_mut(&watcher_id) {
                *skipped = true;
                return;
            }

            for info in infos {
                let interested: HashSet<String> = info
                    .topics
                    .iter()
                    .filter(|topic| state.watchers_by_topic.contains_key(*topic))
                    .cloned()
                    .collect();
                if interested.is_empty() {
                    continue;
                }
                let key = ClientKey(state.next_client);
                state.next_client += 1;
                let client = self.factory.create(key);
                state.clients.insert(key, client.clone());
                state.topics_by_client.insert(key, interested);
                to_connect.push((client, info));
            }
        }
        for (client, info) in to_connect {
            client.connect(&info.client_id, &info.url);
        }
    }

    /// Deregister a watcher.
    ///
    /// Topics left without watchers are dropped from their clients (and
    /// unsubscribed at the broker when the user asked for it). Clients left
    /// without topics are disconnected.
    pub fn cancel_subscription(&self, watcher_id: WatcherId, user_originated: bool) {
        debug!(watcher_id, "cancelling topic watcher");
        let mut unsubscribes = Vec::new();
        let mut disconnects = Vec::new();
        {
            let mut state = self.state();
            for watchers in state.watchers_by_topic.values_mut() {
                watchers.retain(|w| w.id() != watcher_id);
            }
            state.cancelled.insert(watcher_id, false);

            let unwatched: Vec<String> = state
                .watchers_by_topic
                .iter()
                .filter(|(_, watchers)| watchers.is_empty())
                .map(|(topic, _)| topic.clone())
                .collect();
            for topic in &unwatched {
                state.watchers_by_topic.remove(topic);
            }

            let state = &mut *state;
            for (key, topics) in state.topics_by_client.iter_mut() {
                for topic in &unwatched {
                    if !topics.remove(topic) || !user_originated {
                        continue;
                    }
                    if let Some(client) = state.clients.get(key) {
                        if client.status().accepts_unsubscribe() {
                            unsubscribes.push((client.clone(), topic.clone()));
                        }
                    }
                }
            }

            let empty: Vec<ClientKey> = state
                .topics_by_client
                .iter()
                .filter(|(_, topics)| topics.is_empty())
                .map(|(key, _)| *key)
                .collect();
            for key in empty {
                state.topics_by_client.remove(&key);
                if let Some(client) = state.clients.remove(&key) {
                    disconnects.push(client);
                }
            }
        }
        for (client, topic) in unsubscribes {
            client.unsubscribe_topic(&topic);
        }
        for client in disconnects {
            client.disconnect();
        }
    }

    /// Deliver a broker message to every watcher of `topic`.
    pub fn received_message(&self, topic: &str, data: &[u8]) {
        let watchers = self.state().watchers_by_topic.get(topic).cloned().unwrap_or_default();
        for watcher in watchers {
            watcher.on_message(topic, data);
        }
    }

    /// Status callback from the client registered under `key`.
    pub fn connection_status_changed(&self, key: ClientKey, status: BrokerStatus) {
        debug!(?key, ?status, "broker client status");
        let (client, topics, watchers) = {
            let state = self.state();
            let topics = state.client_topics(key);
            if topics.is_empty() {
                return;
            }
            let watchers = state.watchers_for(&topics);
            (state.clients.get(&key).cloned(), topics, watchers)
        };
        for watcher in &watchers {
            watcher.on_status(status);
        }

        if status == BrokerStatus::Connected {
            if let Some(client) = client {
                for topic in &topics {
                    client.subscribe_topic(topic);
                }
            }
            for watcher in &watchers {
                watcher.on_connected();
            }
        } else if let Some(error) = status.disconnect_error() {
            for watcher in &watchers {
                self.cancel_subscription(watcher.id(), false);
            }
            for watcher in &watchers {
                watcher.on_disconnect(error);
            }
        }
    }

    /// The broker acknowledged `topic`; clients it replaced can go.
    pub fn subscription_acknowledged(&self, topic: &str) {
        debug!(topic, "topic subscribed");
        let (expiring, watchers) = {
            let mut state = self.state();
            let expiring = state.expiring_by_topic.remove(topic).unwrap_or_default();
            let retired: HashSet<ClientKey> = expiring.iter().map(|(key, _)| *key).collect();
            for clients in state.expiring_by_topic.values_mut() {
                clients.retain(|(key, _)| !retired.contains(key));
            }
            state.expiring_by_topic.retain(|_, clients| !clients.is_empty());
            let watchers = state.watchers_for([&topic.to_string()]);
            (expiring, watchers)
        };
        for (_, client) in expiring {
            client.disconnect();
        }
        for watcher in watchers {
            watcher.on_subscription_ack();
        }
    }

    pub fn active_clients(&self) -> Vec<ClientKey> {
        let mut keys: Vec<ClientKey> = self.state().clients.keys().copied().collect();
        keys.sort();
        keys
    }

    pub fn expiring_clients(&self, topic: &str) -> Vec<ClientKey> {
        self.state()
            .expiring_by_topic
            .get(topic)
            .map(|clients| clients.iter().map(|(key, _)| *key).collect())
            .unwrap_or_default()
    }

    pub fn topics_for_client(&self, key: ClientKey) -> Vec<String> {
        self.state().client_topics(key)
    }

    pub fn watcher_count(&self, topic: &str) -> usize {
        self.state().watchers_by_topic.get(topic).map_or(0, Vec::len)
    }
}

#[cfg(test)]
#[path = "topics_tests.rs"]
mod tests;
