// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket protocol messages for realtime subscriptions.
//!
//! Every frame is a JSON object `{id, type, payload}`:
//! - Client sends `connection_init`, `start` (subscribe) and `stop` (unsubscribe)
//! - Server answers with `connection_ack`, `start_ack`, `complete`, `ka`
//!   (keepalive), `data` and `error`

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConnectionProviderError;

/// Message types sent from client to server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    ConnectionInit,
    Start,
    Stop,
}

/// Authorization headers carried in `payload.extensions.authorization`.
pub type AuthHeader = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extensions {
    pub authorization: AuthHeader,
}

/// Payload of a client message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    /// JSON-encoded `{"query", "variables"}` for `start` messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Extensions>,
}

impl MessagePayload {
    /// Set `extensions.authorization`.
    pub fn set_authorization(&mut self, header: AuthHeader) {
        self.extensions = Some(Extensions {
            authorization: header,
        });
    }

    pub fn authorization(&self) -> Option<&AuthHeader> {
        self.extensions.as_ref().map(|ext| &ext.authorization)
    }
}

/// A message sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<MessagePayload>,

    #[serde(rename = "type")]
    pub message_type: MessageType,
}

impl RealtimeMessage {
    pub fn connection_init() -> Self {
        RealtimeMessage {
            id: None,
            payload: None,
            message_type: MessageType::ConnectionInit,
        }
    }

    /// Subscribe `id` to `query` with `variables`.
    pub fn start(
        id: impl Into<String>,
        query: &str,
        variables: Option<&Map<String, Value>>,
    ) -> serde_json::Result<Self> {
        let mut data = Map::new();
        data.insert("query".to_string(), Value::String(query.to_string()));
        if let Some(variables) = variables {
            data.insert("variables".to_string(), Value::Object(variables.clone()));
        }
        Ok(RealtimeMessage {
            id: Some(id.into()),
            payload: Some(MessagePayload {
                data: Some(serde_json::to_string(&data)?),
                extensions: None,
            }),
            message_type: MessageType::Start,
        })
    }

    pub fn stop(id: impl Into<String>) -> Self {
        RealtimeMessage {
            id: Some(id.into()),
            payload: None,
            message_type: MessageType::Stop,
        }
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialize from a JSON string.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Frame types sent from server to client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseType {
    #[serde(rename = "connection_ack")]
    ConnectionAck,
    #[serde(rename = "start_ack")]
    StartAck,
    #[serde(rename = "complete")]
    Complete,
    #[serde(rename = "ka")]
    KeepAlive,
    #[serde(rename = "data")]
    Data,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "connection_error")]
    ConnectionError,
}

/// A frame sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Map<String, Value>>,

    #[serde(rename = "type")]
    pub response_type: ResponseType,
}

impl RealtimeResponse {
    pub fn new(response_type: ResponseType) -> Self {
        RealtimeResponse {
            id: None,
            payload: None,
            response_type,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attach a payload. Non-object values are ignored.
    pub fn with_payload(mut self, payload: Value) -> Self {
        if let Value::Object(map) = payload {
            self.payload = Some(map);
        }
        self
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialize from a JSON string.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Server-requested keepalive window from a `connection_ack`.
    pub fn connection_timeout(&self) -> Option<Duration> {
        self.payload
            .as_ref()?
            .get("connectionTimeoutMs")?
            .as_u64()
            .map(Duration::from_millis)
    }

    /// Subscription-level view of `start_ack`, `complete` and `data` frames.
    pub fn to_subscription_response(&self) -> Option<SubscriptionResponse> {
        let kind = match self.response_type {
            ResponseType::StartAck => SubscriptionResponseKind::StartAck,
            ResponseType::Complete => SubscriptionResponseKind::Complete,
            ResponseType::Data => SubscriptionResponseKind::Data,
            _ => return None,
        };
        Some(SubscriptionResponse {
            id: self.id.clone(),
            payload: self.payload.clone(),
            kind,
        })
    }

    /// Map an `error` frame to a provider error.
    ///
    /// An unauthorized error is reported as such in every state. Otherwise,
    /// while the handshake is pending (`in_progress`), any error fails the
    /// whole connection.
    pub fn to_connection_provider_error(&self, in_progress: bool) -> ConnectionProviderError {
        if self.is_unauthorized() {
            return ConnectionProviderError::Unauthorized;
        }
        if in_progress {
            return ConnectionProviderError::Connection;
        }
        if self.is_limit_exceeded() {
            return ConnectionProviderError::LimitExceeded {
                id: self.id.clone(),
            };
        }
        match &self.id {
            Some(id) => ConnectionProviderError::Subscription {
                id: id.clone(),
                payload: self
                    .payload
                    .clone()
                    .map(Value::Object)
                    .unwrap_or(Value::Null),
            },
            None => ConnectionProviderError::Other(
                self.error_type()
                    .unwrap_or("unknown server error")
                    .to_string(),
            ),
        }
    }

    fn error_type(&self) -> Option<&str> {
        self.payload.as_ref()?.get("errorType")?.as_str()
    }

    fn errors(&self) -> impl Iterator<Item = &Map<String, Value>> {
        let errors = self.payload.as_ref().and_then(|p| p.get("errors"));
        let list: Vec<&Map<String, Value>> = match errors {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_object).collect(),
            Some(Value::Object(item)) => vec![item],
            _ => Vec::new(),
        };
        list.into_iter()
    }

    fn is_limit_exceeded(&self) -> bool {
        if self.error_type() == Some("MaxSubscriptionsReachedException") {
            return true;
        }
        self.errors().any(|error| {
            matches!(
                error.get("errorType").and_then(Value::as_str),
                Some("MaxSubscriptionsReachedError") | Some("LimitExceededError")
            )
        })
    }

    fn is_unauthorized(&self) -> bool {
        self.errors().any(|error| {
            error
                .get("errorType")
                .and_then(Value::as_str)
                .is_some_and(|kind| kind.contains("UnauthorizedException"))
        })
    }
}

/// Subscription acknowledgement, completion or data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionResponseKind {
    StartAck,
    Complete,
    Data,
}

/// Frame forwarded from a connection provider to its listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionResponse {
    pub id: Option<String>,
    pub payload: Option<Map<String, Value>>,
    pub kind: SubscriptionResponseKind,
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
