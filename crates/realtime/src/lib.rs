// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Realtime subscriptions over the GraphQL WebSocket gateway.
//!
//! - [`provider`]: one shared connection and its state machine
//! - [`subscription`]: one logical subscription over a provider
//! - [`pool`]: providers shared per endpoint and auth mode
//! - [`topics`]: topic/client/watcher registry for broker connections

pub mod interceptor;
pub mod pool;
pub mod provider;
pub mod subscription;
pub mod topics;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use interceptor::{
    ApiKeyAuthInterceptor, AuthInterceptor, ConnectionInterceptor, ConnectionRequest,
    MessageInterceptor, RealtimeGatewayUrlInterceptor, TokenAuthInterceptor,
};
pub use pool::{AuthProviders, ConnectionPool, SubscriptionConnectionFactory};
pub use provider::{ConnectionProvider, ConnectionProviderEvent, ConnectionState, Interceptors};
pub use subscription::{
    SubscriptionConnection, SubscriptionConnectionState, SubscriptionItem, SubscriptionItemEvent,
};
pub use topics::TopicRegistry;
pub use transport::{TungsteniteWebSocket, WebSocketEvent, WebSocketProvider};
