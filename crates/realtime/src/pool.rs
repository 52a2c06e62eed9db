// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connection pools keyed by endpoint, one pool per authorization mode.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use gqlsync_core::{AuthType, ClientConfig, RetryPolicy, RetryStrategy, TokenProvider};
use tracing::debug;
use url::Url;

use crate::interceptor::{
    ApiKeyAuthInterceptor, AuthInterceptor, RealtimeGatewayUrlInterceptor,
    SharedConnectionInterceptor, SharedMessageInterceptor, TokenAuthInterceptor,
};
use crate::provider::{ConnectionProvider, Interceptors};
use crate::subscription::SubscriptionConnection;
use crate::transport::{TungsteniteWebSocket, WebSocketProvider};

/// Creates the transport for each new provider.
pub type WebSocketFactory = Arc<dyn Fn() -> Arc<dyn WebSocketProvider> + Send + Sync>;

fn tungstenite_factory() -> WebSocketFactory {
    Arc::new(|| Arc::new(TungsteniteWebSocket::new()) as Arc<dyn WebSocketProvider>)
}

/// Shares one provider per endpoint for a single authorization mode.
pub struct ConnectionPool {
    auth: Arc<dyn AuthInterceptor>,
    websocket_factory: WebSocketFactory,
    providers: Mutex<HashMap<String, ConnectionProvider>>,
}

impl ConnectionPool {
    pub fn new(auth: Arc<dyn AuthInterceptor>) -> Self {
        Self::with_websocket_factory(auth, tungstenite_factory())
    }

    pub fn with_websocket_factory(
        auth: Arc<dyn AuthInterceptor>,
        websocket_factory: WebSocketFactory,
    ) -> Self {
        ConnectionPool {
            auth,
            websocket_factory,
            providers: Mutex::new(HashMap::new()),
        }
    }

    /// The provider for `endpoint`, created on first use.
    ///
    /// New providers rewrite the URL to the realtime gateway, then sign it.
    pub fn provider(&self, endpoint: &Url) -> ConnectionProvider {
        let mut providers = self.providers.lock().unwrap_or_else(|e| e.into_inner());
        providers
            .entry(endpoint.as_str().to_string())
            .or_insert_with(|| {
                debug!(%endpoint, "creating connection provider");
                let interceptors = Interceptors::new()
                    .with_connection(RealtimeGatewayUrlInterceptor::new())
                    .with_connection(SharedConnectionInterceptor(self.auth.clone()))
                    .with_message(SharedMessageInterceptor(self.auth.clone()));
                ConnectionProvider::new(endpoint.clone(), (self.websocket_factory)(), interceptors)
            })
            .clone()
    }

    pub fn connection(&self, endpoint: &Url, retry: Option<RetryStrategy>) -> SubscriptionConnection {
        let connection = SubscriptionConnection::new(&self.provider(endpoint));
        match retry {
            Some(strategy) => connection.with_retry(RetryPolicy::new(strategy)),
            None => connection,
        }
    }

    pub fn len(&self) -> usize {
        self.providers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Credentials available to the factory, one per authorization mode.
#[derive(Default, Clone)]
pub struct AuthProviders {
    pub api_key: Option<String>,
    pub user_pools: Option<Arc<dyn TokenProvider>>,
    pub oidc: Option<Arc<dyn TokenProvider>>,
    pub lambda: Option<Arc<dyn TokenProvider>>,
    /// IAM request signing is supplied as a ready interceptor.
    pub iam: Option<Arc<dyn AuthInterceptor>>,
}

impl AuthProviders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_user_pools(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.user_pools = Some(provider);
        self
    }

    pub fn with_oidc(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.oidc = Some(provider);
        self
    }

    pub fn with_lambda(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.lambda = Some(provider);
        self
    }

    pub fn with_iam(mut self, interceptor: Arc<dyn AuthInterceptor>) -> Self {
        self.iam = Some(interceptor);
        self
    }

    fn interceptors(&self) -> Vec<(AuthType, Arc<dyn AuthInterceptor>)> {
        let mut interceptors: Vec<(AuthType, Arc<dyn AuthInterceptor>)> = Vec::new();
        if let Some(api_key) = &self.api_key {
            let auth: Arc<dyn AuthInterceptor> = Arc::new(ApiKeyAuthInterceptor::new(api_key.clone()));
            interceptors.push((AuthType::ApiKey, auth));
        }
        let tokens = [
            (AuthType::CognitoUserPools, &self.user_pools),
            (AuthType::OpenIdConnect, &self.oidc),
            (AuthType::AwsLambda, &self.lambda),
        ];
        for (auth_type, provider) in tokens {
            if let Some(provider) = provider {
                let auth: Arc<dyn AuthInterceptor> =
                    Arc::new(TokenAuthInterceptor::new(provider.clone()));
                interceptors.push((auth_type, auth));
            }
        }
        if let Some(iam) = &self.iam {
            interceptors.push((AuthType::AwsIam, iam.clone()));
        }
        interceptors
    }
}

/// Hands out subscription connections for any configured auth mode.
pub struct SubscriptionConnectionFactory {
    pools: HashMap<AuthType, ConnectionPool>,
    retry: RetryStrategy,
}

impl SubscriptionConnectionFactory {
    pub fn new(providers: &AuthProviders, retry: RetryStrategy) -> Self {
        Self::with_websocket_factory(providers, retry, tungstenite_factory())
    }

    pub fn with_websocket_factory(
        providers: &AuthProviders,
        retry: RetryStrategy,
        websocket_factory: WebSocketFactory,
    ) -> Self {
        let pools = providers
            .interceptors()
            .into_iter()
            .map(|(auth_type, auth)| {
                (
                    auth_type,
                    ConnectionPool::with_websocket_factory(auth, websocket_factory.clone()),
                )
            })
            .collect();
        SubscriptionConnectionFactory { pools, retry }
    }

    /// Build from configuration; the configured API key is used when present.
    pub fn from_config(config: &ClientConfig, providers: AuthProviders) -> Self {
        let mut providers = providers;
        if providers.api_key.is_none() {
            providers.api_key = config.api.api_key.clone();
        }
        Self::new(&providers, config.retry.strategy)
    }

    /// A retrying connection to `endpoint`, or `None` without credentials
    /// for `auth_type`.
    pub fn connection(&self, endpoint: &Url, auth_type: AuthType) -> Option<SubscriptionConnection> {
        let pool = self.pools.get(&auth_type)?;
        Some(pool.connection(endpoint, Some(self.retry)))
    }

    pub fn pool(&self, auth_type: AuthType) -> Option<&ConnectionPool> {
        self.pools.get(&auth_type)
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
