// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connection and message interceptors.
//!
//! Interceptors rewrite the connection URL before the socket opens and
//! outgoing messages before they are encoded. Auth interceptors do both:
//! - at connect time a base64 JSON header blob and an empty payload are added
//!   as the `header` and `payload` query parameters
//! - on `start` messages the same header goes into
//!   `payload.extensions.authorization`

use std::sync::{Arc, OnceLock};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use gqlsync_core::protocol::{AuthHeader, MessageType, RealtimeMessage};
use gqlsync_core::{BoxFuture, TokenProvider};
use regex::Regex;
use url::Url;

const REALTIME_SCHEME: &str = "wss";
const API_HOST_PART: &str = "appsync-api";
const REALTIME_HOST_PART: &str = "appsync-realtime-api";
const CUSTOM_DOMAIN_REALTIME_PATH: &str = "realtime";
const EMPTY_PAYLOAD: &str = "{}";
const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// The request used to open a realtime connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequest {
    pub url: Url,
}

impl ConnectionRequest {
    pub fn new(url: Url) -> Self {
        ConnectionRequest { url }
    }
}

/// Rewrites the connection request. `endpoint` is the GraphQL endpoint.
pub trait ConnectionInterceptor: Send + Sync {
    fn intercept_connection<'a>(
        &'a self,
        request: ConnectionRequest,
        endpoint: &'a Url,
    ) -> BoxFuture<'a, ConnectionRequest>;
}

/// Rewrites an outgoing message. `endpoint` is the GraphQL endpoint.
pub trait MessageInterceptor: Send + Sync {
    fn intercept_message<'a>(
        &'a self,
        message: RealtimeMessage,
        endpoint: &'a Url,
    ) -> BoxFuture<'a, RealtimeMessage>;
}

/// Interceptor that signs both connections and messages.
pub trait AuthInterceptor: ConnectionInterceptor + MessageInterceptor {}

impl<T: ConnectionInterceptor + MessageInterceptor> AuthInterceptor for T {}

/// Connection interceptor adapter over a shared auth interceptor.
pub struct SharedConnectionInterceptor(pub Arc<dyn AuthInterceptor>);

impl ConnectionInterceptor for SharedConnectionInterceptor {
    fn intercept_connection<'a>(
        &'a self,
        request: ConnectionRequest,
        endpoint: &'a Url,
    ) -> BoxFuture<'a, ConnectionRequest> {
        self.0.intercept_connection(request, endpoint)
    }
}

/// Message interceptor adapter over a shared auth interceptor.
pub struct SharedMessageInterceptor(pub Arc<dyn AuthInterceptor>);

impl MessageInterceptor for SharedMessageInterceptor {
    fn intercept_message<'a>(
        &'a self,
        message: RealtimeMessage,
        endpoint: &'a Url,
    ) -> BoxFuture<'a, RealtimeMessage> {
        self.0.intercept_message(message, endpoint)
    }
}

fn standard_endpoint_pattern() -> &'static Option<Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)^https://\w{26}\.appsync-api\.\w{2}(?:(?:-\w{2,})+)-\d\.amazonaws\.com/graphql$",
        )
        .ok()
    })
}

/// Whether `endpoint` is a generated (non custom domain) GraphQL endpoint.
pub fn is_standard_graphql_endpoint(endpoint: &Url) -> bool {
    standard_endpoint_pattern()
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(endpoint.as_str()))
}

/// Derive the realtime endpoint from the GraphQL endpoint.
///
/// Generated hosts swap `appsync-api` for `appsync-realtime-api`; custom
/// domains keep their host and get `/realtime` appended to the path.
pub fn realtime_url(endpoint: &Url, request_url: &Url) -> Url {
    let mut url = request_url.clone();
    if url.set_scheme(REALTIME_SCHEME).is_err() {
        return request_url.clone();
    }
    if is_standard_graphql_endpoint(endpoint) {
        if let Some(host) = endpoint.host_str() {
            let realtime_host = host.replace(API_HOST_PART, REALTIME_HOST_PART);
            if url.set_host(Some(&realtime_host)).is_err() {
                return request_url.clone();
            }
        }
    } else {
        let path = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            CUSTOM_DOMAIN_REALTIME_PATH
        );
        url.set_path(&path);
    }
    url
}

/// Rewrites the GraphQL endpoint into the realtime gateway endpoint.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealtimeGatewayUrlInterceptor;

impl RealtimeGatewayUrlInterceptor {
    pub fn new() -> Self {
        RealtimeGatewayUrlInterceptor
    }
}

impl ConnectionInterceptor for RealtimeGatewayUrlInterceptor {
    fn intercept_connection<'a>(
        &'a self,
        request: ConnectionRequest,
        endpoint: &'a Url,
    ) -> BoxFuture<'a, ConnectionRequest> {
        Box::pin(async move {
            if endpoint.host_str().is_none() {
                return request;
            }
            ConnectionRequest::new(realtime_url(endpoint, &request.url))
        })
    }
}

/// Encode an auth header as the base64 JSON blob used in query parameters.
pub fn base64_auth_blob(header: &AuthHeader) -> String {
    match serde_json::to_vec(header) {
        Ok(json) => STANDARD.encode(json),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode auth header");
            String::new()
        }
    }
}

/// Replace the query string with the signed `header` and empty `payload`.
fn sign_url(request: ConnectionRequest, header: &AuthHeader) -> ConnectionRequest {
    let mut url = request.url;
    url.query_pairs_mut()
        .clear()
        .append_pair("header", &base64_auth_blob(header))
        .append_pair("payload", &STANDARD.encode(EMPTY_PAYLOAD));
    ConnectionRequest::new(url)
}

/// Attach `header` to a `start` message; other messages pass through.
fn sign_message(mut message: RealtimeMessage, header: AuthHeader) -> RealtimeMessage {
    if message.message_type != MessageType::Start {
        return message;
    }
    message
        .payload
        .get_or_insert_with(Default::default)
        .set_authorization(header);
    message
}

/// API key authorization.
#[derive(Debug, Clone)]
pub struct ApiKeyAuthInterceptor {
    api_key: String,
}

impl ApiKeyAuthInterceptor {
    pub fn new(api_key: impl Into<String>) -> Self {
        ApiKeyAuthInterceptor {
            api_key: api_key.into(),
        }
    }

    fn header(&self, host: &str) -> AuthHeader {
        let mut header = AuthHeader::new();
        header.insert("host".to_string(), host.to_string());
        header.insert(
            "x-amz-date".to_string(),
            Utc::now().format(AMZ_DATE_FORMAT).to_string(),
        );
        header.insert("x-api-key".to_string(), self.api_key.clone());
        header
    }
}

impl ConnectionInterceptor for ApiKeyAuthInterceptor {
    fn intercept_connection<'a>(
        &'a self,
        request: ConnectionRequest,
        endpoint: &'a Url,
    ) -> BoxFuture<'a, ConnectionRequest> {
        Box::pin(async move {
            match endpoint.host_str() {
                Some(host) => sign_url(request, &self.header(host)),
                None => request,
            }
        })
    }
}

impl MessageInterceptor for ApiKeyAuthInterceptor {
    fn intercept_message<'a>(
        &'a self,
        message: RealtimeMessage,
        endpoint: &'a Url,
    ) -> BoxFuture<'a, RealtimeMessage> {
        Box::pin(async move {
            match endpoint.host_str() {
                Some(host) => sign_message(message, self.header(host)),
                None => message,
            }
        })
    }
}

/// Bearer token authorization for user pools, OIDC and Lambda authorizers.
///
/// A failed token fetch still opens the connection with an empty token so
/// the server reports the rejection; `start` messages are then sent unsigned.
pub struct TokenAuthInterceptor {
    provider: Arc<dyn TokenProvider>,
}

impl TokenAuthInterceptor {
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        TokenAuthInterceptor { provider }
    }

    fn header(host: &str, token: String) -> AuthHeader {
        let mut header = AuthHeader::new();
        header.insert("host".to_string(), host.to_string());
        header.insert("Authorization".to_string(), token);
        header
    }
}

impl ConnectionInterceptor for TokenAuthInterceptor {
    fn intercept_connection<'a>(
        &'a self,
        request: ConnectionRequest,
        endpoint: &'a Url,
    ) -> BoxFuture<'a, ConnectionRequest> {
        Box::pin(async move {
            let Some(host) = endpoint.host_str() else {
                return request;
            };
            let token = match self.provider.fetch_token().await {
                Ok(token) => token,
                Err(e) => {
                    tracing::error!(error = %e, "token fetch failed for realtime connection");
                    String::new()
                }
            };
            sign_url(request, &Self::header(host, token))
        })
    }
}

impl MessageInterceptor for TokenAuthInterceptor {
    fn intercept_message<'a>(
        &'a self,
        message: RealtimeMessage,
        endpoint: &'a Url,
    ) -> BoxFuture<'a, RealtimeMessage> {
        Box::pin(async move {
            let Some(host) = endpoint.host_str() else {
                return message;
            };
            if message.message_type != MessageType::Start {
                return message;
            }
            match self.provider.fetch_token().await {
                Ok(token) => sign_message(message, Self::header(host, token)),
                Err(e) => {
                    tracing::error!(error = %e, "token fetch failed for subscription");
                    message
                }
            }
        })
    }
}

#[cfg(test)]
#[path = "interceptor_tests.rs"]
mod tests;
