// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use gqlsync_core::{ClientConfig, StaticTokenProvider, TokenProvider};
use gqlsync_realtime::{
    AuthProviders, SubscriptionConnectionFactory, SubscriptionConnectionState,
    SubscriptionItemEvent,
};
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tracing::info;

use crate::error::{Error, Result};

use super::{load_config, parse_variables};

pub fn run(config_path: &Path, query: String, variables: Option<&str>, token: Option<String>) -> Result<()> {
    let config = load_config(config_path)?;
    let variables = parse_variables(variables)?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(tail(&config, query, variables, token))
}

/// Auth providers available from the command line: the configured API key,
/// plus `token` for every token-based auth type.
pub(crate) fn auth_providers(token: Option<String>) -> AuthProviders {
    let providers = AuthProviders::new();
    let Some(token) = token else {
        return providers;
    };
    let provider: Arc<dyn TokenProvider> = Arc::new(StaticTokenProvider::new(token));
    providers
        .with_user_pools(provider.clone())
        .with_oidc(provider.clone())
        .with_lambda(provider)
}

async fn tail(
    config: &ClientConfig,
    query: String,
    variables: Option<Map<String, Value>>,
    token: Option<String>,
) -> Result<()> {
    let factory = SubscriptionConnectionFactory::from_config(config, auth_providers(token));
    let endpoint = config.endpoint()?;
    let auth_type = config.api.auth_type;
    let connection = factory
        .connection(&endpoint, auth_type)
        .ok_or(Error::AuthNotConfigured(auth_type.as_str()))?;

    let (item, events) = connection.subscribe(query, variables);
    info!(id = %item.id, endpoint = %endpoint, "subscribing");

    let interrupted = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let result = print_events(events, &mut std::io::stdout(), interrupted).await;
    connection.unsubscribe(&item);
    result
}

/// Print events as JSON lines until the stream ends, a terminal failure
/// arrives, or `stop` resolves.
pub(crate) async fn print_events(
    mut events: mpsc::UnboundedReceiver<SubscriptionItemEvent>,
    out: &mut impl Write,
    stop: impl std::future::Future<Output = ()>,
) -> Result<()> {
    tokio::pin!(stop);
    loop {
        let event = tokio::select! {
            _ = &mut stop => {
                info!("interrupted");
                return Ok(());
            }
            event = events.recv() => match event {
                Some(event) => event,
                None => return Ok(()),
            },
        };
        writeln!(out, "{}", format_event(&event))?;
        out.flush()?;
        if let SubscriptionItemEvent::Failed(e) = event {
            return Err(Error::SubscriptionFailed(e.to_string()));
        }
    }
}

pub(crate) fn format_event(event: &SubscriptionItemEvent) -> Value {
    match event {
        SubscriptionItemEvent::Connection(state) => {
            let state = match state {
                SubscriptionConnectionState::Connecting => "connecting",
                SubscriptionConnectionState::Connected => "connected",
                SubscriptionConnectionState::Disconnected => "disconnected",
            };
            json!({ "event": state })
        }
        SubscriptionItemEvent::Data(payload) => json!({ "event": "data", "payload": payload }),
        SubscriptionItemEvent::Failed(e) => json!({ "event": "error", "message": e.to_string() }),
    }
}

#[cfg(test)]
#[path = "subscribe_tests.rs"]
mod tests;
