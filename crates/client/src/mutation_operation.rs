// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! A single mutation attempt chain: optional upload, then send, retrying
//! transient network failures until they clear.

use std::sync::Arc;

use gqlsync_core::{
    is_retryable_network_error, BinaryObject, GraphQLRequest, ReachabilityNotifier, RequestError,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::network::{GraphQLResponse, NetworkTransport, ObjectUploader};
use crate::retry_notifier::{RetryNotifier, RetrySignal};

/// Receives the server state of a conflicting record and may return a
/// replacement request to send once in place of the original.
pub type ConflictHandler = Box<dyn FnOnce(Option<Value>) -> Option<GraphQLRequest> + Send>;

/// Outcome of a mutation. `None` from [`MutationOperation::run`] means the
/// operation was cancelled and nobody should be notified.
pub type MutationResult = Result<GraphQLResponse, RequestError>;

/// Collaborators shared by every mutation of a client.
#[derive(Clone)]
pub struct MutationContext {
    pub transport: Arc<dyn NetworkTransport>,
    pub uploader: Option<Arc<dyn ObjectUploader>>,
    pub reachability: Arc<ReachabilityNotifier>,
}

impl MutationContext {
    pub fn new(transport: Arc<dyn NetworkTransport>, reachability: Arc<ReachabilityNotifier>) -> Self {
        MutationContext {
            transport,
            uploader: None,
            reachability,
        }
    }

    pub fn with_uploader(mut self, uploader: Arc<dyn ObjectUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Unknown,
    S3Upload,
    GraphqlOperation,
    Finished,
}

pub struct MutationOperation {
    id: Option<String>,
    request: GraphQLRequest,
    binary_object: Option<BinaryObject>,
    state: OperationState,
    attempt: u32,
    conflict: Option<ConflictHandler>,
    context: MutationContext,
    cancel: CancellationToken,
}

impl MutationOperation {
    /// The first step is fixed here: upload when the request references a
    /// binary object, otherwise send straight away.
    pub fn new(request: GraphQLRequest, context: MutationContext, cancel: CancellationToken) -> Self {
        let binary_object = request.binary_object();
        let state = if binary_object.is_some() {
            OperationState::S3Upload
        } else {
            OperationState::GraphqlOperation
        };
        MutationOperation {
            id: None,
            request,
            binary_object,
            state,
            attempt: 1,
            conflict: None,
            context,
            cancel,
        }
    }

    /// Tag the operation with its persisted record id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_conflict_handler(mut self, handler: ConflictHandler) -> Self {
        self.conflict = Some(handler);
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    /// Drive the operation to completion.
    pub async fn run(mut self) -> Option<MutationResult> {
        let cancel = self.cancel.clone();
        let mut notifier = RetryNotifier::new(self.context.reachability.watch(), cancel.clone());
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return None,
                outcome = self.step() => outcome,
            };
            match outcome {
                Err(e) if is_retryable_network_error(&e) => {
                    debug!(id = ?self.id, attempt = self.attempt, error = %e, "mutation hit network error, scheduling retry");
                    let attempt = self.attempt;
                    self.attempt += 1;
                    if notifier.wait(attempt).await == RetrySignal::Cancelled {
                        return None;
                    }
                }
                outcome => {
                    self.state = OperationState::Finished;
                    return Some(outcome);
                }
            }
        }
    }

    async fn step(&mut self) -> MutationResult {
        if self.state == OperationState::S3Upload {
            self.upload().await?;
            self.state = OperationState::GraphqlOperation;
        }
        self.send().await
    }

    async fn upload(&mut self) -> Result<(), RequestError> {
        let Some(object) = self.binary_object.clone() else {
            return Ok(());
        };
        let Some(uploader) = &self.context.uploader else {
            return Err(RequestError::Other(
                "mutation references a binary object but no uploader is configured".to_string(),
            ));
        };
        debug!(id = ?self.id, bucket = %object.bucket, key = %object.key, "uploading binary object");
        uploader.upload(object).await
    }

    async fn send(&mut self) -> MutationResult {
        debug!(id = ?self.id, "sending mutation");
        let response = self.context.transport.send(self.request.clone()).await?;
        let Some(conflict) = response.conflict() else {
            return Ok(response);
        };
        let Some(handler) = self.conflict.take() else {
            return Ok(response);
        };
        warn!(id = ?self.id, message = %conflict.message, "mutation rejected by conditional check");
        match handler(conflict.data.clone()) {
            Some(replacement) => {
                self.request = replacement;
                self.context.transport.send(self.request.clone()).await
            }
            None => Ok(response),
        }
    }
}

#[cfg(test)]
#[path = "mutation_operation_tests.rs"]
mod tests;
