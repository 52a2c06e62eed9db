// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent, strictly serialized mutation queue.
//!
//! One worker task runs mutations one at a time in submission order. Work
//! pauses while the network is unreachable and resumes when it returns.
//! Mutations persisted by an earlier process run before anything submitted
//! to this one, and report their outcome to the [`OfflineMutationDelegate`].

use std::sync::Arc;

use gqlsync_core::{GraphQLRequest, MutationRecord, MutationStore, ReachabilityWatcher};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::mutation_operation::{ConflictHandler, MutationContext, MutationOperation, MutationResult};

/// Receives results of mutations recovered from persistent storage.
pub trait OfflineMutationDelegate: Send + Sync {
    fn mutation_callback(&self, record_id: &str, operation: &str, result: &MutationResult);
}

struct Job {
    record_id: Option<String>,
    operation: String,
    request: GraphQLRequest,
    conflict: Option<ConflictHandler>,
    cancel: CancellationToken,
    reply: Option<oneshot::Sender<MutationResult>>,
}

/// Caller side of a submitted mutation.
pub struct MutationHandle {
    id: Option<String>,
    cancel: CancellationToken,
    result: oneshot::Receiver<MutationResult>,
}

impl MutationHandle {
    /// Persisted record id, when the record was saved.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Cancel the mutation. Its result is never delivered.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the outcome. `None` when cancelled or the queue shut down.
    pub async fn result(self) -> Option<MutationResult> {
        self.result.await.ok()
    }
}

pub struct MutationQueue {
    jobs: mpsc::UnboundedSender<Job>,
    store: Option<Arc<dyn MutationStore>>,
    shutdown: CancellationToken,
}

impl MutationQueue {
    /// Start the worker. Must be called within a tokio runtime.
    ///
    /// Records already in `store` are queued, oldest first, before this
    /// returns.
    pub fn new(
        context: MutationContext,
        store: Option<Arc<dyn MutationStore>>,
        delegate: Option<Arc<dyn OfflineMutationDelegate>>,
    ) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        if let Some(store) = &store {
            for job in load_persisted(store.as_ref()) {
                let _ = jobs.send(job);
            }
        }

        let worker = Worker {
            reachability: context.reachability.watch(),
            context,
            store: store.clone(),
            delegate,
            shutdown: shutdown.clone(),
        };
        tokio::spawn(worker.run(rx));

        MutationQueue {
            jobs,
            store,
            shutdown,
        }
    }

    /// Persist and enqueue a mutation.
    ///
    /// A persistence failure is logged and the mutation still runs, it just
    /// will not survive a restart.
    pub fn add(&self, request: GraphQLRequest, conflict: Option<ConflictHandler>) -> MutationHandle {
        let record_id = self.persist(&request);
        let cancel = CancellationToken::new();
        let (tx, rx) = oneshot::channel();

        let job = Job {
            record_id: record_id.clone(),
            operation: request.query.clone(),
            request,
            conflict,
            cancel: cancel.clone(),
            reply: Some(tx),
        };
        if self.jobs.send(job).is_err() {
            warn!("mutation queue worker has stopped");
        }

        MutationHandle {
            id: record_id,
            cancel,
            result: rx,
        }
    }

    fn persist(&self, request: &GraphQLRequest) -> Option<String> {
        let store = self.store.as_ref()?;
        let record = match MutationRecord::new(request) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "could not encode mutation for storage");
                return None;
            }
        };
        match store.save(&record) {
            Ok(()) => Some(record.id),
            Err(e) => {
                warn!(error = %e, "could not persist mutation");
                None
            }
        }
    }

    /// Stop the worker. An in-flight mutation is abandoned and its record
    /// stays queued for the next start.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for MutationQueue {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn load_persisted(store: &dyn MutationStore) -> Vec<Job> {
    let records = match store.list_queued() {
        Ok(records) => records,
        Err(e) => {
            warn!(error = %e, "could not load queued mutations");
            return Vec::new();
        }
    };
    if !records.is_empty() {
        info!(count = records.len(), "resuming queued mutations");
    }

    let mut jobs = Vec::with_capacity(records.len());
    for record in records {
        match record.request() {
            Ok(request) => jobs.push(Job {
                record_id: Some(record.id),
                operation: record.operation,
                request,
                conflict: None,
                cancel: CancellationToken::new(),
                reply: None,
            }),
            Err(e) => {
                warn!(id = %record.id, error = %e, "dropping undecodable mutation record");
                if let Err(e) = store.delete(&record.id) {
                    warn!(id = %record.id, error = %e, "could not delete mutation record");
                }
            }
        }
    }
    jobs
}

struct Worker {
    context: MutationContext,
    reachability: ReachabilityWatcher,
    store: Option<Arc<dyn MutationStore>>,
    delegate: Option<Arc<dyn OfflineMutationDelegate>>,
    shutdown: CancellationToken,
}

impl Worker {
    async fn run(mut self, mut jobs: mpsc::UnboundedReceiver<Job>) {
        loop {
            let job = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                job = jobs.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };
            if !self.process(job).await {
                break;
            }
        }
        debug!("mutation queue worker stopped");
    }

    /// Returns false when the queue is shutting down.
    async fn process(&mut self, job: Job) -> bool {
        if !self.wait_until_reachable(&job.cancel).await {
            return false;
        }
        if job.cancel.is_cancelled() {
            debug!(id = ?job.record_id, "skipping cancelled mutation");
            self.delete(job.record_id.as_deref());
            return true;
        }

        let mut operation = MutationOperation::new(job.request, self.context.clone(), job.cancel);
        if let Some(id) = &job.record_id {
            operation = operation.with_id(id.clone());
        }
        if let Some(conflict) = job.conflict {
            operation = operation.with_conflict_handler(conflict);
        }

        let result = tokio::select! {
            _ = self.shutdown.cancelled() => return false,
            result = operation.run() => result,
        };
        self.delete(job.record_id.as_deref());

        let Some(result) = result else {
            debug!(id = ?job.record_id, "mutation cancelled");
            return true;
        };
        match job.reply {
            Some(reply) => {
                let _ = reply.send(result);
            }
            None => {
                if let (Some(delegate), Some(id)) = (&self.delegate, &job.record_id) {
                    delegate.mutation_callback(id, &job.operation, &result);
                }
            }
        }
        true
    }

    /// Hold the queue while unreachable. A cancelled job does not need the
    /// network, so its cancellation releases the wait.
    async fn wait_until_reachable(&mut self, cancel: &CancellationToken) -> bool {
        while !self.reachability.is_reachable() {
            debug!("mutation queue suspended until network is reachable");
            tokio::select! {
                _ = self.shutdown.cancelled() => return false,
                _ = cancel.cancelled() => return true,
                _ = self.reachability.changed() => {}
            }
        }
        true
    }

    fn delete(&self, id: Option<&str>) {
        let (Some(store), Some(id)) = (&self.store, id) else {
            return;
        };
        if let Err(e) = store.delete(id) {
            warn!(id, error = %e, "could not delete mutation record");
        }
    }
}

#[cfg(test)]
#[path = "mutation_queue_tests.rs"]
mod tests;
