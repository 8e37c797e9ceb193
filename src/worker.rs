// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Fixed-size pool of reconciliation workers.
//!
//! Every worker loops over `get → reconcile → report → done` on one shared
//! [`WorkQueue`]. The queue never hands a key to two workers at once, so no further
//! locking is needed here.
//!
//! Failure handling per key:
//!
//! - success: backoff history is forgotten
//! - retryable failure below the retry ceiling: requeued with per-key backoff
//! - retryable failure at the ceiling: logged once as an error, counted, forgotten
//! - permanent failure: logged, counted, forgotten
//!
//! A failing key never stops the pool or delays other keys.

use crate::config::RetryCeiling;
use crate::errors::ReconcileError;
use crate::key::ReconcileKey;
use crate::metrics;
use crate::queue::{QueueItem, WorkQueue};
use crate::reconciler::{Outcome, Reconciler};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Worker pool draining a shared queue.
pub struct WorkerPool {
    queue: WorkQueue<ReconcileKey>,
    reconciler: Arc<dyn Reconciler>,
    workers: usize,
    retry: RetryCeiling,
}

impl WorkerPool {
    pub fn new(
        queue: WorkQueue<ReconcileKey>,
        reconciler: Arc<dyn Reconciler>,
        workers: usize,
        retry: RetryCeiling,
    ) -> Self {
        Self {
            queue,
            reconciler,
            workers: workers.max(1),
            retry,
        }
    }

    /// Run until `cancel` fires, then shut the queue down and wait for every in-flight
    /// reconciliation to finish.
    pub async fn run(self, cancel: CancellationToken) {
        info!(workers = self.workers, retry = ?self.retry, "Starting worker pool");

        let mut workers = JoinSet::new();
        for id in 0..self.workers {
            let worker = Worker {
                id,
                queue: self.queue.clone(),
                reconciler: Arc::clone(&self.reconciler),
                retry: self.retry,
            };
            workers.spawn(worker.run());
        }

        let queue = self.queue.clone();
        let shutdown = tokio::spawn(async move {
            cancel.cancelled().await;
            info!("Shutdown requested, draining work queue");
            queue.shut_down();
        });

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Worker task failed");
            }
        }
        shutdown.abort();

        info!("Worker pool stopped");
    }
}

struct Worker {
    id: usize,
    queue: WorkQueue<ReconcileKey>,
    reconciler: Arc<dyn Reconciler>,
    retry: RetryCeiling,
}

impl Worker {
    async fn run(self) {
        debug!(worker = self.id, "Worker started");
        while let Some(item) = self.queue.get().await {
            self.process(item).await;
        }
        debug!(worker = self.id, "Worker stopped");
    }

    async fn process(&self, item: QueueItem<ReconcileKey>) {
        metrics::record_queue_wait(item.enqueued_at.elapsed());

        let start = Instant::now();
        let result = self.reconciler.reconcile(&item.key).await;
        self.report(&item, result, start.elapsed());

        self.queue.done(&item.key);
    }

    fn report(
        &self,
        item: &QueueItem<ReconcileKey>,
        result: Result<Outcome, ReconcileError>,
        elapsed: Duration,
    ) {
        let key = &item.key;
        let e = match result {
            Ok(outcome) => {
                metrics::record_reconciliation_success(outcome.as_str(), elapsed);
                self.queue.forget(key);
                return;
            }
            Err(e) => e,
        };

        metrics::record_reconciliation_error(e.error_type(), elapsed);

        if !e.is_retryable() {
            error!(key = %key, error = %e, "Permanent reconciliation failure, dropping key");
            metrics::record_dropped_key("permanent_error");
            self.queue.forget(key);
            return;
        }

        let requeues = self.queue.num_requeues(key);
        if self.retry.allows(requeues) {
            warn!(
                key = %key,
                attempt = requeues + 1,
                error = %e,
                "Reconciliation failed, requeueing with backoff"
            );
            metrics::record_requeue(e.error_type());
            self.queue.add_rate_limited(key.clone());
        } else {
            error!(
                key = %key,
                attempts = requeues + 1,
                error = %e,
                "Giving up on key after exhausting retries"
            );
            metrics::record_dropped_key("retries_exhausted");
            self.queue.forget(key);
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod worker_tests;
