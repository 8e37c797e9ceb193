// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `RpcService` reconciliation logic.
//!
//! Each dequeued key is reconciled from scratch:
//!
//! 1. **Resolve** the latest spec from the watcher cache. A missing spec, or one marked
//!    for deletion, means the records must go.
//! 2. **Clean up stale locations**: zones the key was published under before a delete
//!    or zone change. Owned entries found there are deleted.
//! 3. **Load** the entries currently stored under the record prefix.
//! 4. **Diff** them against the encoded spec and apply only the differences.
//!
//! Running the same reconciliation twice against unchanged inputs issues no writes.

use crate::codec::{normalize_zone, RecordCodec};
use crate::context::Context;
use crate::errors::ReconcileError;
use crate::key::ReconcileKey;
use crate::metrics;
use crate::store::KeyValueStore;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a successful reconciliation did to the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Records were written where none existed
    Created,
    /// Existing records were changed
    Updated,
    /// All records were removed
    Deleted,
    /// Store already matched the spec
    NoOp,
}

impl Outcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Created => "created",
            Outcome::Updated => "updated",
            Outcome::Deleted => "deleted",
            Outcome::NoOp => "noop",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-key state transition invoked by the worker pool.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Bring the store in line with the cached spec of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] if the store fails or the spec cannot be encoded.
    async fn reconcile(&self, key: &ReconcileKey) -> Result<Outcome, ReconcileError>;
}

/// Reconciler writing CoreDNS etcd records.
#[derive(Clone)]
pub struct RecordReconciler {
    ctx: Arc<Context>,
}

impl RecordReconciler {
    #[must_use]
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Reconciler for RecordReconciler {
    async fn reconcile(&self, key: &ReconcileKey) -> Result<Outcome, ReconcileError> {
        reconcile_rpc_service(&self.ctx, key).await
    }
}

/// Reconcile a single `RpcService` key.
///
/// # Errors
///
/// Returns [`ReconcileError::Store`] if a store call fails and [`ReconcileError::Codec`]
/// if the spec cannot be encoded. Store failures leave stale locations in place so the
/// next attempt retries the cleanup.
pub async fn reconcile_rpc_service(
    ctx: &Context,
    key: &ReconcileKey,
) -> Result<Outcome, ReconcileError> {
    let cached = ctx.cache.get_cached(key);
    let desired = cached.as_deref().filter(|svc| !svc.is_deleting());
    let desired_zone = desired.map(|svc| normalize_zone(&svc.spec.zone));

    debug!(
        key = %key,
        present = desired.is_some(),
        deleting = cached.as_deref().is_some_and(|svc| svc.is_deleting()),
        "Reconciling RpcService"
    );

    // A stale zone that is still the desired one stays marked until the cache moves on.
    let mut stale_deletes = 0;
    let mut cleaned = BTreeSet::new();
    for zone in ctx.cache.stale_zones(key) {
        if desired_zone.as_ref() == Some(&zone) {
            continue;
        }
        match ctx.codec.record_prefix(key, &zone) {
            Ok(prefix) => {
                stale_deletes += delete_owned(ctx.store.as_ref(), &ctx.codec, &prefix).await?;
            }
            Err(e) => warn!(key = %key, zone = %zone, error = %e, "Skipping unusable stale zone"),
        }
        cleaned.insert(zone);
    }
    if !cleaned.is_empty() {
        ctx.cache.clear_stale(key, &cleaned);
    }

    let Some(svc) = cached.as_deref() else {
        return Ok(finish(key, stale_deletes, Outcome::Deleted));
    };

    if svc.is_deleting() {
        let prefix = ctx.codec.record_prefix(key, &svc.spec.zone)?;
        let deleted = delete_owned(ctx.store.as_ref(), &ctx.codec, &prefix).await?;
        return Ok(finish(key, stale_deletes + deleted, Outcome::Deleted));
    }

    let record = ctx.codec.encode(svc)?;
    let current = list_records(ctx.store.as_ref(), &record.prefix).await?;
    let diff = ctx.codec.diff(&record, &current)?;

    for (entry_key, value) in &diff.puts {
        ctx.store.put(entry_key, value).await?;
        metrics::record_store_write("put");
    }
    for entry_key in &diff.deletes {
        ctx.store.delete(entry_key).await?;
        metrics::record_store_write("delete");
    }

    let writes = stale_deletes + diff.puts.len() + diff.deletes.len();
    let changed = if record.is_empty() {
        Outcome::Deleted
    } else if current.is_empty() {
        Outcome::Created
    } else {
        Outcome::Updated
    };
    Ok(finish(key, writes, changed))
}

fn finish(key: &ReconcileKey, writes: usize, changed: Outcome) -> Outcome {
    if writes == 0 {
        debug!(key = %key, "Store already converged");
        return Outcome::NoOp;
    }
    info!(key = %key, outcome = %changed, writes, "Reconciled RpcService");
    changed
}

/// Entries stored directly below `prefix`.
///
/// Deeper keys belong to other services whose labels happen to extend this prefix.
async fn list_records(
    store: &dyn KeyValueStore,
    prefix: &str,
) -> Result<Vec<(String, String)>, ReconcileError> {
    let dir = format!("{prefix}/");
    let entries = store.list_by_prefix(&dir).await?;
    Ok(entries
        .into_iter()
        .filter(|(key, _)| {
            key.strip_prefix(&dir)
                .is_some_and(|leaf| !leaf.is_empty() && !leaf.contains('/'))
        })
        .collect())
}

/// Delete every owned entry directly below `prefix`. Returns the number deleted.
async fn delete_owned(
    store: &dyn KeyValueStore,
    codec: &RecordCodec,
    prefix: &str,
) -> Result<usize, ReconcileError> {
    let mut deleted = 0;
    for (key, value) in list_records(store, prefix).await? {
        if !codec.is_owned(&key, &value) {
            debug!(key = %key, "Leaving foreign entry in place");
            continue;
        }
        store.delete(&key).await?;
        metrics::record_store_write("delete");
        deleted += 1;
    }
    Ok(deleted)
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod reconciler_tests;
