// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Orphan sweep.
//!
//! Deletes that happen while the controller is down never reach the watcher, so their
//! records would stay in the store forever. Once per resync period the whole root prefix
//! is listed and every owned entry whose service is gone, or has moved to another zone,
//! is recorded as a stale location and its key queued. The regular reconciler then
//! removes it.
//!
//! Entries without our owner id are never considered.

use crate::codec::normalize_zone;
use crate::context::Context;
use crate::errors::StoreError;
use crate::key::ReconcileKey;
use crate::metrics;
use crate::queue::WorkQueue;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Queue every key that owns entries no cached spec accounts for.
///
/// Returns the number of keys queued.
///
/// # Errors
///
/// Returns [`StoreError`] if the root prefix cannot be listed.
pub async fn sweep_orphans(
    ctx: &Context,
    queue: &WorkQueue<ReconcileKey>,
) -> Result<usize, StoreError> {
    let root = format!("{}/", ctx.codec.root());
    let entries = ctx.store.list_by_prefix(&root).await?;

    let mut orphaned = BTreeSet::new();
    for (entry_key, value) in &entries {
        if !ctx.codec.is_owned(entry_key, value) {
            continue;
        }
        let Some(location) = ctx.codec.decode_key(entry_key) else {
            debug!(key = %entry_key, "Owned entry outside the record layout");
            continue;
        };

        let published_zone = ctx
            .cache
            .get_cached(&location.key)
            .filter(|svc| !svc.is_deleting())
            .map(|svc| normalize_zone(&svc.spec.zone));
        if published_zone.as_deref() == Some(location.zone.as_str()) {
            continue;
        }

        ctx.cache.mark_stale(&location.key, &location.zone);
        orphaned.insert(location.key);
    }

    let count = orphaned.len();
    for key in orphaned {
        debug!(key = %key, "Queueing orphaned records");
        queue.add(key);
    }
    Ok(count)
}

/// Sweep once the cache is ready, then every `period` until `cancel` fires.
pub async fn run_orphan_sweeper(
    ctx: Arc<Context>,
    queue: WorkQueue<ReconcileKey>,
    period: Duration,
    cancel: CancellationToken,
) {
    tokio::select! {
        () = cancel.cancelled() => return,
        ready = ctx.cache.wait_until_ready() => {
            if let Err(e) = ready {
                warn!(error = %e, "Cache never became ready, orphan sweep disabled");
                return;
            }
        }
    }

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match sweep_orphans(&ctx, &queue).await {
                    Ok(0) => debug!("Orphan sweep found nothing"),
                    Ok(count) => info!(count, "Orphan sweep queued keys"),
                    Err(e) => {
                        warn!(error = %e, "Orphan sweep failed");
                        metrics::record_error(e.error_type());
                    }
                }
            }
        }
    }

    debug!("Orphan sweeper stopped");
}

#[cfg(test)]
#[path = "sweep_tests.rs"]
mod sweep_tests;
