// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Controller wiring.
//!
//! ```text
//! ResourceWatcher ──events──▶ forwarder ──add──▶ WorkQueue ◀──get/done── WorkerPool ──▶ RecordReconciler ──▶ etcd
//!        │                                         ▲                                      │
//!        └──────────── reflector cache ────────────┼──────────────────────────────────────┘
//!                                                  └── orphan sweeper (every resync period)
//! ```
//!
//! Everything is built once here and handed down explicitly. A single cancellation token
//! stops the watcher, the sweeper and the pool; the pool drains before returning.

use crate::codec::RecordCodec;
use crate::config::{ControllerConfig, StoreConfig};
use crate::context::Context;
use crate::health::HealthState;
use crate::key::ReconcileKey;
use crate::queue::WorkQueue;
use crate::reconciler::RecordReconciler;
use crate::store::KeyValueStore;
use crate::sweep::run_orphan_sweeper;
use crate::watcher::{ResourceEvent, ResourceWatcher};
use crate::worker::WorkerPool;
use kube::Client;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Run the controller until `cancel` fires.
///
/// # Errors
///
/// Returns an error if the watcher stops on its own; the remaining tasks are shut down
/// first.
pub async fn run_controller(
    client: Client,
    store: Arc<dyn KeyValueStore>,
    store_config: &StoreConfig,
    config: ControllerConfig,
    health: HealthState,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let watcher = ResourceWatcher::new(client, config.namespace.as_deref(), config.resync_period);
    let ctx = Arc::new(Context {
        cache: watcher.cache(),
        store,
        codec: RecordCodec::new(&store_config.prefix, &store_config.owner),
    });
    let queue = WorkQueue::new(config.backoff.clone());

    info!(
        namespace = config.namespace.as_deref().unwrap_or("<all>"),
        prefix = %store_config.prefix,
        owner = %store_config.owner,
        workers = config.workers,
        "Starting RpcService controller"
    );

    let (events, watch_task) = watcher.start(cancel.clone());
    let forwarder = tokio::spawn(forward_events(events, queue.clone()));
    let sweeper = tokio::spawn(run_orphan_sweeper(
        Arc::clone(&ctx),
        queue.clone(),
        config.resync_period,
        cancel.clone(),
    ));
    let pool = WorkerPool::new(
        queue,
        Arc::new(RecordReconciler::new(ctx)),
        config.workers,
        config.retry,
    );
    let pool_task = tokio::spawn(pool.run(cancel.clone()));

    health.mark_started();
    info!("Controller main loop started");

    if let Err(e) = watch_task.await {
        error!(error = %e, "Watcher task failed");
    }
    let unexpected = !cancel.is_cancelled();
    if unexpected {
        error!("CRITICAL: RpcService watcher exited unexpectedly, shutting down");
        cancel.cancel();
    }

    let tasks = [
        ("worker pool", pool_task),
        ("forwarder", forwarder),
        ("sweeper", sweeper),
    ];
    for (name, task) in tasks {
        if let Err(e) = task.await {
            error!(task = name, error = %e, "Task failed during shutdown");
        }
    }

    if unexpected {
        anyhow::bail!("RpcService watcher exited unexpectedly");
    }
    info!("Controller stopped");
    Ok(())
}

/// Move watcher notifications into the work queue until the watcher closes the channel.
pub async fn forward_events(
    mut events: mpsc::Receiver<ResourceEvent>,
    queue: WorkQueue<ReconcileKey>,
) {
    while let Some(event) = events.recv().await {
        debug!(key = %event.key, kind = %event.kind, "Queueing key");
        queue.add(event.key);
    }
    debug!("Event forwarder stopped");
}
