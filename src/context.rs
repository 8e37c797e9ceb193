// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for the reconciliation workers.
//!
//! Everything a worker needs is constructed once at startup and handed to the pool as
//! an `Arc<Context>`:
//! - The watcher's reflector cache of `RpcService` specs
//! - The key-value store client
//! - The record codec bound to the configured root prefix and owner id
//!
//! The cache is written only by the watcher. Workers read it on every dequeue so they
//! always act on the freshest observed spec.

use crate::codec::{normalize_zone, RecordCodec};
use crate::crd::RpcService;
use crate::key::ReconcileKey;
use crate::store::KeyValueStore;
use kube::runtime::reflector::Store;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared context passed to every worker.
#[derive(Clone)]
pub struct Context {
    /// Authoritative cache of observed specs
    pub cache: ResourceCache,

    /// Key-value store the records are written to
    pub store: Arc<dyn KeyValueStore>,

    /// Mapping between specs and store entries
    pub codec: RecordCodec,
}

/// Read view of the watcher's reflector store plus remembered record locations.
///
/// Only the key travels through the work queue. When a spec disappears, or moves to a
/// different zone, the zone its records were published under is remembered here as a
/// *stale location* until a worker has cleaned it up.
#[derive(Clone)]
pub struct ResourceCache {
    store: Store<RpcService>,
    stale: Arc<Mutex<HashMap<ReconcileKey, BTreeSet<String>>>>,
}

impl ResourceCache {
    #[must_use]
    pub fn new(store: Store<RpcService>) -> Self {
        Self {
            store,
            stale: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn stale(&self) -> MutexGuard<'_, HashMap<ReconcileKey, BTreeSet<String>>> {
        self.stale.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Latest observed spec for `key`, if it exists.
    #[must_use]
    pub fn get_cached(&self, key: &ReconcileKey) -> Option<Arc<RpcService>> {
        self.store.get(&key.object_ref())
    }

    /// Keys of every cached spec.
    #[must_use]
    pub fn keys(&self) -> Vec<ReconcileKey> {
        self.store
            .state()
            .iter()
            .map(|svc| svc.reconcile_key())
            .collect()
    }

    /// Block until the initial list has been loaded into the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the watcher was dropped before the first list completed.
    pub async fn wait_until_ready(&self) -> anyhow::Result<()> {
        self.store.wait_until_ready().await?;
        Ok(())
    }

    /// Remember that `key` may still have records under `zone`.
    pub fn mark_stale(&self, key: &ReconcileKey, zone: &str) {
        let zone = normalize_zone(zone);
        if zone.is_empty() {
            return;
        }
        self.stale().entry(key.clone()).or_default().insert(zone);
    }

    /// Zones that may still hold records of `key`.
    #[must_use]
    pub fn stale_zones(&self, key: &ReconcileKey) -> BTreeSet<String> {
        self.stale().get(key).cloned().unwrap_or_default()
    }

    /// Forget the given stale zones of `key` once they have been cleaned up.
    ///
    /// Zones recorded after `zones` was read are kept.
    pub fn clear_stale(&self, key: &ReconcileKey, zones: &BTreeSet<String>) {
        let mut stale = self.stale();
        if let Some(current) = stale.get_mut(key) {
            current.retain(|zone| !zones.contains(zone));
            if current.is_empty() {
                stale.remove(key);
            }
        }
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
