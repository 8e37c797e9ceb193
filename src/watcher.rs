// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Resource watcher feeding the work queue.
//!
//! Wraps a kube-rs [`watcher`] over `RpcService` and keeps a reflector cache in sync with
//! it. Every watch event is applied to the cache *before* the corresponding
//! [`ResourceEvent`] is published, so a worker that dequeues a key always reads a spec at
//! least as fresh as the event that queued it.
//!
//! ## Event mapping
//!
//! | watch event            | cache                   | published                       |
//! |------------------------|-------------------------|---------------------------------|
//! | `Apply`                | insert / replace        | `Added` or `Updated`            |
//! | `Delete`               | remove                  | `Deleted`                       |
//! | `Init` + `InitApply`   | buffered                | nothing yet                     |
//! | `InitDone`             | buffer swapped in       | `Resync` per listed key, `Deleted` for vanished keys |
//!
//! A dropped connection is retried by `default_backoff` and ends in a fresh re-list, so
//! changes missed during the gap are recovered through the `InitDone` handling above.
//! Independently of the transport, every cached key is re-published as `Resync` once
//! per resync period.

use crate::codec::normalize_zone;
use crate::constants::WATCH_EVENT_CHANNEL_CAPACITY;
use crate::context::ResourceCache;
use crate::crd::RpcService;
use crate::key::ReconcileKey;
use crate::metrics;
use futures::{Stream, StreamExt};
use kube::runtime::reflector::{self, store::Writer};
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, Client};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What happened to a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Added,
    Updated,
    Deleted,
    /// Periodic or post-relist re-notification of an existing key
    Resync,
}

impl EventKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Added => "added",
            EventKind::Updated => "updated",
            EventKind::Deleted => "deleted",
            EventKind::Resync => "resync",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `(key, kind)` notification. The spec itself is read back from the cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceEvent {
    pub key: ReconcileKey,
    pub kind: EventKind,
}

impl ResourceEvent {
    fn new(key: ReconcileKey, kind: EventKind) -> Self {
        Self { key, kind }
    }
}

/// Applies watch events to the reflector cache and derives notifications from them.
///
/// Kept separate from the transport so relist handling can be exercised without a
/// cluster.
pub struct CacheWriter {
    writer: Writer<RpcService>,
    cache: ResourceCache,
    /// Keys seen since the last `Init`, while a relist is in progress
    relisting: Option<HashSet<ReconcileKey>>,
}

impl CacheWriter {
    #[must_use]
    pub fn new() -> Self {
        let (reader, writer) = reflector::store::<RpcService>();
        Self {
            writer,
            cache: ResourceCache::new(reader),
            relisting: None,
        }
    }

    /// Read handle to the cache this writer maintains.
    #[must_use]
    pub fn cache(&self) -> ResourceCache {
        self.cache.clone()
    }

    /// Apply one watch event and return the notifications it produces.
    pub fn apply(&mut self, event: Event<RpcService>) -> Vec<ResourceEvent> {
        match event {
            Event::Apply(svc) => {
                let key = svc.reconcile_key();
                let previous = self.cache.get_cached(&key);
                if let Some(prev) = &previous {
                    self.remember_zone_move(&key, &prev.spec.zone, &svc.spec.zone);
                }

                self.writer.apply_watcher_event(&Event::Apply(svc));
                let kind = if previous.is_some() {
                    EventKind::Updated
                } else {
                    EventKind::Added
                };
                vec![ResourceEvent::new(key, kind)]
            }
            Event::Delete(svc) => {
                let key = svc.reconcile_key();
                if let Some(prev) = self.cache.get_cached(&key) {
                    self.cache.mark_stale(&key, &prev.spec.zone);
                }
                self.cache.mark_stale(&key, &svc.spec.zone);

                self.writer.apply_watcher_event(&Event::Delete(svc));
                vec![ResourceEvent::new(key, EventKind::Deleted)]
            }
            Event::Init => {
                debug!("Relist started");
                self.relisting = Some(HashSet::new());
                self.writer.apply_watcher_event(&Event::Init);
                Vec::new()
            }
            Event::InitApply(svc) => {
                let key = svc.reconcile_key();
                if let Some(prev) = self.cache.get_cached(&key) {
                    self.remember_zone_move(&key, &prev.spec.zone, &svc.spec.zone);
                }
                self.relisting.get_or_insert_with(HashSet::new).insert(key);
                self.writer.apply_watcher_event(&Event::InitApply(svc));
                Vec::new()
            }
            Event::InitDone => self.finish_relist(),
        }
    }

    /// Swap in the relisted state, reporting vanished keys as deleted.
    fn finish_relist(&mut self) -> Vec<ResourceEvent> {
        let listed = self.relisting.take().unwrap_or_default();
        let before: HashMap<ReconcileKey, String> = self
            .cache
            .keys()
            .into_iter()
            .filter_map(|key| {
                let zone = self.cache.get_cached(&key)?.spec.zone.clone();
                Some((key, zone))
            })
            .collect();

        self.writer.apply_watcher_event(&Event::InitDone);

        let mut events = Vec::with_capacity(listed.len());
        let mut vanished: Vec<_> = before
            .into_iter()
            .filter(|(key, _)| !listed.contains(key))
            .collect();
        vanished.sort();
        for (key, zone) in vanished {
            debug!(key = %key, "Key vanished during relist");
            self.cache.mark_stale(&key, &zone);
            events.push(ResourceEvent::new(key, EventKind::Deleted));
        }

        let mut listed: Vec<_> = listed.into_iter().collect();
        listed.sort();
        events.extend(
            listed
                .into_iter()
                .map(|key| ResourceEvent::new(key, EventKind::Resync)),
        );

        info!(events = events.len(), "Relist complete");
        events
    }

    fn remember_zone_move(&self, key: &ReconcileKey, old_zone: &str, new_zone: &str) {
        if normalize_zone(old_zone) != normalize_zone(new_zone) {
            debug!(key = %key, old_zone, new_zone, "Zone changed");
            self.cache.mark_stale(key, old_zone);
        }
    }

    /// One `Resync` notification per cached key.
    #[must_use]
    pub fn resync_events(&self) -> Vec<ResourceEvent> {
        let mut keys = self.cache.keys();
        keys.sort();
        keys.into_iter()
            .map(|key| ResourceEvent::new(key, EventKind::Resync))
            .collect()
    }
}

impl Default for CacheWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Watches `RpcService` resources and publishes [`ResourceEvent`]s.
pub struct ResourceWatcher {
    api: Api<RpcService>,
    writer: CacheWriter,
    resync_period: Duration,
}

impl ResourceWatcher {
    /// Watch one namespace, or all of them when `namespace` is `None`.
    #[must_use]
    pub fn new(client: Client, namespace: Option<&str>, resync_period: Duration) -> Self {
        let api = match namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        };
        Self {
            api,
            writer: CacheWriter::new(),
            resync_period,
        }
    }

    /// The cache kept current by this watcher.
    #[must_use]
    pub fn cache(&self) -> ResourceCache {
        self.writer.cache()
    }

    /// Start watching in a background task.
    ///
    /// The returned channel closes when `cancel` fires or the watch stream ends.
    pub fn start(
        self,
        cancel: CancellationToken,
    ) -> (mpsc::Receiver<ResourceEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(WATCH_EVENT_CHANNEL_CAPACITY);
        let handle = tokio::spawn(self.run(tx, cancel));
        (rx, handle)
    }

    async fn run(self, tx: mpsc::Sender<ResourceEvent>, cancel: CancellationToken) {
        info!(resync_period = ?self.resync_period, "Starting RpcService watcher");

        let stream =
            watcher::watcher(self.api.clone(), watcher::Config::default()).default_backoff();
        watch_loop(self.writer, stream, self.resync_period, tx, cancel).await;

        info!("RpcService watcher stopped");
    }
}

/// Drive `stream` through `writer`, interleaving periodic resyncs, until `cancel` fires,
/// the stream ends, or the receiver goes away.
///
/// Stream errors are logged and skipped; the stream is expected to back off and re-list
/// on its own.
async fn watch_loop<S>(
    mut writer: CacheWriter,
    stream: S,
    resync_period: Duration,
    tx: mpsc::Sender<ResourceEvent>,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<Event<RpcService>, watcher::Error>>,
{
    let mut stream = std::pin::pin!(stream);

    let start = tokio::time::Instant::now() + resync_period;
    let mut resync = tokio::time::interval_at(start, resync_period);
    resync.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        let events = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = resync.tick() => {
                debug!("Periodic resync");
                writer.resync_events()
            }
            next = stream.next() => match next {
                Some(Ok(event)) => writer.apply(event),
                Some(Err(e)) => {
                    warn!(error = %e, "Watch error, retrying with backoff");
                    metrics::record_error("watch");
                    continue;
                }
                None => {
                    warn!("Watch stream ended");
                    break;
                }
            },
        };

        if !publish(&tx, events).await {
            debug!("Event receiver dropped, stopping watcher");
            break;
        }
    }
}

/// Send events in order. Returns `false` once the receiver is gone.
async fn publish(tx: &mpsc::Sender<ResourceEvent>, events: Vec<ResourceEvent>) -> bool {
    for event in events {
        metrics::record_watch_event(event.kind.as_str());
        if tx.send(event).await.is_err() {
            return false;
        }
    }
    true
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod watcher_tests;
