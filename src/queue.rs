// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Deduplicating, rate-limited work queue.
//!
//! The queue turns a bursty, duplicated event stream into serialized per-key work:
//!
//! - A key that is already queued absorbs further [`WorkQueue::add`] calls.
//! - A key that is checked out (between [`WorkQueue::get`] and [`WorkQueue::done`]) is
//!   marked dirty by [`WorkQueue::add`] and re-queued exactly once when `done` is called.
//! - Failed keys are re-added after a per-key exponential delay with
//!   [`WorkQueue::add_rate_limited`] and reset with [`WorkQueue::forget`].
//! - [`WorkQueue::shut_down`] stops accepting keys; [`WorkQueue::get`] keeps handing out
//!   what is still queued and returns `None` once drained.
//!
//! Because a key is never handed to two workers at once, reconcilers need no per-key
//! locking.

use crate::metrics;
use crate::retry::{BackoffConfig, ItemBackoff};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::trace;

/// A key checked out of the queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueItem<K> {
    pub key: K,
    /// When the key was first added since it was last handed out
    pub enqueued_at: Instant,
    /// Rate-limited requeues since the key was last forgotten
    pub attempts: u32,
}

struct QueueState<K> {
    /// Keys waiting to be handed out, in order
    queue: VecDeque<K>,
    /// Keys that need processing, with their enqueue time. Superset of `queue`.
    dirty: HashMap<K, Instant>,
    /// Keys currently checked out by a worker
    processing: HashSet<K>,
    backoff: ItemBackoff<K>,
    shutting_down: bool,
}

struct Inner<K> {
    state: Mutex<QueueState<K>>,
    notify: Notify,
}

/// Cloneable handle to a shared work queue.
pub struct WorkQueue<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Debug + Send + 'static,
{
    pub fn new(backoff: BackoffConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    queue: VecDeque::new(),
                    dirty: HashMap::new(),
                    processing: HashSet::new(),
                    backoff: ItemBackoff::new(backoff),
                    shutting_down: false,
                }),
                notify: Notify::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<K>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `key` as needing processing.
    pub fn add(&self, key: K) {
        let mut state = self.lock();
        if state.shutting_down || state.dirty.contains_key(&key) {
            return;
        }

        state.dirty.insert(key.clone(), Instant::now());
        if state.processing.contains(&key) {
            trace!(key = ?key, "Key is being processed, marked dirty");
            return;
        }

        state.queue.push_back(key);
        metrics::set_queue_depth(state.queue.len());
        drop(state);
        self.inner.notify.notify_one();
    }

    /// Wait for the next key. Returns `None` once the queue is shut down and drained.
    pub async fn get(&self) -> Option<QueueItem<K>> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(key) = state.queue.pop_front() {
                    let enqueued_at = state.dirty.remove(&key).unwrap_or_else(Instant::now);
                    state.processing.insert(key.clone());
                    let attempts = state.backoff.requeues(&key);
                    metrics::set_queue_depth(state.queue.len());
                    return Some(QueueItem {
                        key,
                        enqueued_at,
                        attempts,
                    });
                }
                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Release a key obtained from [`WorkQueue::get`]. Re-queues it if it was added again
    /// while checked out.
    pub fn done(&self, key: &K) {
        let mut state = self.lock();
        state.processing.remove(key);
        if !state.dirty.contains_key(key) {
            return;
        }

        state.queue.push_back(key.clone());
        metrics::set_queue_depth(state.queue.len());
        drop(state);
        self.inner.notify.notify_one();
    }

    /// Re-add `key` after its next backoff delay.
    pub fn add_rate_limited(&self, key: K) {
        let delay = {
            let mut state = self.lock();
            if state.shutting_down {
                return;
            }
            state.backoff.next_delay(&key)
        };
        self.add_after(key, delay);
    }

    /// Re-add `key` once `delay` has elapsed.
    pub fn add_after(&self, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }

        trace!(key = ?key, delay = ?delay, "Scheduling delayed add");
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Clear the backoff history of `key`.
    pub fn forget(&self, key: &K) {
        self.lock().backoff.forget(key);
    }

    /// Rate-limited requeues of `key` since it was last forgotten.
    #[must_use]
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.lock().backoff.requeues(key)
    }

    /// Stop accepting keys and wake every waiting worker.
    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.inner.notify.notify_waiters();
    }

    /// Number of keys waiting to be handed out.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod queue_tests;
