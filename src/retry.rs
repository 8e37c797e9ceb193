// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Per-key exponential backoff for the work queue.
//!
//! Every key that fails is requeued after a delay that doubles with each consecutive
//! failure, capped at a maximum interval, with randomization (jitter) to prevent a
//! thundering herd against the store after an outage. A success resets the key.
//!
//! # Retry Schedule
//!
//! With the default settings, retries of one key occur at approximately:
//!
//! 1. 100ms
//! 2. 200ms
//! 3. 400ms
//! 4. 800ms
//! 5. 1.6s
//! 6. 3.2s
//! 7. 6.4s
//! 8. 12.8s
//! 9. 25.6s
//! 10. 30s (capped at max interval)

use crate::constants::{
    RETRY_BACKOFF_MULTIPLIER, RETRY_INITIAL_INTERVAL_MILLIS, RETRY_MAX_INTERVAL_SECS,
    RETRY_RANDOMIZATION_FACTOR,
};
use rand::Rng;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

/// Shape of the backoff curve.
#[derive(Clone, Debug, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first retry
    pub initial_interval: Duration,
    /// Upper bound for any single delay
    pub max_interval: Duration,
    /// Growth factor per consecutive failure (typically 2.0 for doubling)
    pub multiplier: f64,
    /// Randomization factor (e.g., 0.1 for ±10%)
    pub randomization_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(RETRY_INITIAL_INTERVAL_MILLIS),
            max_interval: Duration::from_secs(RETRY_MAX_INTERVAL_SECS),
            multiplier: RETRY_BACKOFF_MULTIPLIER,
            randomization_factor: RETRY_RANDOMIZATION_FACTOR,
        }
    }
}

impl BackoffConfig {
    /// Delay before retry number `failures + 1`, without jitter.
    #[must_use]
    pub fn base_delay(&self, failures: u32) -> Duration {
        let exponent = i32::try_from(failures).unwrap_or(i32::MAX);
        let secs = self.initial_interval.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_interval.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Delay before retry number `failures + 1`, with jitter applied.
    #[must_use]
    pub fn delay(&self, failures: u32) -> Duration {
        self.apply_jitter(self.base_delay(failures))
    }

    /// Apply randomization (jitter) to an interval.
    fn apply_jitter(&self, interval: Duration) -> Duration {
        if self.randomization_factor == 0.0 {
            return interval;
        }

        let secs = interval.as_secs_f64();
        let delta = secs * self.randomization_factor;
        let min = secs - delta;
        let max = secs + delta;

        let jittered = rand::rng().random_range(min..=max);
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Failure counters per key.
#[derive(Debug)]
pub struct ItemBackoff<K> {
    config: BackoffConfig,
    failures: HashMap<K, u32>,
}

impl<K: Eq + Hash + Clone> ItemBackoff<K> {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            failures: HashMap::new(),
        }
    }

    /// Record one more failure for `key` and return how long to wait before retrying.
    pub fn next_delay(&mut self, key: &K) -> Duration {
        let count = self.failures.entry(key.clone()).or_insert(0);
        let delay = self.config.delay(*count);
        *count = count.saturating_add(1);
        delay
    }

    /// Number of failures recorded since the last [`ItemBackoff::forget`].
    #[must_use]
    pub fn requeues(&self, key: &K) -> u32 {
        self.failures.get(key).copied().unwrap_or(0)
    }

    /// Reset the failure count for `key`.
    pub fn forget(&mut self, key: &K) {
        self.failures.remove(key);
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
