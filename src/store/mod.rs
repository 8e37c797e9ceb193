// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Key-value store access.
//!
//! The reconciler only talks to the store through [`KeyValueStore`]. The production
//! implementation is [`EtcdStore`], a single multiplexed etcd v3 client shared by every
//! worker.
//!
//! Every operation reports failures as [`StoreError`]: `Unavailable` for anything that
//! may succeed later and `Rejected` for requests the store will never accept.

pub mod etcd;

pub use etcd::EtcdStore;

use crate::errors::StoreError;
use async_trait::async_trait;

/// Minimal key-value contract used by the reconciler and orphan sweep.
///
/// Implementations must be safe for concurrent use from many workers.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a single key. Absent keys are `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a single key atomically.
    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a single key. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// All `(key, value)` pairs whose key starts with `prefix`, ordered by key.
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError>;
}
