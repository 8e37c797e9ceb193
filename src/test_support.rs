// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared fixtures for unit tests.
//!
//! [`MemoryStore`] is an in-memory [`KeyValueStore`] that counts writes and can be told
//! to fail, so reconciler and worker tests run without an etcd cluster.

use crate::codec::RecordCodec;
use crate::context::{Context, ResourceCache};
use crate::crd::{RpcEndpoint, RpcProtocol, RpcService, RpcServiceSpec};
use crate::errors::StoreError;
use crate::store::KeyValueStore;
use async_trait::async_trait;
use kube::api::ObjectMeta;
use kube::runtime::reflector::{self, store::Writer};
use kube::runtime::watcher;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const TEST_ROOT: &str = "/skydns";
pub const TEST_OWNER: &str = "rpc-controller";

/// Build an `RpcService` with the given endpoints.
pub fn rpc_service(ns: &str, name: &str, zone: &str, endpoints: Vec<RpcEndpoint>) -> RpcService {
    RpcService {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(ns.to_string()),
            ..Default::default()
        },
        spec: RpcServiceSpec {
            zone: zone.to_string(),
            endpoints,
            ttl: None,
        },
    }
}

/// Build a gRPC endpoint.
pub fn endpoint(name: &str, host: &str, port: u16) -> RpcEndpoint {
    RpcEndpoint {
        name: name.to_string(),
        host: host.to_string(),
        port,
        protocol: RpcProtocol::Grpc,
    }
}

/// Failure mode injected into [`MemoryStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Failure {
    Unavailable,
    Rejected,
}

/// In-memory key-value store for tests.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<BTreeMap<String, String>>,
    failure: Mutex<Option<Failure>>,
    puts: AtomicUsize,
    deletes: AtomicUsize,
    calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every following call fail with `failure` (or succeed again with `None`).
    pub fn fail_with(&self, failure: Option<Failure>) {
        *self.failure.lock().unwrap() = failure;
    }

    /// Insert a value without counting it as a write.
    pub fn seed(&self, key: &str, value: &str) {
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.data.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.data.lock().unwrap().keys().cloned().collect()
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.puts() + self.deletes()
    }

    /// Every call, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.puts.store(0, Ordering::SeqCst);
        self.deletes.store(0, Ordering::SeqCst);
        self.calls.store(0, Ordering::SeqCst);
    }

    fn check(&self, op: &'static str, key: &str) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match *self.failure.lock().unwrap() {
            None => Ok(()),
            Some(Failure::Unavailable) => Err(StoreError::Unavailable {
                op,
                key: key.to_string(),
                reason: "connection refused".to_string(),
            }),
            Some(Failure::Rejected) => Err(StoreError::Rejected {
                op,
                key: key.to_string(),
                reason: "permission denied".to_string(),
            }),
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check("get", key)?;
        Ok(self.value(key))
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check("put", key)?;
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.seed(key, value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check("delete", key)?;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.data.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError> {
        self.check("list", prefix)?;
        Ok(self
            .data
            .lock()
            .unwrap()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// A reflector cache plus the writer that feeds it.
pub struct TestCache {
    pub cache: ResourceCache,
    pub writer: Writer<RpcService>,
}

impl TestCache {
    pub fn new() -> Self {
        let (reader, writer) = reflector::store::<RpcService>();
        Self {
            cache: ResourceCache::new(reader),
            writer,
        }
    }

    /// Finish an empty initial list so the cache reports ready.
    ///
    /// Call before applying anything: the relist swap replaces the cached state.
    pub fn complete_initial_list(&mut self) {
        self.writer.apply_watcher_event(&watcher::Event::Init);
        self.writer.apply_watcher_event(&watcher::Event::InitDone);
    }

    pub fn apply(&mut self, svc: RpcService) {
        self.writer.apply_watcher_event(&watcher::Event::Apply(svc));
    }

    pub fn delete(&mut self, svc: RpcService) {
        self.writer.apply_watcher_event(&watcher::Event::Delete(svc));
    }
}

/// Context over a fresh cache and the given store.
pub fn context(store: Arc<MemoryStore>) -> (Context, TestCache) {
    let cache = TestCache::new();
    let ctx = Context {
        cache: cache.cache.clone(),
        store,
        codec: RecordCodec::new(TEST_ROOT, TEST_OWNER),
    };
    (ctx, cache)
}
