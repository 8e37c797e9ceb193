// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! etcd v3 implementation of [`KeyValueStore`].
//!
//! One [`etcd_client::Client`] is created at startup over mutual TLS. Its gRPC channel is
//! multiplexed, so each call clones the cheap `KvClient` handle instead of opening a
//! connection per worker.

use super::KeyValueStore;
use crate::config::StoreConfig;
use crate::errors::StoreError;
use async_trait::async_trait;
use etcd_client::{
    Certificate, Client, ConnectOptions, GetOptions, Identity, SortOrder, SortTarget, TlsOptions,
};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

/// gRPC status codes that retrying cannot fix.
///
/// `INVALID_ARGUMENT` (3), `PERMISSION_DENIED` (7), `FAILED_PRECONDITION` (9),
/// `OUT_OF_RANGE` (11) and `UNAUTHENTICATED` (16). Everything else, including
/// `UNAVAILABLE`, `DEADLINE_EXCEEDED` and `ABORTED`, is treated as transient.
const PERMANENT_GRPC_CODES: [i32; 5] = [3, 7, 9, 11, 16];

/// Shared etcd client with a per-call timeout.
#[derive(Clone)]
pub struct EtcdStore {
    client: Client,
    timeout: Duration,
}

impl EtcdStore {
    /// Connect to the configured endpoints using the configured client certificate.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the endpoints cannot be reached or the TLS material is
    /// rejected.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let tls = TlsOptions::new()
            .ca_certificate(Certificate::from_pem(&config.tls.ca_pem))
            .identity(Identity::from_pem(
                &config.tls.cert_pem,
                &config.tls.key_pem,
            ));
        let options = ConnectOptions::new()
            .with_tls(tls)
            .with_timeout(config.timeout)
            .with_connect_timeout(config.connect_timeout);

        let joined = config.endpoints.join(",");
        debug!(endpoints = %joined, "Connecting to etcd");
        let client = Client::connect(&config.endpoints, Some(options))
            .await
            .map_err(|e| classify("connect", &joined, &e))?;
        info!(endpoints = %joined, "Connected to etcd");

        Ok(Self {
            client,
            timeout: config.timeout,
        })
    }

    /// Await a store call, enforcing the per-call timeout and classifying failures.
    async fn bounded<T, F>(&self, op: &'static str, key: &str, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, etcd_client::Error>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(classify(op, key, &e)),
            Err(_) => Err(StoreError::Unavailable {
                op,
                key: key.to_string(),
                reason: format!("timed out after {:?}", self.timeout),
            }),
        }
    }
}

#[async_trait]
impl KeyValueStore for EtcdStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut kv = self.client.kv_client();
        let resp = self.bounded("get", key, kv.get(key, None)).await?;
        match resp.kvs().first() {
            Some(pair) => {
                let value = pair.value_str().map_err(|e| classify("get", key, &e))?;
                Ok(Some(value.to_string()))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut kv = self.client.kv_client();
        self.bounded("put", key, kv.put(key, value, None)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut kv = self.client.kv_client();
        self.bounded("delete", key, kv.delete(key, None)).await?;
        Ok(())
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError> {
        let mut kv = self.client.kv_client();
        let options = GetOptions::new()
            .with_prefix()
            .with_sort(SortTarget::Key, SortOrder::Ascend);
        let resp = self
            .bounded("list", prefix, kv.get(prefix, Some(options)))
            .await?;

        resp.kvs()
            .iter()
            .map(|pair| {
                let key = pair.key_str().map_err(|e| classify("list", prefix, &e))?;
                let value = pair.value_str().map_err(|e| classify("list", prefix, &e))?;
                Ok((key.to_string(), value.to_string()))
            })
            .collect()
    }
}

/// Map an etcd client error onto the retryable/permanent taxonomy.
pub(crate) fn classify(op: &'static str, key: &str, err: &etcd_client::Error) -> StoreError {
    let permanent = match err {
        etcd_client::Error::InvalidArgs(_) | etcd_client::Error::Utf8Error(_) => true,
        etcd_client::Error::GRpcStatus(status) => is_permanent_grpc_code(status.code() as i32),
        _ => false,
    };

    let key = key.to_string();
    let reason = err.to_string();
    if permanent {
        StoreError::Rejected { op, key, reason }
    } else {
        StoreError::Unavailable { op, key, reason }
    }
}

pub(crate) fn is_permanent_grpc_code(code: i32) -> bool {
    PERMANENT_GRPC_CODES.contains(&code)
}
