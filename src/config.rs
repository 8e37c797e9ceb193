// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Validated controller configuration.
//!
//! Command-line flags (see [`crate::cli`]) are turned into a [`StoreConfig`] and a
//! [`ControllerConfig`] before anything is started. Any problem is a [`ConfigError`] and
//! aborts startup, so the controller never runs partially configured.

use crate::constants::{
    DEFAULT_MAX_RETRIES, DEFAULT_OWNER_ID, DEFAULT_RESYNC_PERIOD_SECS,
    DEFAULT_STORE_CONNECT_TIMEOUT_SECS, DEFAULT_STORE_PREFIX, DEFAULT_STORE_TIMEOUT_SECS,
    DEFAULT_WORKERS,
};
use crate::errors::ConfigError;
use crate::retry::BackoffConfig;
use std::path::Path;
use std::time::Duration;

/// PEM material for mutual TLS against the store.
#[derive(Clone)]
pub struct TlsMaterial {
    pub ca_pem: Vec<u8>,
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("ca_pem", &format_args!("{} bytes", self.ca_pem.len()))
            .field("cert_pem", &format_args!("{} bytes", self.cert_pem.len()))
            .field("key_pem", &"<redacted>")
            .finish()
    }
}

impl TlsMaterial {
    /// Read and sanity-check the three PEM files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a path is missing, unreadable, or not PEM.
    pub fn load(
        key_file: Option<&Path>,
        cert_file: Option<&Path>,
        ca_cert_file: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            key_pem: read_pem("etcd client key file", key_file)?,
            cert_pem: read_pem("etcd client certificate file", cert_file)?,
            ca_pem: read_pem("etcd CA certificate file", ca_cert_file)?,
        })
    }
}

fn read_pem(what: &'static str, path: Option<&Path>) -> Result<Vec<u8>, ConfigError> {
    let path = path.ok_or(ConfigError::MissingFile(what))?;
    let display = path.display().to_string();
    let bytes = std::fs::read(path).map_err(|source| ConfigError::UnreadableFile {
        what,
        path: display.clone(),
        source,
    })?;

    let text = String::from_utf8_lossy(&bytes);
    if !text.contains("-----BEGIN ") {
        return Err(ConfigError::InvalidPem {
            what,
            path: display,
        });
    }
    Ok(bytes)
}

/// Everything needed to reach the key-value store and lay out records in it.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Normalized `https://host:port` endpoints
    pub endpoints: Vec<String>,
    pub tls: TlsMaterial,
    /// Per-call timeout
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Root key prefix read by the resolver (e.g. `/skydns`)
    pub prefix: String,
    /// Owner id written into every record
    pub owner: String,
}

impl StoreConfig {
    /// Build a store configuration with default prefix, owner and timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the endpoint list is empty or malformed.
    pub fn new(raw_endpoints: &[String], tls: TlsMaterial) -> Result<Self, ConfigError> {
        Ok(Self {
            endpoints: parse_endpoints(raw_endpoints)?,
            tls,
            timeout: Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_STORE_CONNECT_TIMEOUT_SECS),
            prefix: DEFAULT_STORE_PREFIX.to_string(),
            owner: DEFAULT_OWNER_ID.to_string(),
        })
    }

    /// Override the root prefix.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPrefix`] unless the prefix is an absolute key path
    /// without a trailing slash.
    pub fn with_prefix(mut self, prefix: &str) -> Result<Self, ConfigError> {
        if !prefix.starts_with('/') || prefix.len() < 2 || prefix.ends_with('/') {
            return Err(ConfigError::InvalidPrefix(prefix.to_string()));
        }
        self.prefix = prefix.to_string();
        Ok(self)
    }

    /// Override the owner id.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSetting`] for an empty owner id.
    pub fn with_owner(mut self, owner: &str) -> Result<Self, ConfigError> {
        if owner.trim().is_empty() {
            return Err(ConfigError::InvalidSetting {
                setting: "owner-id",
                reason: "must not be empty",
            });
        }
        self.owner = owner.to_string();
        Ok(self)
    }

    /// Override the per-call timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSetting`] for a zero timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        if timeout.is_zero() {
            return Err(ConfigError::InvalidSetting {
                setting: "store-timeout-secs",
                reason: "must be greater than zero",
            });
        }
        self.timeout = timeout;
        Ok(self)
    }
}

/// Split, trim and validate the endpoint list.
///
/// Endpoints without a scheme get `https://`. Plain `http://` is refused because the
/// store is only reachable over mutual TLS.
///
/// # Errors
///
/// Returns [`ConfigError::EmptyEndpoints`] or [`ConfigError::InvalidEndpoint`].
pub fn parse_endpoints(raw: &[String]) -> Result<Vec<String>, ConfigError> {
    let mut endpoints = Vec::new();
    for item in raw.iter().flat_map(|s| s.split(',')) {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }

        let candidate = if item.contains("://") {
            item.to_string()
        } else {
            format!("https://{item}")
        };
        let url = url::Url::parse(&candidate).map_err(|e| ConfigError::InvalidEndpoint {
            endpoint: item.to_string(),
            reason: e.to_string(),
        })?;
        if url.scheme() != "https" {
            return Err(ConfigError::InvalidEndpoint {
                endpoint: item.to_string(),
                reason: "scheme must be https".to_string(),
            });
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(ConfigError::InvalidEndpoint {
                endpoint: item.to_string(),
                reason: "missing host".to_string(),
            });
        }
        endpoints.push(candidate.trim_end_matches('/').to_string());
    }

    if endpoints.is_empty() {
        return Err(ConfigError::EmptyEndpoints);
    }
    Ok(endpoints)
}

/// How often a failing key is retried before it is dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryCeiling {
    /// Retry up to this many times, then log, count and forget the key
    Bounded(u32),
    /// Never give up on a transient failure
    Unbounded,
}

impl RetryCeiling {
    /// Whether a key that has already been requeued `requeues` times may be retried again.
    #[must_use]
    pub fn allows(self, requeues: u32) -> bool {
        match self {
            RetryCeiling::Bounded(max) => requeues < max,
            RetryCeiling::Unbounded => true,
        }
    }
}

impl Default for RetryCeiling {
    fn default() -> Self {
        RetryCeiling::Bounded(DEFAULT_MAX_RETRIES)
    }
}

/// Tuning of the reconciliation engine.
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Number of concurrent workers
    pub workers: usize,
    pub retry: RetryCeiling,
    /// Full resync and orphan sweep period
    pub resync_period: Duration,
    /// Per-key requeue backoff
    pub backoff: BackoffConfig,
    /// Restrict the watch to one namespace
    pub namespace: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            retry: RetryCeiling::default(),
            resync_period: Duration::from_secs(DEFAULT_RESYNC_PERIOD_SECS),
            backoff: BackoffConfig::default(),
            namespace: None,
        }
    }
}

impl ControllerConfig {
    /// Check numeric settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSetting`] for zero workers or a zero resync period.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidSetting {
                setting: "workers",
                reason: "at least one worker is required",
            });
        }
        if self.resync_period.is_zero() {
            return Err(ConfigError::InvalidSetting {
                setting: "resync-period-secs",
                reason: "must be greater than zero",
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
