// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Command-line interface.
//!
//! Every flag can also be set through the environment variable shown in `--help`, which
//! is how the controller is usually configured inside a pod.

use crate::config::{ControllerConfig, RetryCeiling, StoreConfig, TlsMaterial};
use crate::constants::{
    DEFAULT_HEALTH_PORT, DEFAULT_MAX_RETRIES, DEFAULT_OWNER_ID, DEFAULT_RESYNC_PERIOD_SECS,
    DEFAULT_STORE_PREFIX, DEFAULT_STORE_TIMEOUT_SECS, DEFAULT_WORKERS,
};
use crate::errors::ConfigError;
use crate::retry::BackoffConfig;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Publishes RpcService resources into etcd for the CoreDNS etcd plugin.
#[derive(Parser, Debug)]
#[command(name = "rpc-controller", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the controller (default)
    Run,

    /// Print shell completions and exit
    Completions {
        /// Target shell
        shell: Shell,
    },
}

/// Flags of the controller itself.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Path to a kubeconfig file. Inferred from `KUBECONFIG` or the in-cluster environment
    /// when omitted.
    #[arg(long, global = true)]
    pub kubeconfig: Option<PathBuf>,

    /// Override the API server address from the kubeconfig.
    #[arg(long, env = "KUBE_MASTER", global = true)]
    pub master: Option<String>,

    /// Only watch RpcService resources in this namespace.
    #[arg(long, env = "WATCH_NAMESPACE", global = true)]
    pub namespace: Option<String>,

    /// Port serving /healthz and /metrics.
    #[arg(
        long,
        alias = "healthport",
        env = "HEALTH_PORT",
        default_value_t = DEFAULT_HEALTH_PORT,
        global = true
    )]
    pub health_port: u16,

    /// Client private key for etcd mutual TLS.
    #[arg(long, alias = "etcdkeyfile", env = "ETCD_KEY_FILE", global = true)]
    pub etcd_key_file: Option<PathBuf>,

    /// Client certificate for etcd mutual TLS.
    #[arg(long, alias = "etcdcertfile", env = "ETCD_CERT_FILE", global = true)]
    pub etcd_cert_file: Option<PathBuf>,

    /// CA certificate used to verify etcd.
    #[arg(long, alias = "etcdcacertfile", env = "ETCD_CA_CERT_FILE", global = true)]
    pub etcd_ca_cert_file: Option<PathBuf>,

    /// Comma-separated etcd endpoints (host:port or https://host:port).
    #[arg(
        long,
        alias = "etcdendpoints",
        env = "ETCD_ENDPOINTS",
        value_delimiter = ',',
        global = true
    )]
    pub etcd_endpoints: Vec<String>,

    /// Root key prefix read by the CoreDNS etcd plugin.
    #[arg(long, env = "STORE_PREFIX", default_value = DEFAULT_STORE_PREFIX, global = true)]
    pub store_prefix: String,

    /// Timeout for each etcd call, in seconds.
    #[arg(long, env = "STORE_TIMEOUT_SECS", default_value_t = DEFAULT_STORE_TIMEOUT_SECS, global = true)]
    pub store_timeout_secs: u64,

    /// Owner id written into every record this controller manages.
    #[arg(long, env = "OWNER_ID", default_value = DEFAULT_OWNER_ID, global = true)]
    pub owner_id: String,

    /// Number of concurrent reconciliation workers.
    #[arg(long, env = "WORKERS", default_value_t = DEFAULT_WORKERS, global = true)]
    pub workers: usize,

    /// Retries of a failing key before it is dropped until the next resync.
    #[arg(long, env = "MAX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES, global = true)]
    pub max_retries: u32,

    /// Retry failing keys forever instead of dropping them.
    #[arg(long, env = "RETRY_FOREVER", conflicts_with = "max_retries", global = true)]
    pub retry_forever: bool,

    /// Full resync and orphan sweep period, in seconds.
    #[arg(long, env = "RESYNC_PERIOD_SECS", default_value_t = DEFAULT_RESYNC_PERIOD_SECS, global = true)]
    pub resync_period_secs: u64,
}

impl RunArgs {
    /// Load TLS material and build the store configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for missing or unreadable certificates, an empty or
    /// malformed endpoint list, or invalid store settings.
    pub fn store_config(&self) -> Result<StoreConfig, ConfigError> {
        let tls = TlsMaterial::load(
            self.etcd_key_file.as_deref(),
            self.etcd_cert_file.as_deref(),
            self.etcd_ca_cert_file.as_deref(),
        )?;
        StoreConfig::new(&self.etcd_endpoints, tls)?
            .with_prefix(&self.store_prefix)?
            .with_owner(&self.owner_id)?
            .with_timeout(Duration::from_secs(self.store_timeout_secs))
    }

    /// Build the reconciliation engine configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSetting`] for out-of-range values.
    pub fn controller_config(&self) -> Result<ControllerConfig, ConfigError> {
        let retry = if self.retry_forever {
            RetryCeiling::Unbounded
        } else {
            RetryCeiling::Bounded(self.max_retries)
        };
        ControllerConfig {
            workers: self.workers,
            retry,
            resync_period: Duration::from_secs(self.resync_period_secs),
            backoff: BackoffConfig::default(),
            namespace: self.namespace.clone(),
        }
        .validate()
    }
}
