// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the RPC controller.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for the `RpcService` CRD
pub const API_GROUP: &str = "rpc.firestoned.io";

/// API version for the `RpcService` CRD
pub const API_VERSION: &str = "v1alpha1";

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "rpc.firestoned.io/v1alpha1";

/// Kind name for `RpcService` resource
pub const KIND_RPC_SERVICE: &str = "RpcService";

// ============================================================================
// Record Store Constants
// ============================================================================

/// Root key prefix read by the CoreDNS etcd plugin
pub const DEFAULT_STORE_PREFIX: &str = "/skydns";

/// Owner marker written into every record value
pub const DEFAULT_OWNER_ID: &str = "rpc-controller";

/// Timeout applied to every key-value store call
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 5;

/// Connect timeout for the key-value store
pub const DEFAULT_STORE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Maximum length of a single DNS label
pub const MAX_DNS_LABEL_LEN: usize = 63;

/// Maximum length of a fully qualified domain name
pub const MAX_DNS_NAME_LEN: usize = 253;

// ============================================================================
// Controller Constants
// ============================================================================

/// Default number of concurrent reconciliation workers
pub const DEFAULT_WORKERS: usize = 2;

/// Default number of rate-limited retries before a key is dropped
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Full resync period for the watcher cache and orphan sweep (30 seconds)
pub const DEFAULT_RESYNC_PERIOD_SECS: u64 = 30;

/// Capacity of the channel between the watcher and the queue forwarder
pub const WATCH_EVENT_CHANNEL_CAPACITY: usize = 1024;

// ============================================================================
// Retry Backoff Constants
// ============================================================================

/// Initial per-key retry interval (100ms)
pub const RETRY_INITIAL_INTERVAL_MILLIS: u64 = 100;

/// Maximum per-key retry interval (30 seconds)
pub const RETRY_MAX_INTERVAL_SECS: u64 = 30;

/// Backoff multiplier (exponential growth factor)
pub const RETRY_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Randomization factor to prevent thundering herd (±10%)
pub const RETRY_RANDOMIZATION_FACTOR: f64 = 0.1;

// ============================================================================
// Health Check Constants
// ============================================================================

/// Default port of the health check HTTP server
pub const DEFAULT_HEALTH_PORT: u16 = 12345;

/// Liveness endpoint path
pub const HEALTHZ_PATH: &str = "/healthz";

/// Prometheus scrape endpoint path
pub const METRICS_PATH: &str = "/metrics";
