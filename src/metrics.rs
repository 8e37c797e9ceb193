// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the RPC controller.
//!
//! This module provides metrics collection with the namespace prefix
//! `rpc_firestoned_io_` (prometheus-safe version of "rpc.firestoned.io").
//!
//! # Metrics Categories
//!
//! - **Reconciliation Metrics** - Outcomes, durations, requeues and dropped keys
//! - **Store Metrics** - Writes issued against the key-value store
//! - **Error Metrics** - Errors by category
//! - **Watch Metrics** - Events observed from the cluster and queue depth
//!
//! # Example
//!
//! ```rust,no_run
//! use rpc_controller::metrics::record_reconciliation_success;
//!
//! record_reconciliation_success("updated", std::time::Duration::from_millis(12));
//! ```

use prometheus::{
    CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all controller metrics (prometheus-safe)
const METRICS_NAMESPACE: &str = "rpc_firestoned_io";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
///
/// All metrics are registered in this registry and exposed via `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of reconciliations by outcome
///
/// Labels:
/// - `outcome`: `created`, `updated`, `deleted`, `noop`, `error`
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of reconciliations by outcome",
    );
    let counter = CounterVec::new(opts, &["outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of reconciliations in seconds
///
/// Labels:
/// - `outcome`: same values as [`RECONCILIATION_TOTAL`]
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of reconciliations in seconds by outcome",
    )
    .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]);
    let histogram = HistogramVec::new(opts, &["outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

/// Total number of requeue operations
///
/// Labels:
/// - `reason`: Reason for requeue (`store_unavailable`)
pub static REQUEUE_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_requeues_total"),
        "Total number of rate-limited requeues by reason",
    );
    let counter = CounterVec::new(opts, &["reason"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of keys dropped without converging
///
/// Labels:
/// - `reason`: `retries_exhausted` or `permanent_error`
pub static DROPPED_KEYS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_dropped_keys_total"),
        "Total number of keys forgotten without converging",
    );
    let counter = CounterVec::new(opts, &["reason"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Time keys spend queued before a worker picks them up
pub static QUEUE_WAIT_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_queue_wait_seconds"),
        "Time between a key being queued and a worker picking it up",
    )
    .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 30.0, 60.0]);
    let histogram = Histogram::with_opts(opts).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

/// Number of keys waiting in the work queue
pub static QUEUE_DEPTH: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        format!("{METRICS_NAMESPACE}_queue_depth"),
        "Number of keys waiting in the work queue",
    )
    .unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Store Metrics
// ============================================================================

/// Total number of writes issued to the key-value store
///
/// Labels:
/// - `operation`: `put` or `delete`
pub static STORE_WRITES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_store_writes_total"),
        "Total number of key-value store writes by operation",
    );
    let counter = CounterVec::new(opts, &["operation"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Error Metrics
// ============================================================================

/// Total number of errors by category
///
/// Labels:
/// - `error_type`: `store_unavailable`, `store_rejected`, `invalid_spec`, `watch`
pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_errors_total"),
        "Total number of errors by category",
    );
    let counter = CounterVec::new(opts, &["error_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Watch Metrics
// ============================================================================

/// Total number of resource notifications emitted by the watcher
///
/// Labels:
/// - `kind`: `added`, `updated`, `deleted`, `resync`
pub static WATCH_EVENTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_watch_events_total"),
        "Total number of resource notifications by kind",
    );
    let counter = CounterVec::new(opts, &["kind"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a successful reconciliation
///
/// # Arguments
/// * `outcome` - What the reconciliation did (e.g., `created`, `noop`)
/// * `duration` - Duration of the reconciliation
pub fn record_reconciliation_success(outcome: &str, duration: Duration) {
    RECONCILIATION_TOTAL.with_label_values(&[outcome]).inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[outcome])
        .observe(duration.as_secs_f64());
}

/// Record a failed reconciliation
///
/// # Arguments
/// * `error_type` - Category of the failure
/// * `duration` - Duration of the reconciliation before failure
pub fn record_reconciliation_error(error_type: &str, duration: Duration) {
    RECONCILIATION_TOTAL.with_label_values(&["error"]).inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&["error"])
        .observe(duration.as_secs_f64());
    record_error(error_type);
}

/// Record a rate-limited requeue
pub fn record_requeue(reason: &str) {
    REQUEUE_TOTAL.with_label_values(&[reason]).inc();
}

/// Record a key forgotten without converging
pub fn record_dropped_key(reason: &str) {
    DROPPED_KEYS_TOTAL.with_label_values(&[reason]).inc();
}

/// Record how long a key waited in the queue
pub fn record_queue_wait(wait: Duration) {
    QUEUE_WAIT_SECONDS.observe(wait.as_secs_f64());
}

/// Set the current queue depth
#[allow(clippy::cast_precision_loss)]
pub fn set_queue_depth(depth: usize) {
    QUEUE_DEPTH.set(depth as f64);
}

/// Record a store write
///
/// # Arguments
/// * `operation` - `put` or `delete`
pub fn record_store_write(operation: &str) {
    STORE_WRITES_TOTAL.with_label_values(&[operation]).inc();
}

/// Record an error
///
/// # Arguments
/// * `error_type` - Category of error (e.g., `store_unavailable`, `watch`)
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Record a watcher notification
pub fn record_watch_event(kind: &str) {
    WATCH_EVENTS_TOTAL.with_label_values(&[kind]).inc();
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Returns
/// Prometheus-formatted metrics as a String
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_reconciliation_success() {
        let duration = Duration::from_millis(500);

        record_reconciliation_success("created", duration);

        let counter = RECONCILIATION_TOTAL.with_label_values(&["created"]);
        assert!(counter.get() > 0.0);

        let histogram = RECONCILIATION_DURATION_SECONDS.with_label_values(&["created"]);
        assert!(histogram.get_sample_count() > 0);
    }

    #[test]
    fn test_record_reconciliation_error() {
        record_reconciliation_error("store_unavailable", Duration::from_millis(250));

        let counter = RECONCILIATION_TOTAL.with_label_values(&["error"]);
        assert!(counter.get() > 0.0);

        let errors = ERRORS_TOTAL.with_label_values(&["store_unavailable"]);
        assert!(errors.get() > 0.0);
    }

    #[test]
    fn test_gather_metrics() {
        record_store_write("put");
        record_watch_event("added");

        let result = gather_metrics();
        assert!(result.is_ok(), "Gathering metrics should succeed");

        let metrics_text = result.unwrap();
        assert!(
            metrics_text.contains("rpc_firestoned_io"),
            "Metrics should contain namespace prefix"
        );
        assert!(
            metrics_text.contains("store_writes_total"),
            "Metrics should contain store write counter"
        );
    }
}
