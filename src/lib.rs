// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # rpc-controller - RPC service discovery for CoreDNS
//!
//! rpc-controller is a Kubernetes controller written in Rust that publishes `RpcService`
//! custom resources into etcd, where the CoreDNS etcd plugin serves them as DNS records.
//!
//! ## Overview
//!
//! Whenever an `RpcService` is created, updated or deleted, its records appear, change or
//! disappear in etcd within a bounded time. The controller is event-driven, deduplicates
//! bursts of events per key, retries transient store failures with backoff, and repairs
//! missed events through periodic resyncs and an orphan sweep.
//!
//! ## Modules
//!
//! - [`crd`] - `RpcService` Custom Resource Definition
//! - [`codec`] - Mapping between specs and CoreDNS etcd records
//! - [`store`] - Key-value store abstraction and the etcd client
//! - [`watcher`] - Watch stream and authoritative reflector cache
//! - [`queue`] - Deduplicating, rate-limited work queue
//! - [`reconciler`] - Per-key reconciliation logic
//! - [`worker`] - Fixed-size worker pool
//! - [`sweep`] - Periodic removal of orphaned records
//! - [`controller`] - Wiring of all of the above
//! - [`health`] - `/healthz` and `/metrics` endpoints
//!
//! ## Example
//!
//! ```rust,no_run
//! use rpc_controller::codec::RecordCodec;
//! use rpc_controller::key::ReconcileKey;
//!
//! let codec = RecordCodec::new("/skydns", "rpc-controller");
//! let key = ReconcileKey::new("svc", "a");
//!
//! assert_eq!(codec.fqdn(&key, "zone").unwrap(), "a.svc.zone.");
//! assert_eq!(codec.record_prefix(&key, "zone").unwrap(), "/skydns/zone/svc/a");
//! ```

pub mod cli;
pub mod codec;
pub mod config;
pub mod constants;
pub mod context;
pub mod controller;
pub mod crd;
pub mod errors;
pub mod health;
pub mod key;
pub mod metrics;
pub mod queue;
pub mod reconciler;
pub mod retry;
pub mod store;
pub mod sweep;
pub mod watcher;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;
