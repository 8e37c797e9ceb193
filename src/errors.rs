// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the RPC controller.
//!
//! This module provides specialized error types for:
//! - Key-value store operations (etcd), split into transient and permanent failures
//! - Record encoding failures for specs that cannot be published
//! - Per-key reconciliation failures
//! - Startup configuration failures
//!
//! Only [`ConfigError`] is fatal. Every other error is contained within a single key's
//! reconciliation attempt and classified as retryable or not.

use thiserror::Error;

/// Errors returned by the key-value store client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or did not answer in time.
    ///
    /// Covers connection refusal, timeouts, leader loss and version conflicts. The caller
    /// retries these with backoff.
    #[error("key-value store unavailable during {op} of '{key}': {reason}")]
    Unavailable {
        /// Operation that failed (`get`, `put`, `delete`, `list`)
        op: &'static str,
        /// Key or prefix the operation targeted
        key: String,
        /// Underlying transport or server message
        reason: String,
    },

    /// The store rejected the request as malformed or unauthorized.
    ///
    /// Retrying cannot succeed; these indicate a bug or a credential problem.
    #[error("key-value store rejected {op} of '{key}': {reason}")]
    Rejected {
        /// Operation that failed
        op: &'static str,
        /// Key or prefix the operation targeted
        key: String,
        /// Underlying server message
        reason: String,
    },
}

impl StoreError {
    /// Whether the failed operation may succeed if repeated later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }

    /// Metric label for this error category.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            StoreError::Unavailable { .. } => "store_unavailable",
            StoreError::Rejected { .. } => "store_rejected",
        }
    }
}

/// Errors raised while encoding or decoding records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A DNS label (zone label, namespace, name, or endpoint name) is not valid.
    #[error("invalid DNS label '{label}' in {field}: {reason}")]
    InvalidLabel {
        /// Which input carried the label
        field: &'static str,
        /// The offending label
        label: String,
        /// Explanation of what is invalid
        reason: &'static str,
    },

    /// The resulting fully qualified name exceeds DNS limits.
    #[error("DNS name '{name}' is too long ({len} > {max})")]
    NameTooLong {
        /// The generated name
        name: String,
        /// Its length
        len: usize,
        /// The limit
        max: usize,
    },

    /// Two endpoints share a name and would map to the same key.
    #[error("duplicate endpoint name '{0}'")]
    DuplicateEndpoint(String),

    /// An endpoint has no usable address.
    #[error("endpoint '{endpoint}' is invalid: {reason}")]
    InvalidEndpoint {
        /// The endpoint name
        endpoint: String,
        /// Explanation of what is invalid
        reason: &'static str,
    },

    /// A stored value could not be parsed.
    #[error("malformed record value at '{key}': {reason}")]
    MalformedValue {
        /// Key of the value
        key: String,
        /// Parser message
        reason: String,
    },
}

/// Failure of a single reconciliation attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// A store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The declared spec cannot be encoded into records.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl ReconcileError {
    /// Whether the key should be requeued with backoff.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::Store(e) => e.is_retryable(),
            ReconcileError::Codec(_) => false,
        }
    }

    /// Metric label for this error category.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            ReconcileError::Store(e) => e.error_type(),
            ReconcileError::Codec(_) => "invalid_spec",
        }
    }
}

/// Startup configuration errors. The controller refuses to start on any of these.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required TLS file was not provided.
    #[error("missing required {0}")]
    MissingFile(&'static str),

    /// A TLS file could not be read.
    #[error("failed to read {what} at '{path}': {source}")]
    UnreadableFile {
        /// Which file
        what: &'static str,
        /// Path that was configured
        path: String,
        /// I/O error
        #[source]
        source: std::io::Error,
    },

    /// A TLS file exists but holds no PEM data.
    #[error("{what} at '{path}' does not contain PEM data")]
    InvalidPem {
        /// Which file
        what: &'static str,
        /// Path that was configured
        path: String,
    },

    /// No store endpoints were configured.
    #[error("no key-value store endpoints configured")]
    EmptyEndpoints,

    /// An endpoint could not be parsed.
    #[error("invalid key-value store endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        /// The configured endpoint
        endpoint: String,
        /// Parser message
        reason: String,
    },

    /// The store prefix is not an absolute key path.
    #[error("invalid store prefix '{0}': must start with '/' and not end with '/'")]
    InvalidPrefix(String),

    /// A numeric setting is out of range.
    #[error("invalid value for {setting}: {reason}")]
    InvalidSetting {
        /// Setting name
        setting: &'static str,
        /// Explanation
        reason: &'static str,
    },
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
