// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Mapping between `RpcService` specs and CoreDNS etcd records.
//!
//! The CoreDNS etcd plugin resolves `a.svc.zone.` by reading every key under
//! `/skydns/zone/svc/a`, i.e. the labels of the queried name in reverse order below a
//! root prefix. Each value is a JSON message carrying at least `host` and `port`.
//!
//! An `RpcService` named `a` in namespace `svc` with `zone: zone` is therefore published
//! as one entry per endpoint:
//!
//! ```text
//! /skydns/zone/svc/a/<endpoint-name>  ->  {"host":"10.0.0.1","port":9000,"protocol":"grpc","owner":"rpc-controller"}
//! ```
//!
//! The `owner` field marks entries written by this controller. Entries without it are
//! never deleted.
//!
//! Everything in this module is pure; the reconciler combines it with the store.

use crate::constants::{MAX_DNS_LABEL_LEN, MAX_DNS_NAME_LEN};
use crate::crd::{RpcProtocol, RpcService};
use crate::errors::CodecError;
use crate::key::ReconcileKey;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A single record value in the layout CoreDNS deserializes.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkyDnsEntry {
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<RpcProtocol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl SkyDnsEntry {
    /// `host:port` as a resolver would hand it out.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The materialized form of one `RpcService`: a key prefix and its entries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExternalRecord {
    /// Key prefix all entries live under (no trailing slash)
    pub prefix: String,
    /// Entries keyed by their full store key
    pub entries: BTreeMap<String, SkyDnsEntry>,
}

impl ExternalRecord {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where a decoded store key belongs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordLocation {
    pub key: ReconcileKey,
    pub zone: String,
    pub endpoint: String,
}

/// Minimal set of store writes turning the current entries into the desired ones.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordDiff {
    /// `(key, encoded value)` pairs to write
    pub puts: Vec<(String, String)>,
    /// Keys to remove
    pub deletes: Vec<String>,
}

/// Encoder/decoder bound to a root prefix and owner id.
#[derive(Clone, Debug)]
pub struct RecordCodec {
    root: String,
    owner: String,
}

impl RecordCodec {
    /// `root` must be an absolute key path without a trailing slash (e.g. `/skydns`).
    pub fn new(root: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            owner: owner.into(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Fully qualified DNS name of a service: `<name>.<namespace>.<zone>.`
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if any label is invalid or the name is too long.
    pub fn fqdn(&self, key: &ReconcileKey, zone: &str) -> Result<String, CodecError> {
        let labels = service_labels(key, zone)?;
        Ok(format!("{}.", labels.join(".")))
    }

    /// Key prefix holding all entries of a service.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if any label is invalid or the name is too long.
    pub fn record_prefix(&self, key: &ReconcileKey, zone: &str) -> Result<String, CodecError> {
        let mut labels = service_labels(key, zone)?;
        labels.reverse();
        Ok(format!("{}/{}", self.root, labels.join("/")))
    }

    /// Encode the desired records of a service.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] for invalid names, duplicate endpoint names, or unusable
    /// endpoint addresses. These are permanent; retrying cannot fix them.
    pub fn encode(&self, rpc: &RpcService) -> Result<ExternalRecord, CodecError> {
        let key = rpc.reconcile_key();
        let prefix = self.record_prefix(&key, &rpc.spec.zone)?;

        let mut entries = BTreeMap::new();
        let mut seen = BTreeSet::new();
        for endpoint in &rpc.spec.endpoints {
            let name = normalize_label("endpoint name", &endpoint.name)?;
            if !seen.insert(name.clone()) {
                return Err(CodecError::DuplicateEndpoint(name));
            }

            let host = endpoint.host.trim();
            if host.is_empty() || host.contains(char::is_whitespace) {
                return Err(CodecError::InvalidEndpoint {
                    endpoint: name,
                    reason: "host must be a non-empty address without whitespace",
                });
            }
            if endpoint.port == 0 {
                return Err(CodecError::InvalidEndpoint {
                    endpoint: name,
                    reason: "port must be non-zero",
                });
            }

            entries.insert(
                format!("{prefix}/{name}"),
                SkyDnsEntry {
                    host: host.to_string(),
                    port: endpoint.port,
                    ttl: rpc.spec.ttl,
                    protocol: Some(endpoint.protocol),
                    owner: Some(self.owner.clone()),
                },
            );
        }

        Ok(ExternalRecord { prefix, entries })
    }

    /// Serialize an entry into the value stored in etcd.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MalformedValue`] if serialization fails.
    pub fn encode_value(&self, key: &str, entry: &SkyDnsEntry) -> Result<String, CodecError> {
        serde_json::to_string(entry).map_err(|e| CodecError::MalformedValue {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Parse a stored value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MalformedValue`] if the value is not a record message.
    pub fn decode_value(&self, key: &str, value: &str) -> Result<SkyDnsEntry, CodecError> {
        serde_json::from_str(value).map_err(|e| CodecError::MalformedValue {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Map a store key back to the service and endpoint it belongs to.
    ///
    /// Returns `None` for keys outside the root prefix or with too few segments.
    #[must_use]
    pub fn decode_key(&self, key: &str) -> Option<RecordLocation> {
        let rest = key.strip_prefix(&self.root)?.strip_prefix('/')?;
        let segments: Vec<&str> = rest.split('/').collect();
        if segments.len() < 4 || segments.iter().any(|s| s.is_empty()) {
            return None;
        }

        let (zone_rev, tail) = segments.split_at(segments.len() - 3);
        let zone = zone_rev.iter().rev().copied().collect::<Vec<_>>().join(".");
        Some(RecordLocation {
            key: ReconcileKey::new(tail[0], tail[1]),
            zone,
            endpoint: tail[2].to_string(),
        })
    }

    /// Whether a stored value was written by this controller.
    #[must_use]
    pub fn is_owned(&self, key: &str, value: &str) -> bool {
        self.decode_value(key, value)
            .is_ok_and(|e| e.owner.as_deref() == Some(self.owner.as_str()))
    }

    /// Compute the writes needed to move `current` to `desired`.
    ///
    /// Entries whose decoded value already equals the desired one are skipped, so a
    /// converged record yields an empty diff. Only owned entries are deleted.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if a desired entry cannot be serialized.
    pub fn diff(
        &self,
        desired: &ExternalRecord,
        current: &[(String, String)],
    ) -> Result<RecordDiff, CodecError> {
        let current_map: BTreeMap<&str, &str> = current
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let mut diff = RecordDiff::default();
        for (key, entry) in &desired.entries {
            let unchanged = current_map
                .get(key.as_str())
                .is_some_and(|v| self.decode_value(key, v).is_ok_and(|e| &e == entry));
            if !unchanged {
                diff.puts.push((key.clone(), self.encode_value(key, entry)?));
            }
        }

        for (key, value) in current {
            if !desired.entries.contains_key(key) && self.is_owned(key, value) {
                diff.deletes.push(key.clone());
            }
        }

        Ok(diff)
    }
}

/// Canonical form of a zone for comparisons: lowercased, without surrounding dots.
#[must_use]
pub fn normalize_zone(zone: &str) -> String {
    zone.trim().trim_matches('.').to_ascii_lowercase()
}

/// Labels of `<name>.<namespace>.<zone>` in query order, validated and lowercased.
fn service_labels(key: &ReconcileKey, zone: &str) -> Result<Vec<String>, CodecError> {
    let zone = zone.trim().trim_end_matches('.');
    if zone.is_empty() {
        return Err(CodecError::InvalidLabel {
            field: "zone",
            label: zone.to_string(),
            reason: "zone must not be empty",
        });
    }

    let mut labels = vec![
        normalize_label("name", &key.name)?,
        normalize_label("namespace", &key.namespace)?,
    ];
    for label in zone.split('.') {
        labels.push(normalize_label("zone", label)?);
    }

    let name = labels.join(".");
    if name.len() > MAX_DNS_NAME_LEN {
        return Err(CodecError::NameTooLong {
            len: name.len(),
            name,
            max: MAX_DNS_NAME_LEN,
        });
    }
    Ok(labels)
}

fn normalize_label(field: &'static str, label: &str) -> Result<String, CodecError> {
    let invalid = |reason| CodecError::InvalidLabel {
        field,
        label: label.to_string(),
        reason,
    };

    if label.is_empty() {
        return Err(invalid("label must not be empty"));
    }
    if label.len() > MAX_DNS_LABEL_LEN {
        return Err(invalid("label exceeds 63 characters"));
    }
    if !label
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(invalid("only letters, digits, '-' and '_' are allowed"));
    }
    if label.starts_with('-') || label.ends_with('-') {
        return Err(invalid("label must not start or end with '-'"));
    }
    Ok(label.to_ascii_lowercase())
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod codec_tests;
