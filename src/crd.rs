// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definition for RPC service discovery.
//!
//! An [`RpcService`] declares a set of named RPC endpoints that must be resolvable under
//! a DNS zone. The controller publishes each endpoint into etcd in the layout read by
//! the CoreDNS etcd plugin.
//!
//! # Example: Declaring an RPC service
//!
//! ```rust,no_run
//! use rpc_controller::crd::{RpcEndpoint, RpcProtocol, RpcServiceSpec};
//!
//! let spec = RpcServiceSpec {
//!     zone: "rpc.example.com".to_string(),
//!     endpoints: vec![RpcEndpoint {
//!         name: "primary".to_string(),
//!         host: "10.0.0.1".to_string(),
//!         port: 9000,
//!         protocol: RpcProtocol::Grpc,
//!     }],
//!     ttl: Some(30),
//! };
//! ```

use crate::key::ReconcileKey;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Desired DNS publication of an RPC service.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[kube(
    group = "rpc.firestoned.io",
    version = "v1alpha1",
    kind = "RpcService",
    namespaced,
    shortname = "rpcsvc",
    doc = "RpcService publishes a set of RPC endpoints as DNS records. The controller writes one etcd entry per endpoint under <name>.<namespace>.<zone> for the CoreDNS etcd plugin."
)]
#[serde(rename_all = "camelCase")]
pub struct RpcServiceSpec {
    /// DNS zone (or subdomain) the service is published under.
    ///
    /// Examples: "rpc.example.com", "svc.cluster.local"
    /// The published name will be: {name}.{namespace}.{zone}
    #[schemars(regex(
        pattern = r"^([a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)*[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.?$"
    ))]
    pub zone: String,

    /// Named endpoints serving this RPC service.
    #[serde(default)]
    pub endpoints: Vec<RpcEndpoint>,

    /// TTL in seconds handed to resolvers. Uses the resolver default if not specified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
}

/// A single addressable endpoint of an RPC service.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RpcEndpoint {
    /// Endpoint name, unique within the service. Becomes the last key segment.
    pub name: String,

    /// IP address or hostname of the endpoint.
    pub host: String,

    /// Port the endpoint listens on.
    pub port: u16,

    /// Wire protocol spoken by the endpoint.
    #[serde(default)]
    pub protocol: RpcProtocol,
}

/// Wire protocol of an RPC endpoint.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RpcProtocol {
    #[default]
    Grpc,
    Http,
    Tcp,
    Udp,
}

impl fmt::Display for RpcProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RpcProtocol::Grpc => "grpc",
            RpcProtocol::Http => "http",
            RpcProtocol::Tcp => "tcp",
            RpcProtocol::Udp => "udp",
        };
        f.write_str(s)
    }
}

impl RpcService {
    /// The queue key identifying this resource.
    #[must_use]
    pub fn reconcile_key(&self) -> ReconcileKey {
        ReconcileKey::new(self.namespace().unwrap_or_default(), self.name_any())
    }

    /// Whether the resource has been marked for deletion.
    #[must_use]
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
