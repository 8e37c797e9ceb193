// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconcile keys.
//!
//! A [`ReconcileKey`] is the only payload carried through the work queue. Workers resolve
//! it against the watcher cache on every dequeue, so a key never carries a stale spec.

use kube::runtime::reflector::ObjectRef;
use std::fmt;

use crate::crd::RpcService;

/// Stable identity of one `RpcService` (`namespace/name`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReconcileKey {
    pub namespace: String,
    pub name: String,
}

impl ReconcileKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Reflector store reference for this key.
    #[must_use]
    pub fn object_ref(&self) -> ObjectRef<RpcService> {
        ObjectRef::new(&self.name).within(&self.namespace)
    }
}

impl fmt::Display for ReconcileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(ReconcileKey::new("svc", "a").to_string(), "svc/a");
    }

    #[test]
    fn test_keys_order_by_namespace_then_name() {
        let mut keys = vec![
            ReconcileKey::new("b", "a"),
            ReconcileKey::new("a", "z"),
            ReconcileKey::new("a", "b"),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                ReconcileKey::new("a", "b"),
                ReconcileKey::new("a", "z"),
                ReconcileKey::new("b", "a"),
            ]
        );
    }

    #[test]
    fn test_object_ref() {
        let key = ReconcileKey::new("svc", "a");
        let obj_ref = key.object_ref();
        assert_eq!(obj_ref.name, "a");
        assert_eq!(obj_ref.namespace.as_deref(), Some("svc"));
    }
}
