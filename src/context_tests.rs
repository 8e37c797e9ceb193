// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for context.rs

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::test_support::{endpoint, rpc_service, TestCache};
    use std::collections::BTreeSet;

    #[test]
    fn test_get_cached_reads_latest_spec() {
        let mut cache = TestCache::new();
        let key = ReconcileKey::new("svc", "a");
        assert!(cache.cache.get_cached(&key).is_none());

        cache.apply(rpc_service("svc", "a", "zone", vec![endpoint("p", "10.0.0.1", 9000)]));
        cache.apply(rpc_service("svc", "a", "zone", vec![endpoint("p", "10.0.0.1", 9001)]));

        let cached = cache.cache.get_cached(&key).unwrap();
        assert_eq!(cached.spec.endpoints[0].port, 9001);
        assert_eq!(cache.cache.keys(), vec![key]);
    }

    #[test]
    fn test_deleted_spec_leaves_cache() {
        let mut cache = TestCache::new();
        let svc = rpc_service("svc", "a", "zone", vec![]);
        cache.apply(svc.clone());
        cache.delete(svc);

        assert!(cache.cache.get_cached(&ReconcileKey::new("svc", "a")).is_none());
        assert!(cache.cache.keys().is_empty());
    }

    #[test]
    fn test_stale_zones_are_normalized_and_deduplicated() {
        let cache = TestCache::new().cache;
        let key = ReconcileKey::new("svc", "a");

        cache.mark_stale(&key, "Old.Zone.");
        cache.mark_stale(&key, "old.zone");
        cache.mark_stale(&key, "");

        assert_eq!(
            cache.stale_zones(&key),
            BTreeSet::from(["old.zone".to_string()])
        );
    }

    #[test]
    fn test_clear_stale_keeps_zones_recorded_later() {
        let cache = TestCache::new().cache;
        let key = ReconcileKey::new("svc", "a");
        cache.mark_stale(&key, "one");
        let handled = cache.stale_zones(&key);

        cache.mark_stale(&key, "two");
        cache.clear_stale(&key, &handled);
        assert_eq!(cache.stale_zones(&key), BTreeSet::from(["two".to_string()]));

        cache.clear_stale(&key, &BTreeSet::from(["two".to_string()]));
        assert!(cache.stale_zones(&key).is_empty());
    }

    #[test]
    fn test_stale_registry_is_shared_between_clones() {
        let cache = TestCache::new().cache;
        let clone = cache.clone();
        let key = ReconcileKey::new("svc", "a");

        clone.mark_stale(&key, "zone");
        assert!(cache.stale_zones(&key).contains("zone"));
    }
}
