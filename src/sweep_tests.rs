// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `sweep.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::reconciler::reconcile_rpc_service;
    use crate::retry::BackoffConfig;
    use crate::test_support::{context, endpoint, rpc_service, Failure, MemoryStore};
    use std::time::Duration;

    const OWNED: &str = r#"{"host":"10.0.0.1","port":9000,"owner":"rpc-controller"}"#;

    fn queue() -> WorkQueue<ReconcileKey> {
        WorkQueue::new(BackoffConfig::default())
    }

    async fn drain(q: &WorkQueue<ReconcileKey>) -> Vec<ReconcileKey> {
        let mut keys = Vec::new();
        while !q.is_empty() {
            let item = q.get().await.unwrap();
            q.done(&item.key);
            keys.push(item.key);
        }
        keys
    }

    #[tokio::test]
    async fn test_sweep_queues_only_orphaned_owned_keys() {
        let store = MemoryStore::new();
        let (ctx, mut cache) = context(store.clone());
        cache.apply(rpc_service("svc", "live", "zone", vec![endpoint("p", "10.0.0.1", 9000)]));
        cache.apply(rpc_service("svc", "moved", "new", vec![]));

        store.seed("/skydns/zone/svc/live/p", OWNED);
        store.seed("/skydns/zone/svc/gone/p", OWNED);
        store.seed("/skydns/old/svc/moved/p", OWNED);
        store.seed("/skydns/zone/svc/manual/p", r#"{"host":"10.0.0.9","port":1}"#);
        store.seed("/skydns/zone/svc/other/p", r#"{"host":"10.0.0.9","port":1,"owner":"someone"}"#);

        let q = queue();
        let count = sweep_orphans(&ctx, &q).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(
            drain(&q).await,
            vec![ReconcileKey::new("svc", "gone"), ReconcileKey::new("svc", "moved")]
        );
        assert!(ctx.cache.stale_zones(&ReconcileKey::new("svc", "gone")).contains("zone"));
        assert!(ctx.cache.stale_zones(&ReconcileKey::new("svc", "moved")).contains("old"));
        assert!(ctx.cache.stale_zones(&ReconcileKey::new("svc", "live")).is_empty());
        assert_eq!(store.writes(), 0, "the sweep itself never writes");
    }

    #[tokio::test]
    async fn test_swept_orphans_are_removed_by_reconciler() {
        let store = MemoryStore::new();
        let (ctx, _cache) = context(store.clone());
        store.seed("/skydns/com/example/svc/gone/p", OWNED);
        store.seed("/skydns/com/example/svc/gone/q", OWNED);

        let q = queue();
        sweep_orphans(&ctx, &q).await.unwrap();
        for key in drain(&q).await {
            reconcile_rpc_service(&ctx, &key).await.unwrap();
        }

        assert!(store.keys().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_waits_for_cache_then_runs_every_period() {
        let store = MemoryStore::new();
        let (ctx, mut cache) = context(store.clone());
        store.seed("/skydns/zone/svc/first/p", OWNED);

        let q = queue();
        let cancel = CancellationToken::new();
        let sweeper = tokio::spawn(run_orphan_sweeper(
            Arc::new(ctx),
            q.clone(),
            Duration::from_secs(30),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(q.is_empty(), "no sweep before the initial list");

        cache.complete_initial_list();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(drain(&q).await, vec![ReconcileKey::new("svc", "first")]);

        store.seed("/skydns/zone/svc/second/p", OWNED);
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(q.len(), 0, "next sweep waits a full period");

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(
            drain(&q).await,
            vec![ReconcileKey::new("svc", "first"), ReconcileKey::new("svc", "second")]
        );

        cancel.cancel();
        sweeper.await.unwrap();
    }

    #[tokio::test]
    async fn test_sweep_reports_store_failure() {
        let store = MemoryStore::new();
        let (ctx, _cache) = context(store.clone());
        store.fail_with(Some(Failure::Unavailable));

        let err = sweep_orphans(&ctx, &queue()).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
