// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `queue.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use std::time::Duration;

    fn queue() -> WorkQueue<&'static str> {
        WorkQueue::new(BackoffConfig {
            randomization_factor: 0.0,
            ..BackoffConfig::default()
        })
    }

    #[tokio::test]
    async fn test_keys_are_handed_out_in_order() {
        let q = queue();
        q.add("a");
        q.add("b");

        assert_eq!(q.get().await.unwrap().key, "a");
        assert_eq!(q.get().await.unwrap().key, "b");
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_adds_are_absorbed() {
        let q = queue();
        for _ in 0..5 {
            q.add("a");
        }
        q.add("b");

        assert_eq!(q.len(), 2);
    }

    #[tokio::test]
    async fn test_add_while_processing_redelivers_once() {
        let q = queue();
        q.add("a");
        let item = q.get().await.unwrap();

        for _ in 0..10 {
            q.add("a");
        }
        assert_eq!(q.len(), 0, "checked-out key must not be queued twice");

        q.done(&item.key);
        assert_eq!(q.len(), 1, "dirty key is re-queued exactly once");

        let again = q.get().await.unwrap();
        assert_eq!(again.key, "a");
        q.done(&again.key);
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn test_done_without_new_add_does_not_requeue() {
        let q = queue();
        q.add("a");
        let item = q.get().await.unwrap();
        q.done(&item.key);
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn test_blocked_get_wakes_on_add() {
        let q = queue();
        let waiter = {
            let q = q.clone();
            tokio::spawn(async move { q.get().await.map(|item| item.key) })
        };
        tokio::task::yield_now().await;

        q.add("a");
        assert_eq!(waiter.await.unwrap(), Some("a"));
    }

    #[tokio::test]
    async fn test_shutdown_releases_blocked_getters() {
        let q = queue();
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let q = q.clone();
                tokio::spawn(async move { q.get().await })
            })
            .collect();
        tokio::task::yield_now().await;

        q.shut_down();
        for waiter in waiters {
            assert!(waiter.await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_keys() {
        let q = queue();
        q.add("a");
        q.add("b");
        q.shut_down();

        q.add("c");
        assert_eq!(q.get().await.unwrap().key, "a");
        assert_eq!(q.get().await.unwrap().key, "b");
        assert!(q.get().await.is_none());
        assert!(q.is_empty(), "adds after shutdown are ignored");
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_rate_limited_waits_for_backoff() {
        let q = queue();
        q.add_rate_limited("a");
        assert_eq!(q.num_requeues(&"a"), 1);
        assert!(q.is_empty());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(q.is_empty(), "first retry is delayed by 100ms");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(q.len(), 1);

        let item = q.get().await.unwrap();
        assert_eq!(item.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forget_resets_requeue_count() {
        let q = queue();
        q.add_rate_limited("a");
        q.add_rate_limited("a");
        assert_eq!(q.num_requeues(&"a"), 2);

        q.forget(&"a");
        assert_eq!(q.num_requeues(&"a"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_add_after_shutdown_is_ignored() {
        let q = queue();
        q.shut_down();
        q.add_rate_limited("a");
        assert_eq!(q.num_requeues(&"a"), 0);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_time_is_first_add() {
        let q = queue();
        q.add("a");
        let first = {
            let state = q.lock();
            state.dirty[&"a"]
        };
        q.add("a");

        let item = q.get().await.unwrap();
        assert_eq!(item.enqueued_at, first);
    }
}
