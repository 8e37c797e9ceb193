// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `retry.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use std::time::Duration;

    fn no_jitter() -> BackoffConfig {
        BackoffConfig {
            randomization_factor: 0.0,
            ..BackoffConfig::default()
        }
    }

    /// Test that backoff configuration has expected values
    #[test]
    fn test_backoff_configuration() {
        let backoff = BackoffConfig::default();

        assert_eq!(
            backoff.initial_interval,
            Duration::from_millis(100),
            "Initial interval should be 100ms"
        );
        assert_eq!(
            backoff.max_interval,
            Duration::from_secs(30),
            "Max interval should be 30 seconds"
        );

        #[allow(clippy::float_cmp)]
        {
            assert_eq!(
                backoff.multiplier, 2.0,
                "Multiplier should be 2.0 for exponential growth"
            );
            assert_eq!(
                backoff.randomization_factor, 0.1,
                "Randomization factor should be 0.1 (±10%)"
            );
        }
    }

    /// Test backoff timing progression
    #[test]
    fn test_base_delay_doubles() {
        let config = no_jitter();
        assert_eq!(config.base_delay(0), Duration::from_millis(100));
        assert_eq!(config.base_delay(1), Duration::from_millis(200));
        assert_eq!(config.base_delay(2), Duration::from_millis(400));
        assert_eq!(config.base_delay(3), Duration::from_millis(800));
    }

    /// Test that max interval is respected
    #[test]
    fn test_max_interval_capping() {
        let config = no_jitter();
        assert_eq!(config.base_delay(9), Duration::from_secs(30));
        assert_eq!(config.base_delay(50), Duration::from_secs(30));
        assert_eq!(config.base_delay(u32::MAX), Duration::from_secs(30));
    }

    /// Test that jitter stays within ±10%
    #[test]
    fn test_jitter_bounds() {
        let config = BackoffConfig::default();
        for _ in 0..100 {
            let delay = config.delay(1);
            assert!(
                delay >= Duration::from_millis(179) && delay <= Duration::from_millis(221),
                "Second retry should be ~200ms (±10%), got {delay:?}"
            );
        }
    }

    #[test]
    fn test_item_backoff_counts_per_key() {
        let mut backoff = ItemBackoff::new(no_jitter());

        assert_eq!(backoff.requeues(&"a"), 0);
        assert_eq!(backoff.next_delay(&"a"), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(&"a"), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(&"b"), Duration::from_millis(100));
        assert_eq!(backoff.requeues(&"a"), 2);
        assert_eq!(backoff.requeues(&"b"), 1);
    }

    #[test]
    fn test_item_backoff_forget_resets() {
        let mut backoff = ItemBackoff::new(no_jitter());
        backoff.next_delay(&"a");
        backoff.next_delay(&"a");

        backoff.forget(&"a");
        assert_eq!(backoff.requeues(&"a"), 0);
        assert_eq!(backoff.next_delay(&"a"), Duration::from_millis(100));
    }
}
