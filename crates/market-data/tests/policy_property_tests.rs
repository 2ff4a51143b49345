//! Property-based tests for the retry, limiting and normalization policies.
//!
//! These tests verify that universal properties hold across all valid inputs,
//! using the `proptest` crate for random test case generation.

use std::time::Duration;

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;

use pricefeed_market_data::{
    normalize_bars, BackoffPolicy, DailyBar, DataSourceConfig, ErrorHandling, ErrorKind,
    ProviderId, ProviderRateLimit, RateLimiter, RetryPolicy, SourcePriority,
};

// =============================================================================
// Generators
// =============================================================================

/// Generates a retry policy with base_delay <= max_delay.
fn arb_retry_policy() -> impl Strategy<Value = RetryPolicy> {
    (0u32..10, 1u64..10_000, 0u64..100_000, any::<bool>()).prop_map(
        |(max_retries, base_ms, extra_ms, random_jitter)| RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(base_ms + extra_ms),
            random_jitter,
        },
    )
}

/// Generates a bar on one of the first 60 days of 2024.
fn arb_bar() -> impl Strategy<Value = DailyBar> {
    (0i64..60, 1i64..100_000, 0u64..1_000_000).prop_map(|(offset, cents, volume)| {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(offset);
        let price = Decimal::new(cents, 2);
        DailyBar::unadjusted(date, price, price, price, price, volume)
    })
}

fn arb_kind() -> impl Strategy<Value = ErrorKind> {
    prop_oneof![
        Just(ErrorKind::ConnectionError),
        Just(ErrorKind::Timeout),
        Just(ErrorKind::RateLimited),
        Just(ErrorKind::NotFound),
        Just(ErrorKind::Malformed),
    ]
}

// =============================================================================
// Backoff
// =============================================================================

proptest! {
    #[test]
    fn prop_delay_never_exceeds_cap(policy in arb_retry_policy(), attempt in 1u32..64) {
        let backoff = BackoffPolicy::new(policy.clone(), ErrorHandling::default());
        let capped = backoff.capped_delay(attempt);

        prop_assert!(capped <= policy.max_delay);
        prop_assert!(backoff.next_delay(attempt) <= capped);
    }

    #[test]
    fn prop_capped_delay_is_monotonic(policy in arb_retry_policy(), attempt in 1u32..63) {
        let backoff = BackoffPolicy::new(policy, ErrorHandling::default());
        prop_assert!(backoff.capped_delay(attempt) <= backoff.capped_delay(attempt + 1));
    }

    #[test]
    fn prop_no_retry_past_budget(policy in arb_retry_policy(), kind in arb_kind(), extra in 1u32..5) {
        let backoff = BackoffPolicy::new(policy.clone(), ErrorHandling::default());
        prop_assert!(!backoff.should_retry(policy.max_retries + extra, kind));
    }

    #[test]
    fn prop_permanent_failures_never_retry(policy in arb_retry_policy(), attempt in 1u32..10) {
        let backoff = BackoffPolicy::new(policy, ErrorHandling::default());
        prop_assert!(!backoff.should_retry(attempt, ErrorKind::NotFound));
        prop_assert!(!backoff.should_retry(attempt, ErrorKind::Malformed));
    }
}

// =============================================================================
// Rate limiting
// =============================================================================

proptest! {
    #[test]
    fn prop_limiter_admits_min_of_requests_and_ceiling(ceiling in 1u32..50, requests in 0usize..120) {
        let mut config = DataSourceConfig::default();
        config.rate_limiting.insert(
            ProviderId::AlternativeApis,
            ProviderRateLimit {
                requests_per_minute: Some(ceiling),
                ..ProviderRateLimit::default()
            },
        );
        let limiter = RateLimiter::new(&config);

        let admitted = (0..requests)
            .filter(|_| limiter.try_acquire(ProviderId::AlternativeApis))
            .count();
        prop_assert_eq!(admitted, requests.min(ceiling as usize));
    }

    #[test]
    fn prop_tightest_window_wins(per_second in 1u32..20, per_minute in 1u32..20) {
        let mut config = DataSourceConfig::default();
        config.rate_limiting.insert(
            ProviderId::Finnhub,
            ProviderRateLimit {
                requests_per_second: Some(per_second),
                requests_per_minute: Some(per_minute),
                ..ProviderRateLimit::default()
            },
        );
        let limiter = RateLimiter::new(&config);

        let admitted = (0..50)
            .filter(|_| limiter.try_acquire(ProviderId::Finnhub))
            .count();
        prop_assert_eq!(admitted, per_second.min(per_minute) as usize);
    }
}

// =============================================================================
// Ordering and normalization
// =============================================================================

proptest! {
    #[test]
    fn prop_priority_orders_by_rank(ranks in proptest::collection::hash_set(0u32..1000, 4)) {
        let ranks: Vec<u32> = ranks.into_iter().collect();
        let priority =
            SourcePriority::from_ranks(ProviderId::ALL.into_iter().zip(ranks.iter().copied()))
                .unwrap();

        let ordered: Vec<u32> = priority
            .ordered()
            .map(|p| priority.rank_of(p).unwrap())
            .collect();
        let mut sorted = ordered.clone();
        sorted.sort_unstable();
        prop_assert_eq!(ordered, sorted);
        prop_assert_eq!(priority.len(), 4);
    }

    #[test]
    fn prop_normalized_bars_are_sorted_unique_and_in_range(
        bars in proptest::collection::vec(arb_bar(), 0..80),
        start_offset in 0i64..30,
        span in 0i64..30,
    ) {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(start_offset);
        let end = start + chrono::Duration::days(span);

        let out = normalize_bars(bars, start, end);

        prop_assert!(out.windows(2).all(|w| w[0].date < w[1].date));
        prop_assert!(out.iter().all(|b| b.date >= start && b.date <= end));
    }
}
