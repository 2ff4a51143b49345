//! End-to-end retrieval scenarios against scripted providers and a temp cache.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal_macros::dec;
use tempfile::TempDir;

use pricefeed_market_data::registry::AttemptOutcome;
use pricefeed_market_data::{
    CacheStore, DailyBar, DataOrigin, DataSourceConfig, ErrorKind, FetchRequest, Freshness,
    LocalCacheProvider, MarketDataError, MarketDataProvider, ProviderId, ProviderRateLimit,
    RateLimiter, RetrievalEngine, RetryPolicy, SkipReason, SourcePriority,
};

// =============================================================================
// Fixtures
// =============================================================================

/// Replays a script of outcomes, repeating the last one forever.
struct Scripted {
    id: ProviderId,
    script: Mutex<VecDeque<Result<Vec<DailyBar>, ErrorKind>>>,
    calls: AtomicUsize,
}

impl Scripted {
    fn new(id: ProviderId, steps: Vec<Result<Vec<DailyBar>, ErrorKind>>) -> Arc<Self> {
        Arc::new(Self {
            id,
            script: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn always(id: ProviderId, step: Result<Vec<DailyBar>, ErrorKind>) -> Arc<Self> {
        Self::new(id, vec![step])
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataProvider for Scripted {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn fetch_daily_bars(
        &self,
        symbol: &str,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<DailyBar>, MarketDataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap()
            }
        };
        let provider = self.id;
        step.map_err(|kind| match kind {
            ErrorKind::RateLimited => MarketDataError::RateLimited { provider },
            ErrorKind::Timeout => MarketDataError::Timeout { provider },
            ErrorKind::NotFound => MarketDataError::NotFound {
                provider,
                symbol: symbol.to_string(),
            },
            _ => MarketDataError::ConnectionError {
                provider,
                message: "connection refused".to_string(),
            },
        })
    }
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn bars(close: rust_decimal::Decimal) -> Vec<DailyBar> {
    vec![
        DailyBar::unadjusted(date("2024-01-02"), dec!(100), dec!(110), dec!(95), close, 1_000),
        DailyBar::unadjusted(date("2024-01-03"), dec!(101), dec!(111), dec!(96), close, 2_000),
    ]
}

fn request(symbol: &str) -> FetchRequest {
    FetchRequest::new(symbol, date("2024-01-01"), date("2024-01-31")).unwrap()
}

fn config(order: &[ProviderId]) -> DataSourceConfig {
    let mut config = DataSourceConfig::default();
    config.source_priority =
        SourcePriority::from_ranks(order.iter().zip(1u32..).map(|(p, r)| (*p, r))).unwrap();
    config.retry = RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(200),
        max_delay: Duration::from_secs(2),
        random_jitter: true,
    };
    config
}

fn engine(
    config: DataSourceConfig,
    providers: Vec<Arc<dyn MarketDataProvider>>,
    cache: Arc<CacheStore>,
) -> RetrievalEngine {
    RetrievalEngine::new(Arc::new(config), providers, cache)
}

fn cache_in(dir: &TempDir) -> Arc<CacheStore> {
    Arc::new(CacheStore::new(dir.path(), 30))
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test(start_paused = true)]
async fn rate_limited_primary_falls_through_to_next_provider() {
    let dir = TempDir::new().unwrap();
    let yahoo = Scripted::always(ProviderId::YahooFinance, Err(ErrorKind::RateLimited));
    let finnhub = Scripted::always(ProviderId::Finnhub, Ok(bars(dec!(105))));
    let engine = engine(
        config(&[ProviderId::YahooFinance, ProviderId::Finnhub]),
        vec![yahoo.clone(), finnhub.clone()],
        cache_in(&dir),
    );

    let result = engine.fetch(&request("AAPL")).await.unwrap();

    assert_eq!(result.source, DataOrigin::Provider(ProviderId::Finnhub));
    assert_eq!(result.freshness, Freshness::Fresh);
    assert_eq!(yahoo.calls(), 1, "rate limited providers are not retried in place");
    assert_eq!(finnhub.calls(), 1);
    assert!(engine
        .rate_limiter()
        .cooldown_remaining(ProviderId::YahooFinance)
        .is_some());
    assert_eq!(
        result.diagnostics.last_errors(),
        vec![(ProviderId::YahooFinance, ErrorKind::RateLimited)]
    );
}

#[tokio::test(start_paused = true)]
async fn connection_errors_exhaust_retries_then_serve_fresh_cache() {
    let dir = TempDir::new().unwrap();
    let cache = cache_in(&dir);
    cache
        .put("AAPL", date("2023-12-01"), date("2024-02-29"), &bars(dec!(99)))
        .unwrap();

    let yahoo = Scripted::always(ProviderId::YahooFinance, Err(ErrorKind::ConnectionError));
    let engine = engine(
        config(&[ProviderId::YahooFinance]),
        vec![yahoo.clone()],
        cache,
    );

    let started = tokio::time::Instant::now();
    let result = engine.fetch(&request("AAPL")).await.unwrap();

    assert_eq!(yahoo.calls(), 3);
    assert_eq!(result.source, DataOrigin::Cache);
    assert_eq!(result.freshness, Freshness::Fresh);
    assert_eq!(result.bars, bars(dec!(99)));
    assert!(result.is_fallback());
    // Two jittered waits, each capped at base * 2^(n-1).
    assert!(started.elapsed() <= Duration::from_millis(200 + 400));
}

#[tokio::test(start_paused = true)]
async fn nothing_succeeds_and_no_cache_is_no_data_available() {
    let dir = TempDir::new().unwrap();
    let yahoo = Scripted::always(ProviderId::YahooFinance, Err(ErrorKind::Timeout));
    let finnhub = Scripted::always(ProviderId::Finnhub, Err(ErrorKind::NotFound));
    let engine = engine(
        config(&[ProviderId::YahooFinance, ProviderId::Finnhub, ProviderId::AlternativeApis]),
        vec![yahoo.clone(), finnhub.clone()],
        cache_in(&dir),
    );

    let err = engine.fetch(&request("ZZZZ")).await.unwrap_err();

    match err {
        MarketDataError::NoDataAvailable { symbol, attempts } => {
            assert_eq!(symbol, "ZZZZ");
            assert_eq!(attempts.call_count(ProviderId::YahooFinance), 3);
            assert_eq!(attempts.call_count(ProviderId::Finnhub), 1);
            assert!(attempts
                .skip_reasons()
                .contains(&(ProviderId::AlternativeApis, &SkipReason::NotRegistered)));
            assert!(!attempts.has_success());
        }
        other => panic!("expected NoDataAvailable, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn stale_cache_needs_explicit_opt_in() {
    let dir = TempDir::new().unwrap();
    let cache = cache_in(&dir);
    let written_at = Utc::now() - chrono::Duration::days(31);
    cache
        .put_with_timestamp("MSFT", date("2024-01-01"), date("2024-01-31"), &bars(dec!(50)), written_at)
        .unwrap();

    let yahoo = Scripted::always(ProviderId::YahooFinance, Err(ErrorKind::NotFound));
    let engine = engine(
        config(&[ProviderId::LocalCache, ProviderId::YahooFinance]),
        vec![
            Arc::new(LocalCacheProvider::new(Arc::clone(&cache))),
            yahoo.clone(),
        ],
        cache,
    );

    let err = engine.fetch(&request("MSFT")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoDataAvailable);

    let result = engine
        .fetch(&request("MSFT").accept_stale(true))
        .await
        .unwrap();
    assert_eq!(result.source, DataOrigin::Cache);
    assert_eq!(result.freshness, Freshness::Stale { age_days: 31 });
    assert!(result.source_info().contains("stale"));
}

#[tokio::test(start_paused = true)]
async fn fresh_cache_at_top_priority_short_circuits_providers() {
    let dir = TempDir::new().unwrap();
    let cache = cache_in(&dir);
    cache
        .put("TSLA", date("2024-01-01"), date("2024-01-31"), &bars(dec!(200)))
        .unwrap();

    let yahoo = Scripted::always(ProviderId::YahooFinance, Ok(bars(dec!(1))));
    let engine = engine(
        config(&[ProviderId::LocalCache, ProviderId::YahooFinance]),
        vec![
            Arc::new(LocalCacheProvider::new(Arc::clone(&cache))),
            yahoo.clone(),
        ],
        Arc::clone(&cache),
    );

    let result = engine.fetch(&request("TSLA")).await.unwrap();

    assert_eq!(result.source, DataOrigin::Provider(ProviderId::LocalCache));
    assert_eq!(result.bars, bars(dec!(200)));
    assert_eq!(yahoo.calls(), 0);
    // Served from cache, so nothing new was written.
    assert_eq!(cache.list("TSLA").unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn repeated_success_leaves_a_single_snapshot() {
    let dir = TempDir::new().unwrap();
    let cache = cache_in(&dir);
    let yahoo = Scripted::always(ProviderId::YahooFinance, Ok(bars(dec!(10))));
    let engine = engine(
        config(&[ProviderId::YahooFinance]),
        vec![yahoo.clone()],
        Arc::clone(&cache),
    );

    engine.fetch(&request("NVDA")).await.unwrap();
    engine.fetch(&request("NVDA")).await.unwrap();

    let entries = cache.list("NVDA").unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].rows, bars(dec!(10)));
    let files = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(files, 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_requests_respect_the_window_ceiling() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&[ProviderId::YahooFinance, ProviderId::Finnhub]);
    config.rate_limiting.insert(
        ProviderId::YahooFinance,
        ProviderRateLimit {
            requests_per_minute: Some(3),
            ..ProviderRateLimit::default()
        },
    );
    config.rate_limiting.remove(&ProviderId::Finnhub);

    let yahoo = Scripted::always(ProviderId::YahooFinance, Ok(bars(dec!(1))));
    let finnhub = Scripted::always(ProviderId::Finnhub, Ok(bars(dec!(2))));
    let engine = Arc::new(engine(
        config,
        vec![yahoo.clone(), finnhub.clone()],
        cache_in(&dir),
    ));

    let mut tasks = tokio::task::JoinSet::new();
    for symbol in ["A", "B", "C", "D", "E"] {
        let engine = Arc::clone(&engine);
        tasks.spawn(async move { engine.fetch(&request(symbol)).await });
    }

    let mut by_yahoo = 0;
    let mut by_finnhub = 0;
    while let Some(joined) = tasks.join_next().await {
        let result = joined.unwrap().unwrap();
        match result.source {
            DataOrigin::Provider(ProviderId::YahooFinance) => by_yahoo += 1,
            DataOrigin::Provider(ProviderId::Finnhub) => {
                by_finnhub += 1;
                assert!(result.diagnostics.attempts.iter().any(|a| {
                    a.provider_id == ProviderId::YahooFinance
                        && a.outcome == AttemptOutcome::Skipped(SkipReason::RateLimited)
                }));
            }
            other => panic!("unexpected source {other}"),
        }
    }

    assert_eq!(yahoo.calls(), 3);
    assert_eq!((by_yahoo, by_finnhub), (3, 2));
}

#[test]
fn limiter_admits_exactly_the_ceiling_across_threads() {
    let mut config = DataSourceConfig::default();
    config.rate_limiting.insert(
        ProviderId::Finnhub,
        ProviderRateLimit {
            requests_per_hour: Some(40),
            ..ProviderRateLimit::default()
        },
    );
    let limiter = Arc::new(RateLimiter::new(&config));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            std::thread::spawn(move || {
                (0..20)
                    .filter(|_| limiter.try_acquire(ProviderId::Finnhub))
                    .count()
            })
        })
        .collect();

    let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(admitted, 40);
}
