//! Pricefeed Market Data Crate
//!
//! Rate-limited, retrying, cache-backed retrieval of daily OHLCV bars from
//! several upstream providers.
//!
//! # Overview
//!
//! The crate supports:
//! - Multiple providers: local cache, Yahoo Finance, Finnhub, Alpha Vantage
//! - Priority-ordered source selection
//! - Per-provider rate limiting with cooldowns
//! - Bounded exponential backoff with jitter
//! - A CSV snapshot cache that doubles as the last-resort fallback
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! |   FetchRequest   |  (symbol, start, end)
//! +------------------+
//!          |
//!          v
//! +------------------+     +------------------+
//! | RetrievalEngine  | --> |  SourceSelector  |  (priority + RateLimiter)
//! +------------------+     +------------------+
//!          |
//!          v
//! +------------------+
//! |    Provider      |  (one upstream call, retried per BackoffPolicy)
//! +------------------+
//!          |
//!          v
//! +------------------+     +------------------+
//! |   FetchResult    | <-- |    CacheStore    |  (write-back and fallback)
//! +------------------+     +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`RetrievalEngine`] - Drives one request through selection, retry and fallback
//! - [`DataSourceConfig`] - Priority table, limits, retry and fallback policy
//! - [`CacheStore`] - On-disk CSV snapshots keyed by symbol and date range
//! - [`DailyBar`] - One trading day of OHLCV data
//! - [`FetchResult`] - Bars plus provenance and diagnostics

pub mod cache;
pub mod config;
pub mod errors;
pub mod models;
pub mod provider;
pub mod registry;

// Re-export all public types from models
pub use models::{
    normalize_bars, DailyBar, DataOrigin, FetchRequest, FetchResult, Freshness, ProviderId,
    UnknownProvider,
};

pub use cache::{CacheEntry, CacheError, CacheStore};
pub use config::{
    ConfigError, DataSourceConfig, ErrorHandling, FallbackConfig, ProviderRateLimit, RetryPolicy,
    SourcePriority,
};
pub use errors::{ErrorKind, MarketDataError, RetryClass};

// Re-export provider types
pub use provider::{
    AlphaVantageProvider, FinnhubProvider, LocalCacheProvider, MarketDataProvider, YahooProvider,
};

// Re-export registry types
pub use registry::{
    BackoffPolicy, FetchDiagnostics, ProviderAttempt, RateLimiter, RetrievalEngine, SkipReason,
    SourceStatus,
};
