//! Market data provider abstractions and implementations.
//!
//! This module contains:
//! - The `MarketDataProvider` trait that all providers implement
//! - Concrete provider implementations (local cache, Yahoo, Finnhub, Alpha Vantage)
//!
//! Adapters make exactly one upstream call per invocation. Retry, rate
//! limiting and fallback all live in the [`registry`](crate::registry).

mod traits;

pub mod alpha_vantage;
pub mod finnhub;
pub mod local_cache;
pub mod yahoo;

pub use alpha_vantage::AlphaVantageProvider;
pub use finnhub::FinnhubProvider;
pub use local_cache::LocalCacheProvider;
pub use traits::MarketDataProvider;
pub use yahoo::YahooProvider;
