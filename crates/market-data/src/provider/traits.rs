//! Market data provider trait definitions.
//!
//! This module defines the core `MarketDataProvider` trait that all
//! upstream adapters implement.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::errors::MarketDataError;
use crate::models::{DailyBar, ProviderId};

/// Trait for market data providers.
///
/// An adapter performs exactly one upstream fetch per call. It does not
/// retry, rate limit, or cache; the retrieval engine owns all of that.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use pricefeed_market_data::provider::MarketDataProvider;
///
/// struct MyProvider {
///     api_key: String,
/// }
///
/// #[async_trait]
/// impl MarketDataProvider for MyProvider {
///     fn id(&self) -> ProviderId {
///         ProviderId::AlternativeApis
///     }
///
///     async fn fetch_daily_bars(&self, symbol: &str, start: NaiveDate, end: NaiveDate)
///         -> Result<Vec<DailyBar>, MarketDataError> {
///         // ...
///     }
/// }
/// ```
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Slot in the priority table this adapter fills.
    fn id(&self) -> ProviderId;

    /// Fetch daily bars for `symbol` over `[start, end]` (both inclusive).
    ///
    /// Failures must be one of `ConnectionError`, `Timeout`, `RateLimited`,
    /// `NotFound` or `Malformed`. Bars may be unsorted; the engine validates,
    /// sorts and clips them.
    async fn fetch_daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, MarketDataError>;

    /// Whether results from this adapter should be written back to the cache.
    fn cache_results(&self) -> bool {
        true
    }
}
