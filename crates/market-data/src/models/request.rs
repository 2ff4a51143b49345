//! Fetch request model.

use chrono::NaiveDate;

use crate::errors::MarketDataError;

/// A single logical request for daily bars.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    /// Normalized (trimmed, upper-case) ticker symbol.
    pub symbol: String,
    /// First day of the range (inclusive).
    pub start: NaiveDate,
    /// Last day of the range (inclusive).
    pub end: NaiveDate,
    /// Allow a cached entry older than `max_cache_age_days` as the fallback.
    pub accept_stale: bool,
}

impl FetchRequest {
    /// Build a request, rejecting empty symbols and inverted ranges.
    pub fn new(
        symbol: impl AsRef<str>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Self, MarketDataError> {
        let symbol = symbol.as_ref().trim().to_ascii_uppercase();
        if symbol.is_empty() {
            return Err(MarketDataError::InvalidRequest {
                message: "symbol cannot be empty".to_string(),
            });
        }
        if symbol.contains(['/', '\\']) || symbol.contains("..") || symbol.starts_with('.') {
            return Err(MarketDataError::InvalidRequest {
                message: format!("symbol contains path characters: {}", symbol),
            });
        }
        if start > end {
            return Err(MarketDataError::InvalidRequest {
                message: format!("start {} is after end {}", start, end),
            });
        }

        Ok(Self {
            symbol,
            start,
            end,
            accept_stale: false,
        })
    }

    /// Opt into stale cache data when every live provider fails.
    pub fn accept_stale(mut self, accept: bool) -> Self {
        self.accept_stale = accept;
        self
    }
}
