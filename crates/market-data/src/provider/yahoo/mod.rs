//! Yahoo Finance market data provider.
//!
//! Daily history comes from the chart API through `yahoo_finance_api`.
//! Yahoo has no documented quota; the limiter defaults (60/min, 2000/h) and
//! the five minute cooldown come from observed throttling.

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use time::OffsetDateTime;
use tracing::{debug, warn};
use yahoo_finance_api as yahoo;

use crate::errors::MarketDataError;
use crate::models::{DailyBar, ProviderId};
use crate::provider::MarketDataProvider;

const PROVIDER_ID: ProviderId = ProviderId::YahooFinance;

/// Yahoo Finance market data provider.
pub struct YahooProvider {
    connector: yahoo::YahooConnector,
}

impl YahooProvider {
    /// Create a new Yahoo Finance provider.
    pub fn new() -> Result<Self, MarketDataError> {
        let connector =
            yahoo::YahooConnector::new().map_err(|e| MarketDataError::ConnectionError {
                provider: PROVIDER_ID,
                message: format!("Failed to initialize Yahoo connector: {}", e),
            })?;
        Ok(Self { connector })
    }

    /// Midnight UTC of `date` as the connector's time type.
    fn to_offset_datetime(date: NaiveDate) -> OffsetDateTime {
        let ts = date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or_default();
        OffsetDateTime::from_unix_timestamp(ts).unwrap_or_else(|_| OffsetDateTime::now_utc())
    }

    /// Convert a Yahoo quote to a daily bar.
    fn quote_to_bar(quote: &yahoo::Quote) -> Option<DailyBar> {
        let date = Utc
            .timestamp_opt(quote.timestamp as i64, 0)
            .single()?
            .date_naive();

        let close = Decimal::from_f64_retain(quote.close)?;
        Some(DailyBar {
            date,
            open: Decimal::from_f64_retain(quote.open)?,
            high: Decimal::from_f64_retain(quote.high)?,
            low: Decimal::from_f64_retain(quote.low)?,
            close,
            adj_close: Decimal::from_f64_retain(quote.adjclose).unwrap_or(close),
            volume: quote.volume as u64,
        })
    }

    /// Classify a connector error.
    fn map_error(symbol: &str, error: yahoo::YahooError) -> MarketDataError {
        if matches!(error, yahoo::YahooError::NoQuotes | yahoo::YahooError::NoResult) {
            return MarketDataError::NotFound {
                provider: PROVIDER_ID,
                symbol: symbol.to_string(),
            };
        }
        classify_message(error.to_string())
    }
}

/// Map a connector error message onto the taxonomy.
///
/// The connector wraps HTTP failures in strings, so the status has to be
/// recovered from the text.
fn classify_message(message: String) -> MarketDataError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("429") || lower.contains("too many requests") {
        MarketDataError::RateLimited {
            provider: PROVIDER_ID,
        }
    } else if lower.contains("timed out") || lower.contains("timeout") {
        MarketDataError::Timeout {
            provider: PROVIDER_ID,
        }
    } else if lower.contains("deserializ") || lower.contains("json") {
        MarketDataError::Malformed {
            provider: PROVIDER_ID,
            message,
        }
    } else {
        MarketDataError::ConnectionError {
            provider: PROVIDER_ID,
            message,
        }
    }
}

#[async_trait]
impl MarketDataProvider for YahooProvider {
    fn id(&self) -> ProviderId {
        PROVIDER_ID
    }

    async fn fetch_daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, MarketDataError> {
        debug!("Fetching daily bars for {} from {} to {} from Yahoo", symbol, start, end);

        // The chart API treats the end bound as exclusive.
        let start_time = Self::to_offset_datetime(start);
        let end_time = Self::to_offset_datetime(end.succ_opt().unwrap_or(end));

        let response = self
            .connector
            .get_quote_history(symbol, start_time, end_time)
            .await
            .map_err(|e| Self::map_error(symbol, e))?;

        let quotes = response.quotes().map_err(|e| Self::map_error(symbol, e))?;

        let received = quotes.len();
        let bars: Vec<DailyBar> = quotes.iter().filter_map(Self::quote_to_bar).collect();
        if bars.len() < received {
            warn!(
                "Skipped {} unconvertible Yahoo quotes for {}",
                received - bars.len(),
                symbol
            );
        }

        if bars.is_empty() {
            return Err(MarketDataError::NotFound {
                provider: PROVIDER_ID,
                symbol: symbol.to_string(),
            });
        }

        Ok(bars)
    }
}
