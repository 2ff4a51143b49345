//! Alpha Vantage market data provider implementation.
//!
//! Fills the `alternative_apis` slot with the TIME_SERIES_DAILY endpoint.
//!
//! Note: Alpha Vantage free tier is limited to 5 API calls per minute and
//! reports quota exhaustion in the body of an HTTP 200 response.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, warn};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::errors::MarketDataError;
use crate::models::{DailyBar, ProviderId};
use crate::provider::MarketDataProvider;

const BASE_URL: &str = "https://www.alphavantage.co/query";
const PROVIDER_ID: ProviderId = ProviderId::AlternativeApis;

/// Compact responses hold the most recent 100 trading days.
const COMPACT_DAYS: i64 = 100;

/// Alpha Vantage market data provider.
pub struct AlphaVantageProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

// ============================================================================
// Response structures for Alpha Vantage API
// ============================================================================

/// TIME_SERIES_DAILY response for equities
#[derive(Debug, Deserialize)]
struct TimeSeriesResponse {
    #[serde(rename = "Time Series (Daily)")]
    time_series: Option<HashMap<String, DailyQuote>>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DailyQuote {
    #[serde(rename = "1. open")]
    open: String,
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. volume")]
    volume: String,
}

impl DailyQuote {
    fn to_bar(&self, date: NaiveDate) -> Option<DailyBar> {
        Some(DailyBar::unadjusted(
            date,
            Decimal::from_str(&self.open).ok()?,
            Decimal::from_str(&self.high).ok()?,
            Decimal::from_str(&self.low).ok()?,
            Decimal::from_str(&self.close).ok()?,
            self.volume.parse().ok()?,
        ))
    }
}

impl AlphaVantageProvider {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }

    /// Point the provider at a different API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch(&self, params: &[(&str, &str)]) -> Result<String, MarketDataError> {
        let mut all_params: Vec<(&str, &str)> = params.to_vec();
        all_params.push(("apikey", &self.api_key));

        let url = reqwest::Url::parse_with_params(&self.base_url, &all_params).map_err(|e| {
            MarketDataError::Malformed {
                provider: PROVIDER_ID,
                message: format!("Failed to build URL: {}", e),
            }
        })?;

        debug!(
            "Alpha Vantage request: {}",
            url.as_str().replace(&self.api_key, "***")
        );

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MarketDataError::from_transport(PROVIDER_ID, &e))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(MarketDataError::RateLimited {
                provider: PROVIDER_ID,
            });
        }

        if status.is_server_error() {
            return Err(MarketDataError::ConnectionError {
                provider: PROVIDER_ID,
                message: format!("HTTP {}", status),
            });
        }

        if !status.is_success() {
            return Err(MarketDataError::Malformed {
                provider: PROVIDER_ID,
                message: format!("HTTP {}", status),
            });
        }

        response
            .text()
            .await
            .map_err(|e| MarketDataError::from_transport(PROVIDER_ID, &e))
    }

    /// Turn in-body error fields into errors.
    fn check_api_error(
        symbol: &str,
        error_message: &Option<String>,
        note: &Option<String>,
        information: &Option<String>,
    ) -> Result<(), MarketDataError> {
        if let Some(msg) = error_message {
            debug!("Alpha Vantage error for {}: {}", symbol, msg);
            return Err(MarketDataError::NotFound {
                provider: PROVIDER_ID,
                symbol: symbol.to_string(),
            });
        }

        for msg in [note, information].into_iter().flatten() {
            let lower = msg.to_ascii_lowercase();
            if lower.contains("api call frequency")
                || lower.contains("rate limit")
                || lower.contains("requests per day")
            {
                return Err(MarketDataError::RateLimited {
                    provider: PROVIDER_ID,
                });
            }
            warn!("Alpha Vantage notice: {}", msg);
        }

        Ok(())
    }

    fn parse_daily(symbol: &str, text: &str) -> Result<Vec<DailyBar>, MarketDataError> {
        let response: TimeSeriesResponse =
            serde_json::from_str(text).map_err(|e| MarketDataError::Malformed {
                provider: PROVIDER_ID,
                message: format!("Failed to parse response: {}", e),
            })?;

        Self::check_api_error(
            symbol,
            &response.error_message,
            &response.note,
            &response.information,
        )?;

        let series = response.time_series.ok_or_else(|| MarketDataError::Malformed {
            provider: PROVIDER_ID,
            message: "Response has no daily time series".to_string(),
        })?;

        let mut bars = Vec::with_capacity(series.len());
        for (date_str, quote) in &series {
            let parsed = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
                .ok()
                .and_then(|date| quote.to_bar(date));
            match parsed {
                Some(bar) => bars.push(bar),
                None => warn!("Skipping unparseable Alpha Vantage row {} for {}", date_str, symbol),
            }
        }
        Ok(bars)
    }
}

#[async_trait]
impl MarketDataProvider for AlphaVantageProvider {
    fn id(&self) -> ProviderId {
        PROVIDER_ID
    }

    async fn fetch_daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, MarketDataError> {
        let today = chrono::Utc::now().date_naive();
        let output_size = if (today - start).num_days() <= COMPACT_DAYS {
            "compact"
        } else {
            "full"
        };

        let text = self
            .fetch(&[
                ("function", "TIME_SERIES_DAILY"),
                ("symbol", symbol),
                ("outputsize", output_size),
            ])
            .await?;

        let bars = Self::parse_daily(symbol, &text)?;
        debug!(
            "Alpha Vantage: {} daily bars for {} (requested {} to {})",
            bars.len(),
            symbol,
            start,
            end
        );
        Ok(bars)
    }
}
