//! Finnhub market data provider implementation.
//!
//! Daily candles come from the /stock/candle endpoint (resolution `D`).
//! Finnhub free tier is limited to 60 API calls per minute.
//! API documentation: https://finnhub.io/docs/api

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::MarketDataError;
use crate::models::{DailyBar, ProviderId};
use crate::provider::MarketDataProvider;

const BASE_URL: &str = "https://finnhub.io/api/v1";
const PROVIDER_ID: ProviderId = ProviderId::Finnhub;

// ============================================================================
// API Response Structures
// ============================================================================

/// Response from /stock/candle endpoint
#[derive(Debug, Deserialize)]
struct CandleResponse {
    /// Status: "ok" or "no_data"
    s: String,
    /// Close prices
    #[serde(default)]
    c: Vec<f64>,
    /// High prices
    #[serde(default)]
    h: Vec<f64>,
    /// Low prices
    #[serde(default)]
    l: Vec<f64>,
    /// Open prices
    #[serde(default)]
    o: Vec<f64>,
    /// Volume
    #[serde(default)]
    v: Vec<f64>,
    /// Timestamps (Unix)
    #[serde(default)]
    t: Vec<i64>,
}

/// Error response from Finnhub
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<String>,
}

// ============================================================================
// FinnhubProvider
// ============================================================================

/// Finnhub market data provider.
pub struct FinnhubProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl FinnhubProvider {
    /// Create a new Finnhub provider with the given API key.
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

    /// Make a GET request to the Finnhub API.
    async fn fetch(
        &self,
        symbol: &str,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<String, MarketDataError> {
        let url = format!("{}{}", self.base_url, endpoint);

        // API key goes in a header so it never shows up in logged URLs.
        let request = self
            .client
            .get(&url)
            .header("X-Finnhub-Token", &self.api_key)
            .query(params);

        debug!("Finnhub request: {} with {} params", endpoint, params.len());

        let response = request
            .send()
            .await
            .map_err(|e| MarketDataError::from_transport(PROVIDER_ID, &e))?;

        let status = response.status();

        // 403 is how Finnhub reports an exhausted quota.
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::FORBIDDEN {
            return Err(MarketDataError::RateLimited {
                provider: PROVIDER_ID,
            });
        }

        if status == StatusCode::UNAUTHORIZED {
            return Err(MarketDataError::Malformed {
                provider: PROVIDER_ID,
                message: "Invalid or missing API key".to_string(),
            });
        }

        if status == StatusCode::NOT_FOUND {
            return Err(MarketDataError::NotFound {
                provider: PROVIDER_ID,
                symbol: symbol.to_string(),
            });
        }

        if status.is_server_error() {
            return Err(MarketDataError::ConnectionError {
                provider: PROVIDER_ID,
                message: format!("HTTP {}", status),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .ok()
                .and_then(|r| r.error)
                .unwrap_or_else(|| format!("HTTP {} - {}", status, body));
            return Err(MarketDataError::Malformed {
                provider: PROVIDER_ID,
                message,
            });
        }

        response
            .text()
            .await
            .map_err(|e| MarketDataError::from_transport(PROVIDER_ID, &e))
    }
}

/// Convert a candle payload into bars.
///
/// Rows with unusable timestamps or prices are skipped with a warning.
fn parse_candles(symbol: &str, text: &str) -> Result<Vec<DailyBar>, MarketDataError> {
    let response: CandleResponse =
        serde_json::from_str(text).map_err(|e| MarketDataError::Malformed {
            provider: PROVIDER_ID,
            message: format!("Failed to parse candle response: {}", e),
        })?;

    if response.s == "no_data" {
        return Err(MarketDataError::NotFound {
            provider: PROVIDER_ID,
            symbol: symbol.to_string(),
        });
    }

    if response.s != "ok" {
        return Err(MarketDataError::Malformed {
            provider: PROVIDER_ID,
            message: format!("Unexpected candle status: {}", response.s),
        });
    }

    // Validate array lengths match
    let len = response.t.len();
    if response.c.len() != len
        || response.o.len() != len
        || response.h.len() != len
        || response.l.len() != len
    {
        return Err(MarketDataError::Malformed {
            provider: PROVIDER_ID,
            message: "Mismatched array lengths in candle response".to_string(),
        });
    }

    let mut bars = Vec::with_capacity(len);

    for i in 0..len {
        let Some(timestamp) = Utc.timestamp_opt(response.t[i], 0).single() else {
            warn!("Invalid timestamp at index {}: {}", i, response.t[i]);
            continue;
        };

        let prices = [response.o[i], response.h[i], response.l[i], response.c[i]]
            .map(|p| Decimal::try_from(p).ok());
        let [Some(open), Some(high), Some(low), Some(close)] = prices else {
            warn!("Invalid price at index {} for {}", i, symbol);
            continue;
        };

        let volume = response
            .v
            .get(i)
            .copied()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v.round() as u64)
            .unwrap_or(0);

        bars.push(DailyBar::unadjusted(
            timestamp.date_naive(),
            open,
            high,
            low,
            close,
            volume,
        ));
    }

    Ok(bars)
}

#[async_trait]
impl MarketDataProvider for FinnhubProvider {
    fn id(&self) -> ProviderId {
        PROVIDER_ID
    }

    async fn fetch_daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, MarketDataError> {
        let from_ts = start
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or_default()
            .to_string();
        let to_ts = end
            .and_hms_opt(23, 59, 59)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or_default()
            .to_string();

        let params = [
            ("symbol", symbol),
            ("resolution", "D"),
            ("from", &from_ts),
            ("to", &to_ts),
        ];

        let text = self.fetch(symbol, "/stock/candle", &params).await?;
        let bars = parse_candles(symbol, &text)?;

        debug!(
            "Finnhub: fetched {} daily bars for {} ({} to {})",
            bars.len(),
            symbol,
            start,
            end
        );

        Ok(bars)
    }
}
