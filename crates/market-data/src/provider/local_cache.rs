//! Cache-backed provider.
//!
//! Lets the on-disk cache take part in normal priority ordering. Only fresh
//! snapshots are served here; stale ones are left for the fallback stage.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, info};

use crate::cache::CacheStore;
use crate::errors::MarketDataError;
use crate::models::{DailyBar, ProviderId};
use crate::provider::MarketDataProvider;

const PROVIDER_ID: ProviderId = ProviderId::LocalCache;

/// Serves fresh covering snapshots from a [`CacheStore`].
pub struct LocalCacheProvider {
    cache: Arc<CacheStore>,
}

impl LocalCacheProvider {
    pub fn new(cache: Arc<CacheStore>) -> Self {
        Self { cache }
    }

    fn not_found(symbol: &str) -> MarketDataError {
        MarketDataError::NotFound {
            provider: PROVIDER_ID,
            symbol: symbol.to_string(),
        }
    }
}

#[async_trait]
impl MarketDataProvider for LocalCacheProvider {
    fn id(&self) -> ProviderId {
        PROVIDER_ID
    }

    async fn fetch_daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, MarketDataError> {
        let entry = match self.cache.get(symbol, start, end) {
            Ok(Some(entry)) => entry,
            Ok(None) => return Err(Self::not_found(symbol)),
            Err(e) => {
                info!("Local cache unavailable for {}: {}", symbol, e);
                return Err(Self::not_found(symbol));
            }
        };

        if !self.cache.is_fresh(&entry) {
            debug!(
                "Cached {} at {} is stale, deferring to live providers",
                symbol,
                entry.path.display()
            );
            return Err(Self::not_found(symbol));
        }

        if entry.rows.is_empty() {
            return Err(Self::not_found(symbol));
        }

        Ok(entry.rows)
    }

    fn cache_results(&self) -> bool {
        false
    }
}
