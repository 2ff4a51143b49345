//! What to serve once every provider has been exhausted.

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::cache::CacheStore;
use crate::config::FallbackConfig;
use crate::models::{DailyBar, FetchRequest, Freshness};

/// Data recovered by a fallback strategy.
#[derive(Clone, Debug, PartialEq)]
pub struct FallbackData {
    pub bars: Vec<DailyBar>,
    pub freshness: Freshness,
}

/// Strategy consulted in the FALLBACK state.
pub trait FallbackStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce a substitute result for `request`, or `None` to fail the request.
    fn recover(&self, request: &FetchRequest, cache: &CacheStore, now: DateTime<Utc>)
        -> Option<FallbackData>;
}

/// Serves the most recent covering cache snapshot.
///
/// Stale snapshots are only served when the request opts in.
#[derive(Clone, Copy, Debug, Default)]
pub struct CacheFallback;

impl FallbackStrategy for CacheFallback {
    fn name(&self) -> &'static str {
        "cache"
    }

    fn recover(
        &self,
        request: &FetchRequest,
        cache: &CacheStore,
        now: DateTime<Utc>,
    ) -> Option<FallbackData> {
        let entry = match cache.get(&request.symbol, request.start, request.end) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!("No cache snapshot covers {} [{}..{}]", request.symbol, request.start, request.end);
                return None;
            }
            Err(e) => {
                info!("Cache lookup for {} failed: {}", request.symbol, e);
                return None;
            }
        };

        if entry.rows.is_empty() {
            debug!("Cache snapshot for {} has no rows in range", request.symbol);
            return None;
        }

        let freshness = cache.freshness_at(&entry, now);
        if let Freshness::Stale { age_days } = freshness {
            if !request.accept_stale {
                info!(
                    "Cache snapshot for {} is {} days old; stale data not accepted",
                    request.symbol, age_days
                );
                return None;
            }
        }

        Some(FallbackData {
            bars: entry.rows,
            freshness,
        })
    }
}

/// Never serves anything; exhaustion fails the request.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoFallback;

impl FallbackStrategy for NoFallback {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn recover(&self, _: &FetchRequest, _: &CacheStore, _: DateTime<Utc>) -> Option<FallbackData> {
        None
    }
}

/// Strategy selected by `use_cached_data_on_failure`.
pub fn fallback_strategy_for(config: &FallbackConfig) -> Box<dyn FallbackStrategy> {
    if config.use_cached_data_on_failure {
        Box::new(CacheFallback)
    } else {
        Box::new(NoFallback)
    }
}
