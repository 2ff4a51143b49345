//! Caller-facing result of a retrieval.

use std::fmt;

use chrono::NaiveDate;

use super::{DailyBar, ProviderId};
use crate::registry::FetchDiagnostics;

/// Where the returned bars came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataOrigin {
    /// A provider call succeeded during this request.
    Provider(ProviderId),
    /// Every provider failed and a cache snapshot was served instead.
    Cache,
}

impl fmt::Display for DataOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provider(id) => write!(f, "{}", id),
            Self::Cache => f.write_str("cache"),
        }
    }
}

/// Whether the data may stand in for a live fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    /// Cached data older than the configured maximum age.
    Stale { age_days: i64 },
}

impl Freshness {
    pub fn is_fresh(self) -> bool {
        matches!(self, Self::Fresh)
    }
}

/// Successful outcome of [`RetrievalEngine::fetch`](crate::registry::RetrievalEngine::fetch).
#[derive(Clone, Debug)]
pub struct FetchResult {
    pub symbol: String,
    /// Bars ordered by date, clipped to the requested range.
    pub bars: Vec<DailyBar>,
    pub source: DataOrigin,
    pub freshness: Freshness,
    pub diagnostics: FetchDiagnostics,
}

impl FetchResult {
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    pub fn is_fallback(&self) -> bool {
        self.source == DataOrigin::Cache
    }

    /// One-line provenance note, e.g. `source: finnhub (fresh)`.
    pub fn source_info(&self) -> String {
        match self.freshness {
            Freshness::Fresh => format!("source: {} (fresh)", self.source),
            Freshness::Stale { age_days } => {
                format!("source: {} (stale, {} days old)", self.source, age_days)
            }
        }
    }
}
