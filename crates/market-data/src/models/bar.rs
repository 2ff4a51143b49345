//! Daily OHLCV bar model.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One trading day of price data for a symbol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Close adjusted for splits and dividends. Equals `close` when the
    /// provider does not report an adjusted series.
    pub adj_close: Decimal,
    pub volume: u64,
}

impl DailyBar {
    /// Bar whose adjusted close equals the close.
    pub fn unadjusted(
        date: NaiveDate,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: u64,
    ) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            adj_close: close,
            volume,
        }
    }
}

/// Sort bars by date, drop duplicates for the same day (last one wins) and
/// keep only those inside `[start, end]`.
pub fn normalize_bars(mut bars: Vec<DailyBar>, start: NaiveDate, end: NaiveDate) -> Vec<DailyBar> {
    bars.retain(|bar| bar.date >= start && bar.date <= end);
    // Stable sort keeps provider order for equal dates, so the later row survives dedup below.
    bars.sort_by_key(|bar| bar.date);

    let mut out: Vec<DailyBar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match out.last_mut() {
            Some(last) if last.date == bar.date => *last = bar,
            _ => out.push(bar),
        }
    }
    out
}
