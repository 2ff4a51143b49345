//! Synthetic price series for exercising the cache offline.

use chrono::{Datelike, NaiveDate, Weekday};
use num_traits::FromPrimitive;
use pricefeed_market_data::DailyBar;
use rand::Rng;
use rust_decimal::Decimal;

const BASE_PRICE: f64 = 200.0;
const MIN_PRICE: f64 = 50.0;
const MAX_PRICE: f64 = 400.0;
const MAX_DAILY_CHANGE: f64 = 0.05;

fn price(value: f64) -> Decimal {
    Decimal::from_f64(value)
        .unwrap_or_default()
        .round_dp(2)
}

/// Weekday-only random walk over `[start, end]`.
pub fn random_walk<R: Rng>(rng: &mut R, start: NaiveDate, end: NaiveDate) -> Vec<DailyBar> {
    let mut bars = Vec::new();
    let mut current = BASE_PRICE;

    for date in start.iter_days().take_while(|d| *d <= end) {
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            continue;
        }

        let change = rng.gen_range(-MAX_DAILY_CHANGE..=MAX_DAILY_CHANGE);
        current = (current * (1.0 + change)).clamp(MIN_PRICE, MAX_PRICE);

        let close = price(current);
        let open = price(current * rng.gen_range(0.98..=1.02));
        let high = price(current * rng.gen_range(1.00..=1.05)).max(open).max(close);
        let low = price(current * rng.gen_range(0.95..=1.00)).min(open).min(close);

        bars.push(DailyBar::unadjusted(
            date,
            open,
            high,
            low,
            close,
            rng.gen_range(10_000_000..=100_000_000),
        ));
    }

    bars
}
