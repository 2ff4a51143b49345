//! Bar data validation.
//!
//! Validates daily bars from providers before they are returned or cached:
//! - OHLC invariants (high >= low, open/close between high/low)
//! - Non-negative prices
//! - Reasonable value ranges

use chrono::NaiveDate;
use log::warn;
use rust_decimal::Decimal;

use crate::errors::MarketDataError;
use crate::models::{normalize_bars, DailyBar, ProviderId};

/// Validation severity levels.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationSeverity {
    /// Hard failure - drop the bar.
    Hard,
    /// Soft warning - keep the bar but log.
    Soft,
}

/// Validation result details.
#[derive(Clone, Debug)]
pub struct ValidationIssue {
    pub severity: ValidationSeverity,
    pub message: String,
}

/// Bar validator configuration.
#[derive(Clone, Debug)]
pub struct ValidatorConfig {
    /// Whether to reject bars with negative prices.
    pub reject_negative_prices: bool,
    /// Whether to reject bars where high < low.
    pub reject_invalid_ohlc: bool,
    /// Maximum allowed price value (for sanity check).
    pub max_price: Option<Decimal>,
    /// Whether to warn on zero volume.
    pub warn_on_zero_volume: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            reject_negative_prices: true,
            reject_invalid_ohlc: true,
            max_price: Some(Decimal::from(1_000_000_000i64)),
            // Some providers report zero volume for index series.
            warn_on_zero_volume: false,
        }
    }
}

/// Validates adapter output before the engine accepts it.
#[derive(Clone, Debug, Default)]
pub struct BarValidator {
    config: ValidatorConfig,
}

impl BarValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// All issues found on a single bar.
    pub fn check(&self, bar: &DailyBar) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let hard = |message: String| ValidationIssue {
            severity: ValidationSeverity::Hard,
            message,
        };
        let soft = |message: String| ValidationIssue {
            severity: ValidationSeverity::Soft,
            message,
        };

        if self.config.reject_negative_prices {
            for (name, value) in [
                ("open", bar.open),
                ("high", bar.high),
                ("low", bar.low),
                ("close", bar.close),
                ("adj close", bar.adj_close),
            ] {
                if value < Decimal::ZERO {
                    issues.push(hard(format!("Negative {} price: {}", name, value)));
                }
            }
        }

        if self.config.reject_invalid_ohlc {
            if bar.high < bar.low {
                issues.push(hard(format!(
                    "High ({}) is less than Low ({})",
                    bar.high, bar.low
                )));
            } else {
                if bar.open < bar.low || bar.open > bar.high {
                    issues.push(soft(format!(
                        "Open ({}) is outside High/Low range ({}-{})",
                        bar.open, bar.low, bar.high
                    )));
                }
                if bar.close < bar.low || bar.close > bar.high {
                    issues.push(soft(format!(
                        "Close ({}) is outside High/Low range ({}-{})",
                        bar.close, bar.low, bar.high
                    )));
                }
            }
        }

        if let Some(max_price) = self.config.max_price {
            if bar.high > max_price || bar.close > max_price {
                issues.push(hard(format!(
                    "Price exceeds sanity limit {} (high {}, close {})",
                    max_price, bar.high, bar.close
                )));
            }
        }

        if self.config.warn_on_zero_volume && bar.volume == 0 {
            issues.push(soft("Zero volume".to_string()));
        }

        issues
    }

    /// Drop invalid bars, then sort and clip the rest to `[start, end]`.
    ///
    /// Fails with `NotFound` when nothing lies inside the range and with
    /// `Malformed` when bars were returned but every one of them was rejected.
    pub fn validate_batch(
        &self,
        provider: ProviderId,
        symbol: &str,
        bars: Vec<DailyBar>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, MarketDataError> {
        let received = bars.len();
        let mut rejected = 0usize;
        let mut first_reason: Option<String> = None;

        let accepted: Vec<DailyBar> = bars
            .into_iter()
            .filter(|bar| {
                let issues = self.check(bar);
                let hard: Vec<&str> = issues
                    .iter()
                    .filter(|i| i.severity == ValidationSeverity::Hard)
                    .map(|i| i.message.as_str())
                    .collect();
                if !hard.is_empty() {
                    warn!(
                        "Dropping bar for {} on {} from {}: {}",
                        symbol,
                        bar.date,
                        provider,
                        hard.join("; ")
                    );
                    rejected += 1;
                    first_reason.get_or_insert_with(|| hard.join("; "));
                    return false;
                }
                for issue in &issues {
                    warn!("Bar validation warning for {} on {}: {}", symbol, bar.date, issue.message);
                }
                true
            })
            .collect();

        if received > 0 && rejected == received {
            return Err(MarketDataError::Malformed {
                provider,
                message: format!(
                    "all {} bars failed validation ({})",
                    received,
                    first_reason.unwrap_or_default()
                ),
            });
        }

        let normalized = normalize_bars(accepted, start, end);
        if normalized.is_empty() {
            return Err(MarketDataError::NotFound {
                provider,
                symbol: symbol.to_string(),
            });
        }
        Ok(normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn bar(d: u32, open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> DailyBar {
        DailyBar::unadjusted(date(d), open, high, low, close, 1000)
    }

    #[test]
    fn test_valid_bar_has_no_issues() {
        let validator = BarValidator::new();
        assert!(validator
            .check(&bar(2, dec!(100), dec!(105), dec!(95), dec!(101)))
            .is_empty());
    }

    #[test]
    fn test_high_less_than_low_is_hard() {
        let validator = BarValidator::new();
        let issues = validator.check(&bar(2, dec!(100), dec!(90), dec!(95), dec!(100)));
        assert!(issues
            .iter()
            .any(|i| i.severity == ValidationSeverity::Hard && i.message.contains("less than Low")));
    }

    #[test]
    fn test_close_outside_range_is_soft() {
        let validator = BarValidator::new();
        let issues = validator.check(&bar(2, dec!(100), dec!(105), dec!(95), dec!(110)));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, ValidationSeverity::Soft);
    }

    #[test]
    fn test_batch_drops_bad_bars_and_sorts() {
        let validator = BarValidator::new();
        let bars = vec![
            bar(4, dec!(10), dec!(11), dec!(9), dec!(10)),
            bar(3, dec!(-1), dec!(11), dec!(9), dec!(10)),
            bar(2, dec!(10), dec!(11), dec!(9), dec!(10)),
        ];

        let out = validator
            .validate_batch(ProviderId::Finnhub, "AAPL", bars, date(1), date(31))
            .unwrap();
        assert_eq!(out.iter().map(|b| b.date).collect::<Vec<_>>(), vec![date(2), date(4)]);
    }

    #[test]
    fn test_batch_all_rejected_is_malformed() {
        let validator = BarValidator::new();
        let bars = vec![bar(2, dec!(10), dec!(5), dec!(9), dec!(10))];

        let err = validator
            .validate_batch(ProviderId::Finnhub, "AAPL", bars, date(1), date(31))
            .unwrap_err();
        assert!(matches!(err, MarketDataError::Malformed { .. }));
    }

    #[test]
    fn test_batch_outside_range_is_not_found() {
        let validator = BarValidator::new();
        let bars = vec![bar(20, dec!(10), dec!(11), dec!(9), dec!(10))];

        let err = validator
            .validate_batch(ProviderId::YahooFinance, "AAPL", bars, date(1), date(5))
            .unwrap_err();
        assert!(matches!(err, MarketDataError::NotFound { .. }));

        let err = validator
            .validate_batch(ProviderId::YahooFinance, "AAPL", Vec::new(), date(1), date(5))
            .unwrap_err();
        assert!(matches!(err, MarketDataError::NotFound { .. }));
    }
}
