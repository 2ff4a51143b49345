//! Upstream data source identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of an upstream market data source.
///
/// The set is fixed at compile time; which of them are actually consulted,
/// and in what order, comes from [`SourcePriority`](crate::config::SourcePriority).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    /// Fresh snapshots already on disk.
    LocalCache,
    YahooFinance,
    Finnhub,
    /// Secondary HTTP APIs (Alpha Vantage).
    AlternativeApis,
}

impl ProviderId {
    pub const ALL: [Self; 4] = [
        Self::LocalCache,
        Self::YahooFinance,
        Self::Finnhub,
        Self::AlternativeApis,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LocalCache => "local_cache",
            Self::YahooFinance => "yahoo_finance",
            Self::Finnhub => "finnhub",
            Self::AlternativeApis => "alternative_apis",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown provider name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown provider '{0}', expected one of local_cache, yahoo_finance, finnhub, alternative_apis")]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderId {
    type Err = UnknownProvider;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local_cache" => Ok(Self::LocalCache),
            "yahoo_finance" => Ok(Self::YahooFinance),
            "finnhub" => Ok(Self::Finnhub),
            "alternative_apis" => Ok(Self::AlternativeApis),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("Yahoo_Finance".parse::<ProviderId>(), Ok(ProviderId::YahooFinance));
        assert_eq!(" finnhub ".parse::<ProviderId>(), Ok(ProviderId::Finnhub));
        assert!("polygon".parse::<ProviderId>().is_err());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&ProviderId::AlternativeApis).unwrap();
        assert_eq!(json, "\"alternative_apis\"");

        let parsed: ProviderId = serde_json::from_str("\"local_cache\"").unwrap();
        assert_eq!(parsed, ProviderId::LocalCache);
    }
}
