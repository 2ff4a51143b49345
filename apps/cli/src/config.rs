//! Environment-driven settings for the binary.

use std::path::PathBuf;

use pricefeed_market_data::{ConfigError, DataSourceConfig};

/// Output format of the log layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Root directory for all persisted data.
    pub data_dir: PathBuf,
    /// Optional JSON file overriding the built-in data-source policy.
    pub config_path: Option<PathBuf>,
    pub finnhub_api_key: Option<String>,
    pub alpha_vantage_api_key: Option<String>,
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Resolve settings from the process environment, reading `.env` first if present.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve settings through `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let log_format = match get("PRICEFEED_LOG_FORMAT") {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Self {
            data_dir: get("PRICEFEED_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            config_path: get("PRICEFEED_CONFIG").map(PathBuf::from),
            finnhub_api_key: get("FINNHUB_API_KEY"),
            alpha_vantage_api_key: get("ALPHA_VANTAGE_API_KEY"),
            log_format,
        }
    }

    /// Directory holding the CSV price snapshots.
    pub fn price_cache_dir(&self) -> PathBuf {
        self.data_dir.join("market_data").join("price_data")
    }

    /// Data-source policy from `config_path`, or the defaults.
    pub fn load_data_sources(&self) -> Result<DataSourceConfig, ConfigError> {
        match &self.config_path {
            Some(path) => DataSourceConfig::from_file(path),
            None => Ok(DataSourceConfig::default()),
        }
    }
}
