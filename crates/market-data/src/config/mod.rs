//! Static data-source configuration.
//!
//! Loaded once at startup (JSON) and shared read-only behind an `Arc`. The
//! defaults reproduce the policy table the tool has always shipped with:
//! cache first, then Yahoo Finance, Finnhub, and the alternative APIs.

mod duration_secs;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ProviderId;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Priority rank {rank} is assigned to both {first} and {second}")]
    DuplicateRank {
        rank: u32,
        first: ProviderId,
        second: ProviderId,
    },

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ============================================================================
// Source priority
// ============================================================================

/// Total order over providers. Lower rank is tried first.
///
/// Serialized as a `{provider: rank}` map; ranks must be unique.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<ProviderId, u32>", into = "BTreeMap<ProviderId, u32>")]
pub struct SourcePriority {
    ranked: Vec<(u32, ProviderId)>,
}

impl SourcePriority {
    /// Build from `(provider, rank)` pairs.
    pub fn from_ranks(
        ranks: impl IntoIterator<Item = (ProviderId, u32)>,
    ) -> Result<Self, ConfigError> {
        let mut by_rank: BTreeMap<u32, ProviderId> = BTreeMap::new();
        let mut seen: HashMap<ProviderId, u32> = HashMap::new();

        for (provider, rank) in ranks {
            if let Some(previous) = seen.insert(provider, rank) {
                return Err(ConfigError::Invalid(format!(
                    "provider {} ranked twice ({} and {})",
                    provider, previous, rank
                )));
            }
            if let Some(first) = by_rank.insert(rank, provider) {
                return Err(ConfigError::DuplicateRank {
                    rank,
                    first,
                    second: provider,
                });
            }
        }

        Ok(Self {
            ranked: by_rank.into_iter().collect(),
        })
    }

    /// Providers in the order they should be tried.
    pub fn ordered(&self) -> impl Iterator<Item = ProviderId> + '_ {
        self.ranked.iter().map(|(_, provider)| *provider)
    }

    pub fn rank_of(&self, provider: ProviderId) -> Option<u32> {
        self.ranked
            .iter()
            .find(|(_, p)| *p == provider)
            .map(|(rank, _)| *rank)
    }

    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }
}

impl Default for SourcePriority {
    fn default() -> Self {
        Self {
            ranked: vec![
                (1, ProviderId::LocalCache),
                (2, ProviderId::YahooFinance),
                (3, ProviderId::Finnhub),
                (4, ProviderId::AlternativeApis),
            ],
        }
    }
}

impl TryFrom<BTreeMap<ProviderId, u32>> for SourcePriority {
    type Error = ConfigError;

    fn try_from(map: BTreeMap<ProviderId, u32>) -> Result<Self, Self::Error> {
        Self::from_ranks(map)
    }
}

impl From<SourcePriority> for BTreeMap<ProviderId, u32> {
    fn from(priority: SourcePriority) -> Self {
        priority
            .ranked
            .into_iter()
            .map(|(rank, provider)| (provider, rank))
            .collect()
    }
}

// ============================================================================
// Rate limiting
// ============================================================================

/// Request ceilings for one provider. Every configured window is enforced
/// independently; a call needs headroom in all of them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderRateLimit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests_per_second: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests_per_minute: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests_per_hour: Option<u32>,
    /// How long the provider is skipped after it reports rate limiting.
    #[serde(
        with = "duration_secs::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub cooldown_period: Option<Duration>,
}

impl ProviderRateLimit {
    /// Configured `(window length, ceiling)` pairs.
    pub fn windows(&self) -> Vec<(Duration, u32)> {
        [
            (Duration::from_secs(1), self.requests_per_second),
            (Duration::from_secs(60), self.requests_per_minute),
            (Duration::from_secs(3600), self.requests_per_hour),
        ]
        .into_iter()
        .filter_map(|(window, ceiling)| ceiling.map(|c| (window, c)))
        .collect()
    }
}

// ============================================================================
// Retry / fallback / error handling
// ============================================================================

/// Retry parameters for a single provider within one request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    #[serde(with = "duration_secs")]
    pub base_delay: Duration,
    #[serde(with = "duration_secs")]
    pub max_delay: Duration,
    pub random_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(30),
            random_jitter: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Serve a cache snapshot when every provider failed.
    pub use_cached_data_on_failure: bool,
    /// Maximum age for a cache entry to count as fresh.
    pub max_cache_age_days: u32,
    /// Log and print which source served each request.
    pub show_data_source_info: bool,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            use_cached_data_on_failure: true,
            max_cache_age_days: 30,
            show_data_source_info: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorHandling {
    pub retry_on_connection_error: bool,
    pub retry_on_timeout: bool,
    pub retry_on_rate_limit: bool,
    pub log_errors: bool,
}

impl Default for ErrorHandling {
    fn default() -> Self {
        Self {
            retry_on_connection_error: true,
            retry_on_timeout: true,
            retry_on_rate_limit: true,
            log_errors: true,
        }
    }
}

// ============================================================================
// Top-level config
// ============================================================================

/// Complete data-source policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSourceConfig {
    pub source_priority: SourcePriority,
    pub rate_limiting: BTreeMap<ProviderId, ProviderRateLimit>,
    /// Cooldown for providers without their own `cooldown_period`.
    #[serde(with = "duration_secs")]
    pub default_cooldown: Duration,
    pub retry: RetryPolicy,
    pub fallback: FallbackConfig,
    pub error_handling: ErrorHandling,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        let mut rate_limiting = BTreeMap::new();
        rate_limiting.insert(
            ProviderId::YahooFinance,
            ProviderRateLimit {
                requests_per_minute: Some(60),
                requests_per_hour: Some(2000),
                cooldown_period: Some(Duration::from_secs(300)),
                ..ProviderRateLimit::default()
            },
        );
        rate_limiting.insert(
            ProviderId::Finnhub,
            ProviderRateLimit {
                requests_per_second: Some(1),
                requests_per_minute: Some(60),
                ..ProviderRateLimit::default()
            },
        );

        Self {
            source_priority: SourcePriority::default(),
            rate_limiting,
            default_cooldown: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            fallback: FallbackConfig::default(),
            error_handling: ErrorHandling::default(),
        }
    }
}

impl DataSourceConfig {
    /// Load and validate a JSON config file. Missing sections take defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_priority.is_empty() {
            return Err(ConfigError::Invalid(
                "source_priority must name at least one provider".to_string(),
            ));
        }

        for (provider, limits) in &self.rate_limiting {
            if limits.windows().iter().any(|(_, ceiling)| *ceiling == 0) {
                return Err(ConfigError::Invalid(format!(
                    "rate limit ceiling for {} must be greater than zero",
                    provider
                )));
            }
        }

        if self.retry.base_delay > self.retry.max_delay {
            return Err(ConfigError::Invalid(format!(
                "retry.base_delay ({:?}) exceeds retry.max_delay ({:?})",
                self.retry.base_delay, self.retry.max_delay
            )));
        }

        Ok(())
    }

    /// Cooldown applied to `provider` after it signals rate limiting.
    pub fn cooldown_for(&self, provider: ProviderId) -> Duration {
        self.rate_limiting
            .get(&provider)
            .and_then(|limits| limits.cooldown_period)
            .unwrap_or(self.default_cooldown)
    }
}
