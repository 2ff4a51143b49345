//! Error types and retry classification for the market data crate.
//!
//! This module provides:
//! - [`MarketDataError`]: The main error enum for all retrieval operations
//! - [`ErrorKind`]: The flat error taxonomy used in diagnostics and config
//! - [`RetryClass`]: Classification for determining retry behavior

mod retry;

pub use retry::RetryClass;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ProviderId;
use crate::registry::FetchDiagnostics;

/// Flat error taxonomy shared by adapters, diagnostics and the retry policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConnectionError,
    Timeout,
    RateLimited,
    NotFound,
    Malformed,
    NoDataAvailable,
    InvalidRequest,
    Cancelled,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionError => "connection_error",
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::NotFound => "not_found",
            Self::Malformed => "malformed",
            Self::NoDataAvailable => "no_data_available",
            Self::InvalidRequest => "invalid_request",
            Self::Cancelled => "cancelled",
        }
    }

    /// Retry classification of this kind of failure.
    pub const fn retry_class(self) -> RetryClass {
        match self {
            Self::ConnectionError | Self::Timeout => RetryClass::WithBackoff,
            Self::RateLimited => RetryClass::Cooldown,
            Self::NotFound | Self::Malformed => RetryClass::NextProvider,
            Self::NoDataAvailable | Self::InvalidRequest | Self::Cancelled => RetryClass::Never,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during market data retrieval.
///
/// Adapters only ever produce the first five variants. The retrieval engine
/// recovers from all of them locally; the only error it hands back after
/// contacting providers is [`NoDataAvailable`](Self::NoDataAvailable).
#[derive(Error, Debug)]
pub enum MarketDataError {
    /// The provider could not be reached or answered with a server error.
    #[error("Connection error: {provider} - {message}")]
    ConnectionError {
        provider: ProviderId,
        message: String,
    },

    /// The request to the provider timed out.
    #[error("Timeout: {provider}")]
    Timeout { provider: ProviderId },

    /// The provider rate limited the request (HTTP 429 or quota notice).
    #[error("Rate limited: {provider}")]
    RateLimited { provider: ProviderId },

    /// The provider has no data for this symbol or range.
    #[error("Not found: {symbol} at {provider}")]
    NotFound { provider: ProviderId, symbol: String },

    /// The provider answered with something that could not be decoded or validated.
    #[error("Malformed response: {provider} - {message}")]
    Malformed {
        provider: ProviderId,
        message: String,
    },

    /// Every provider and the cache fallback were exhausted.
    #[error("No data available for {symbol}: {}", attempts.summary())]
    NoDataAvailable {
        symbol: String,
        /// Every provider consulted, with its last outcome.
        attempts: FetchDiagnostics,
    },

    /// The request itself is invalid; no provider was contacted.
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// The caller cancelled the request.
    #[error("Request cancelled")]
    Cancelled,
}

impl MarketDataError {
    /// Returns the flat error kind for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConnectionError { .. } => ErrorKind::ConnectionError,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Malformed { .. } => ErrorKind::Malformed,
            Self::NoDataAvailable { .. } => ErrorKind::NoDataAvailable,
            Self::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Returns the retry classification for this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use pricefeed_market_data::errors::{MarketDataError, RetryClass};
    /// use pricefeed_market_data::ProviderId;
    ///
    /// let error = MarketDataError::RateLimited { provider: ProviderId::YahooFinance };
    /// assert_eq!(error.retry_class(), RetryClass::Cooldown);
    ///
    /// let error = MarketDataError::Timeout { provider: ProviderId::Finnhub };
    /// assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        self.kind().retry_class()
    }

    /// The provider that produced this error, if any.
    pub fn provider(&self) -> Option<ProviderId> {
        match self {
            Self::ConnectionError { provider, .. }
            | Self::Timeout { provider }
            | Self::RateLimited { provider }
            | Self::NotFound { provider, .. }
            | Self::Malformed { provider, .. } => Some(*provider),
            Self::NoDataAvailable { .. } | Self::InvalidRequest { .. } | Self::Cancelled => None,
        }
    }

    /// Map a transport error from `reqwest` onto the taxonomy.
    pub fn from_transport(provider: ProviderId, error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout { provider }
        } else if error.is_decode() {
            Self::Malformed {
                provider,
                message: error.to_string(),
            }
        } else {
            Self::ConnectionError {
                provider,
                message: error.to_string(),
            }
        }
    }
}
