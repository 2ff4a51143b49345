//! Retrieval engine for orchestrating market data providers.
//!
//! One call to [`RetrievalEngine::fetch`] drives a small state machine:
//!
//! ```text
//! SELECTING -> FETCHING -> SUCCESS | RETRY_WAIT | ADVANCE | FALLBACK -> DONE
//! ```
//!
//! - SELECTING asks the [`SourceSelector`] for the next eligible provider.
//! - FETCHING makes one adapter call and classifies the outcome.
//! - RETRY_WAIT sleeps per the [`BackoffPolicy`] and calls the same provider again.
//! - ADVANCE excludes the provider for the rest of the request.
//! - FALLBACK consults the configured [`FallbackStrategy`].
//!
//! After providers were contacted the engine returns `NoDataAvailable`,
//! `Cancelled` when the caller gives up, or an adapter error whose
//! [`RetryClass`] is `Never`, which ends the request as is.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, log, Level};
use tokio_util::sync::CancellationToken;

use super::backoff::BackoffPolicy;
use super::fallback::{fallback_strategy_for, FallbackStrategy};
use super::rate_limiter::{Denial, RateLimiter};
use super::selector::SourceSelector;
use super::skip_reason::{FetchDiagnostics, SkipReason};
use super::validator::BarValidator;
use crate::cache::CacheStore;
use crate::config::DataSourceConfig;
use crate::errors::{MarketDataError, RetryClass};
use crate::models::{DailyBar, DataOrigin, FetchRequest, FetchResult, Freshness, ProviderId};
use crate::provider::MarketDataProvider;

/// Engine states. DONE is the function return.
enum State {
    Selecting,
    Fetching {
        provider: Arc<dyn MarketDataProvider>,
        attempt: u32,
    },
    RetryWait {
        provider: Arc<dyn MarketDataProvider>,
        attempt: u32,
    },
    Advance(ProviderId),
    Fallback,
    Success {
        provider: Arc<dyn MarketDataProvider>,
        bars: Vec<DailyBar>,
    },
}

/// Static and live view of one provider, for display.
#[derive(Clone, Debug)]
pub struct SourceStatus {
    pub provider_id: ProviderId,
    pub rank: u32,
    pub registered: bool,
    pub windows: Vec<(Duration, u32)>,
    pub cooldown: Duration,
    pub cooldown_remaining: Option<Duration>,
}

/// Top-level entry point: turns a [`FetchRequest`] into exactly one result.
pub struct RetrievalEngine {
    config: Arc<DataSourceConfig>,
    selector: SourceSelector,
    rate_limiter: Arc<RateLimiter>,
    backoff: BackoffPolicy,
    cache: Arc<CacheStore>,
    fallback: Box<dyn FallbackStrategy>,
    validator: BarValidator,
}

impl RetrievalEngine {
    /// Build an engine over the given adapters.
    ///
    /// Providers named in the priority table without an adapter are skipped at
    /// selection time.
    pub fn new(
        config: Arc<DataSourceConfig>,
        providers: Vec<Arc<dyn MarketDataProvider>>,
        cache: Arc<CacheStore>,
    ) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(&config));
        let selector = SourceSelector::new(
            config.source_priority.clone(),
            providers,
            Arc::clone(&rate_limiter),
        );
        Self {
            backoff: BackoffPolicy::new(config.retry.clone(), config.error_handling.clone()),
            fallback: fallback_strategy_for(&config.fallback),
            validator: BarValidator::new(),
            config,
            selector,
            rate_limiter,
            cache,
        }
    }

    /// Replace the fallback strategy chosen from config.
    pub fn with_fallback(mut self, fallback: Box<dyn FallbackStrategy>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_validator(mut self, validator: BarValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn config(&self) -> &DataSourceConfig {
        &self.config
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Fetch daily bars for `request`.
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, MarketDataError> {
        self.fetch_with_cancellation(request, &CancellationToken::new())
            .await
    }

    /// Fetch daily bars, giving up with `Cancelled` once `cancel` fires.
    pub async fn fetch_with_cancellation(
        &self,
        request: &FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<FetchResult, MarketDataError> {
        let mut diagnostics = FetchDiagnostics::new();
        let mut excluded: HashSet<ProviderId> = HashSet::new();
        let mut state = State::Selecting;

        debug!(
            "Fetching {} [{}..{}] (accept_stale={})",
            request.symbol, request.start, request.end, request.accept_stale
        );

        loop {
            state = match state {
                State::Selecting => {
                    if cancel.is_cancelled() {
                        return Err(self.cancelled(request));
                    }
                    let selection = self.selector.select(&excluded);
                    for (id, reason) in selection.skipped {
                        diagnostics.record_skip(id, reason);
                    }
                    match selection.chosen {
                        Some(provider) => State::Fetching {
                            provider,
                            attempt: 1,
                        },
                        None => State::Fallback,
                    }
                }

                State::Fetching { provider, attempt } => {
                    let id = provider.id();
                    debug!("Calling '{}' for {} (attempt {})", id, request.symbol, attempt);

                    let Some(outcome) = self.call_adapter(provider.as_ref(), request, cancel).await
                    else {
                        return Err(self.cancelled(request));
                    };
                    let outcome = outcome.and_then(|bars| {
                        self.validator
                            .validate_batch(id, &request.symbol, bars, request.start, request.end)
                    });

                    match outcome {
                        Ok(bars) => {
                            diagnostics.record_success(id, attempt);
                            State::Success { provider, bars }
                        }
                        Err(error) => {
                            let kind = error.kind();
                            self.log_error(format_args!(
                                "Provider '{}' failed for {} (attempt {}): {}",
                                id, request.symbol, attempt, error
                            ));
                            diagnostics.record_error(id, attempt, kind, error.to_string());

                            match error.retry_class() {
                                RetryClass::Cooldown => {
                                    self.rate_limiter
                                        .record_rate_limited(id, self.config.cooldown_for(id));
                                    State::Advance(id)
                                }
                                RetryClass::WithBackoff
                                    if self.backoff.should_retry(attempt, kind) =>
                                {
                                    State::RetryWait { provider, attempt }
                                }
                                RetryClass::Never => {
                                    debug!("'{}' reported a terminal error, stopping", id);
                                    return Err(error);
                                }
                                _ => State::Advance(id),
                            }
                        }
                    }
                }

                State::RetryWait { provider, attempt } => {
                    let id = provider.id();
                    let delay = self.backoff.next_delay(attempt);
                    debug!("Retrying '{}' in {:?}", id, delay);

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(self.cancelled(request)),
                        _ = tokio::time::sleep(delay) => {}
                    }

                    // The slot for the retry is taken only now, after the wait,
                    // and never once the caller has given up.
                    if cancel.is_cancelled() {
                        return Err(self.cancelled(request));
                    }
                    match self.rate_limiter.check(id) {
                        Ok(()) => State::Fetching {
                            provider,
                            attempt: attempt + 1,
                        },
                        Err(denial) => {
                            let reason = match denial {
                                Denial::CoolingDown { .. } => SkipReason::CoolingDown,
                                Denial::WindowFull { .. } => SkipReason::RateLimited,
                            };
                            debug!("Retry of '{}' denied by rate limiter: {:?}", id, denial);
                            diagnostics.record_skip(id, reason);
                            State::Advance(id)
                        }
                    }
                }

                State::Advance(id) => {
                    excluded.insert(id);
                    State::Selecting
                }

                State::Success { provider, bars } => {
                    let id = provider.id();
                    if provider.cache_results() {
                        self.store(request, &bars);
                    }
                    let result = FetchResult {
                        symbol: request.symbol.clone(),
                        bars,
                        source: DataOrigin::Provider(id),
                        freshness: Freshness::Fresh,
                        diagnostics,
                    };
                    self.announce(&result);
                    return Ok(result);
                }

                State::Fallback => {
                    if cancel.is_cancelled() {
                        return Err(self.cancelled(request));
                    }
                    return match self.fallback.recover(request, &self.cache, Utc::now()) {
                        Some(data) => {
                            self.log_error(format_args!(
                                "All providers exhausted for {}; serving {} fallback ({} rows)",
                                request.symbol,
                                self.fallback.name(),
                                data.bars.len()
                            ));
                            let result = FetchResult {
                                symbol: request.symbol.clone(),
                                bars: data.bars,
                                source: DataOrigin::Cache,
                                freshness: data.freshness,
                                diagnostics,
                            };
                            self.announce(&result);
                            Ok(result)
                        }
                        None => {
                            self.log_error(format_args!(
                                "No data available for {}: {}",
                                request.symbol,
                                diagnostics.summary()
                            ));
                            Err(MarketDataError::NoDataAvailable {
                                symbol: request.symbol.clone(),
                                attempts: diagnostics,
                            })
                        }
                    };
                }
            };
        }
    }

    /// Per-provider view of priority, limits and live cooldowns.
    pub fn source_status(&self) -> Vec<SourceStatus> {
        let priority = self.selector.priority();
        priority
            .ordered()
            .map(|id| SourceStatus {
                provider_id: id,
                rank: priority.rank_of(id).unwrap_or_default(),
                registered: self.selector.is_registered(id),
                windows: self
                    .config
                    .rate_limiting
                    .get(&id)
                    .map(|limits| limits.windows())
                    .unwrap_or_default(),
                cooldown: self.config.cooldown_for(id),
                cooldown_remaining: self.rate_limiter.cooldown_remaining(id),
            })
            .collect()
    }

    /// Best-effort write-back. Failures are logged and never fail the fetch.
    fn store(&self, request: &FetchRequest, bars: &[DailyBar]) {
        if let Err(e) = self
            .cache
            .put(&request.symbol, request.start, request.end, bars)
        {
            self.log_error(format_args!(
                "Failed to cache {} [{}..{}]: {}",
                request.symbol, request.start, request.end, e
            ));
        }
    }

    /// One adapter call, or `None` if `cancel` fires first.
    ///
    /// The adapter future is polled before the cancel branch, so a slot
    /// reserved by the limiter always goes to a call that was started.
    async fn call_adapter(
        &self,
        provider: &dyn MarketDataProvider,
        request: &FetchRequest,
        cancel: &CancellationToken,
    ) -> Option<Result<Vec<DailyBar>, MarketDataError>> {
        tokio::select! {
            biased;
            result = provider.fetch_daily_bars(&request.symbol, request.start, request.end) => Some(result),
            _ = cancel.cancelled() => None,
        }
    }

    fn announce(&self, result: &FetchResult) {
        if self.config.fallback.show_data_source_info {
            info!(
                "{}: {} rows, {}",
                result.symbol,
                result.bars.len(),
                result.source_info()
            );
        }
    }

    fn cancelled(&self, request: &FetchRequest) -> MarketDataError {
        debug!("Fetch for {} cancelled", request.symbol);
        MarketDataError::Cancelled
    }

    fn log_error(&self, message: std::fmt::Arguments<'_>) {
        let level = if self.config.error_handling.log_errors {
            Level::Warn
        } else {
            Level::Debug
        };
        log!(level, "{}", message);
    }
}
