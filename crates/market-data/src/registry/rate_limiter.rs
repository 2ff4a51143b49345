//! Fixed-window rate limiter for market data providers.
//!
//! Each provider owns a set of independent request windows (per second,
//! minute, hour) plus an optional cooldown deadline. A call is admitted only
//! when every window has headroom; admission increments all of them under the
//! provider's own mutex, so concurrent requests cannot jointly overshoot.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::Instant;

use crate::config::{DataSourceConfig, ProviderRateLimit};
use crate::models::ProviderId;

/// Longest cooldown a deadline can be pushed to when the configured one
/// does not fit in an `Instant`.
const MAX_COOLDOWN: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Why [`RateLimiter::try_acquire`] refused a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Denial {
    /// A window is at its ceiling.
    WindowFull { window: Duration },
    /// The provider is cooling down after a rate-limit response.
    CoolingDown { remaining: Duration },
}

/// One rolling counter.
#[derive(Debug)]
struct Window {
    length: Duration,
    ceiling: u32,
    started: Instant,
    count: u32,
}

impl Window {
    fn new(length: Duration, ceiling: u32, now: Instant) -> Self {
        Self {
            length,
            ceiling,
            started: now,
            count: 0,
        }
    }

    /// Reset the window if `now` is past its end. Never moves `started` backwards.
    fn roll(&mut self, now: Instant) {
        if now > self.started + self.length {
            self.started = now;
            self.count = 0;
        }
    }

    fn has_headroom(&self) -> bool {
        self.count < self.ceiling
    }
}

/// Counters and cooldown for a single provider.
#[derive(Debug, Default)]
struct ProviderState {
    windows: Vec<Window>,
    blocked_until: Option<Instant>,
}

impl ProviderState {
    fn new(limits: Option<&ProviderRateLimit>, now: Instant) -> Self {
        let windows = limits
            .map(|l| {
                l.windows()
                    .into_iter()
                    .map(|(length, ceiling)| Window::new(length, ceiling, now))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            windows,
            blocked_until: None,
        }
    }

    fn try_acquire(&mut self, now: Instant) -> Result<(), Denial> {
        if let Some(until) = self.blocked_until {
            if now < until {
                return Err(Denial::CoolingDown {
                    remaining: until - now,
                });
            }
            // Lazily cleared on the first check after expiry.
            self.blocked_until = None;
        }

        for window in &mut self.windows {
            window.roll(now);
        }
        if let Some(full) = self.windows.iter().find(|w| !w.has_headroom()) {
            return Err(Denial::WindowFull {
                window: full.length,
            });
        }

        for window in &mut self.windows {
            window.count += 1;
        }
        Ok(())
    }
}

/// Per-provider request limiter.
///
/// The provider map is fixed at construction, so lookups need no global lock;
/// only the per-provider state is behind a mutex. Providers without configured
/// windows are unlimited apart from cooldowns.
pub struct RateLimiter {
    providers: HashMap<ProviderId, Mutex<ProviderState>>,
}

impl RateLimiter {
    /// Create a limiter with the ceilings from `config`.
    pub fn new(config: &DataSourceConfig) -> Self {
        let now = Instant::now();
        let providers = ProviderId::ALL
            .into_iter()
            .map(|id| {
                let state = ProviderState::new(config.rate_limiting.get(&id), now);
                (id, Mutex::new(state))
            })
            .collect();
        Self { providers }
    }

    /// Lock one provider's state, recovering from poison if necessary.
    ///
    /// Recovering is safe here: the worst case is a slightly wrong counter.
    fn lock(&self, provider: ProviderId) -> Option<MutexGuard<'_, ProviderState>> {
        self.providers.get(&provider).map(|state| {
            state.lock().unwrap_or_else(|poisoned| {
                warn!("Rate limiter mutex for '{}' was poisoned, recovering", provider);
                poisoned.into_inner()
            })
        })
    }

    /// Reserve one call for `provider` if every window has headroom and no
    /// cooldown is active. Returns false without mutating counters otherwise.
    pub fn try_acquire(&self, provider: ProviderId) -> bool {
        self.check(provider).is_ok()
    }

    /// Like [`try_acquire`](Self::try_acquire) but reports why a call was refused.
    pub fn check(&self, provider: ProviderId) -> Result<(), Denial> {
        self.check_at(provider, Instant::now())
    }

    pub(crate) fn check_at(&self, provider: ProviderId, now: Instant) -> Result<(), Denial> {
        let Some(mut state) = self.lock(provider) else {
            return Ok(());
        };
        let result = state.try_acquire(now);
        match &result {
            Ok(()) => debug!("Rate limiter: acquired slot for '{}'", provider),
            Err(denial) => debug!("Rate limiter: denied '{}': {:?}", provider, denial),
        }
        result
    }

    /// Block `provider` for `cooldown` starting now.
    pub fn record_rate_limited(&self, provider: ProviderId, cooldown: Duration) {
        self.record_rate_limited_at(provider, cooldown, Instant::now());
    }

    pub(crate) fn record_rate_limited_at(&self, provider: ProviderId, cooldown: Duration, now: Instant) {
        if let Some(mut state) = self.lock(provider) {
            let until = now
                .checked_add(cooldown)
                .or_else(|| now.checked_add(MAX_COOLDOWN))
                .unwrap_or(now);
            // An earlier, longer cooldown is never shortened.
            if state.blocked_until.map_or(true, |existing| existing < until) {
                state.blocked_until = Some(until);
            }
            info!("Provider '{}' cooling down for {:?}", provider, cooldown);
        }
    }

    /// Remaining cooldown for `provider`, if any.
    pub fn cooldown_remaining(&self, provider: ProviderId) -> Option<Duration> {
        let now = Instant::now();
        self.lock(provider)?
            .blocked_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    /// Clear counters and cooldown for `provider`.
    pub fn reset(&self, provider: ProviderId) {
        if let Some(mut state) = self.lock(provider) {
            let now = Instant::now();
            state.blocked_until = None;
            for window in &mut state.windows {
                window.started = now;
                window.count = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter_with(provider: ProviderId, limits: ProviderRateLimit) -> RateLimiter {
        let mut config = DataSourceConfig::default();
        config.rate_limiting.clear();
        config.rate_limiting.insert(provider, limits);
        RateLimiter::new(&config)
    }

    #[test]
    fn test_never_exceeds_ceiling_within_window() {
        let limiter = limiter_with(
            ProviderId::Finnhub,
            ProviderRateLimit {
                requests_per_minute: Some(5),
                ..ProviderRateLimit::default()
            },
        );
        let now = Instant::now();

        let granted = (0..20)
            .filter(|i| {
                limiter
                    .check_at(ProviderId::Finnhub, now + Duration::from_secs(*i))
                    .is_ok()
            })
            .count();
        assert_eq!(granted, 5);
    }

    #[test]
    fn test_window_resets_after_expiry() {
        let limiter = limiter_with(
            ProviderId::Finnhub,
            ProviderRateLimit {
                requests_per_second: Some(1),
                ..ProviderRateLimit::default()
            },
        );
        let now = Instant::now();

        assert!(limiter.check_at(ProviderId::Finnhub, now).is_ok());
        assert_eq!(
            limiter.check_at(ProviderId::Finnhub, now + Duration::from_millis(500)),
            Err(Denial::WindowFull {
                window: Duration::from_secs(1)
            })
        );
        assert!(limiter
            .check_at(ProviderId::Finnhub, now + Duration::from_millis(1500))
            .is_ok());
    }

    #[test]
    fn test_windows_are_evaluated_conjunctively() {
        let limiter = limiter_with(
            ProviderId::Finnhub,
            ProviderRateLimit {
                requests_per_second: Some(1),
                requests_per_minute: Some(2),
                ..ProviderRateLimit::default()
            },
        );
        let now = Instant::now();

        assert!(limiter.check_at(ProviderId::Finnhub, now).is_ok());
        assert!(limiter
            .check_at(ProviderId::Finnhub, now + Duration::from_secs(2))
            .is_ok());
        // Per-second window has rolled over, per-minute has not.
        assert_eq!(
            limiter.check_at(ProviderId::Finnhub, now + Duration::from_secs(4)),
            Err(Denial::WindowFull {
                window: Duration::from_secs(60)
            })
        );
    }

    #[test]
    fn test_denied_call_does_not_consume_other_windows() {
        let limiter = limiter_with(
            ProviderId::Finnhub,
            ProviderRateLimit {
                requests_per_second: Some(1),
                requests_per_minute: Some(3),
                ..ProviderRateLimit::default()
            },
        );
        let now = Instant::now();

        assert!(limiter.check_at(ProviderId::Finnhub, now).is_ok());
        for _ in 0..10 {
            assert!(limiter.check_at(ProviderId::Finnhub, now).is_err());
        }
        assert!(limiter
            .check_at(ProviderId::Finnhub, now + Duration::from_secs(2))
            .is_ok());
        assert!(limiter
            .check_at(ProviderId::Finnhub, now + Duration::from_secs(4))
            .is_ok());
    }

    #[test]
    fn test_cooldown_blocks_then_clears() {
        let limiter = limiter_with(ProviderId::YahooFinance, ProviderRateLimit::default());
        let now = Instant::now();

        limiter.record_rate_limited_at(ProviderId::YahooFinance, Duration::from_secs(300), now);
        assert!(matches!(
            limiter.check_at(ProviderId::YahooFinance, now + Duration::from_secs(10)),
            Err(Denial::CoolingDown { .. })
        ));
        assert!(limiter
            .check_at(ProviderId::YahooFinance, now + Duration::from_secs(301))
            .is_ok());
    }

    #[test]
    fn test_per_provider_isolation() {
        let limiter = limiter_with(
            ProviderId::Finnhub,
            ProviderRateLimit {
                requests_per_minute: Some(1),
                ..ProviderRateLimit::default()
            },
        );

        assert!(limiter.try_acquire(ProviderId::Finnhub));
        assert!(!limiter.try_acquire(ProviderId::Finnhub));
        // Unconfigured providers are unlimited.
        for _ in 0..100 {
            assert!(limiter.try_acquire(ProviderId::YahooFinance));
        }
    }

    #[test]
    fn test_reset_restores_capacity() {
        let limiter = limiter_with(
            ProviderId::Finnhub,
            ProviderRateLimit {
                requests_per_hour: Some(1),
                ..ProviderRateLimit::default()
            },
        );

        assert!(limiter.try_acquire(ProviderId::Finnhub));
        assert!(!limiter.try_acquire(ProviderId::Finnhub));
        limiter.record_rate_limited(ProviderId::Finnhub, Duration::from_secs(60));
        assert!(limiter.cooldown_remaining(ProviderId::Finnhub).is_some());

        limiter.reset(ProviderId::Finnhub);
        assert!(limiter.cooldown_remaining(ProviderId::Finnhub).is_none());
        assert!(limiter.try_acquire(ProviderId::Finnhub));
    }

    #[test]
    fn test_concurrent_acquires_respect_ceiling() {
        use std::sync::Arc;

        let limiter = Arc::new(limiter_with(
            ProviderId::Finnhub,
            ProviderRateLimit {
                requests_per_hour: Some(25),
                ..ProviderRateLimit::default()
            },
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    (0..20)
                        .filter(|_| limiter.try_acquire(ProviderId::Finnhub))
                        .count()
                })
            })
            .collect();

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 25);
    }

    #[test]
    fn test_huge_cooldown_saturates_instead_of_overflowing() {
        let config = DataSourceConfig::from_json(
            r#"{"rate_limiting": {"yahoo_finance": {"cooldown_period": 1.8e19}}}"#,
        )
        .unwrap();
        let limiter = RateLimiter::new(&config);
        let now = Instant::now();

        limiter.record_rate_limited_at(
            ProviderId::YahooFinance,
            config.cooldown_for(ProviderId::YahooFinance),
            now,
        );

        assert!(matches!(
            limiter.check_at(ProviderId::YahooFinance, now + Duration::from_secs(86_400)),
            Err(Denial::CoolingDown { .. })
        ));
        assert!(limiter.cooldown_remaining(ProviderId::YahooFinance).is_some());
    }
}
