//! Skip reason tracking for provider selection diagnostics.

use crate::errors::ErrorKind;
use crate::models::ProviderId;

/// Why a provider was passed over without being called.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// One of the provider's request windows is at its ceiling.
    RateLimited,

    /// The provider is inside a cooldown after signalling rate limiting.
    CoolingDown,

    /// The priority table names the provider but no adapter is registered.
    NotRegistered,
}

/// What happened when a provider was consulted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Skipped(SkipReason),
    Failed { kind: ErrorKind, message: String },
}

/// Record of a single provider consultation during a fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderAttempt {
    pub provider_id: ProviderId,
    /// 1-indexed call number against this provider, 0 for skips.
    pub attempt: u32,
    pub outcome: AttemptOutcome,
}

/// Ordered log of everything the engine tried for one request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchDiagnostics {
    pub attempts: Vec<ProviderAttempt>,
}

impl FetchDiagnostics {
    pub fn new() -> Self {
        Self {
            attempts: Vec::new(),
        }
    }

    pub fn record_skip(&mut self, provider_id: ProviderId, reason: SkipReason) {
        // A provider re-evaluated on every selection round is noted once.
        let already = self.attempts.iter().any(|a| {
            a.provider_id == provider_id && a.outcome == AttemptOutcome::Skipped(reason.clone())
        });
        if already {
            return;
        }
        self.attempts.push(ProviderAttempt {
            provider_id,
            attempt: 0,
            outcome: AttemptOutcome::Skipped(reason),
        });
    }

    pub fn record_error(&mut self, provider_id: ProviderId, attempt: u32, kind: ErrorKind, message: String) {
        self.attempts.push(ProviderAttempt {
            provider_id,
            attempt,
            outcome: AttemptOutcome::Failed { kind, message },
        });
    }

    pub fn record_success(&mut self, provider_id: ProviderId, attempt: u32) {
        self.attempts.push(ProviderAttempt {
            provider_id,
            attempt,
            outcome: AttemptOutcome::Success,
        });
    }

    /// Summary for logging/debugging.
    pub fn summary(&self) -> String {
        if self.attempts.is_empty() {
            return "no providers consulted".to_string();
        }
        self.attempts
            .iter()
            .map(|a| match &a.outcome {
                AttemptOutcome::Success => format!("{}#{}: SUCCESS", a.provider_id, a.attempt),
                AttemptOutcome::Skipped(reason) => {
                    format!("{}: SKIPPED ({:?})", a.provider_id, reason)
                }
                AttemptOutcome::Failed { kind, .. } => {
                    format!("{}#{}: ERROR ({})", a.provider_id, a.attempt, kind)
                }
            })
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// Check if any provider succeeded.
    pub fn has_success(&self) -> bool {
        self.attempts
            .iter()
            .any(|a| a.outcome == AttemptOutcome::Success)
    }

    /// Providers that were actually called, in first-call order.
    pub fn providers_called(&self) -> Vec<ProviderId> {
        let mut out = Vec::new();
        for a in &self.attempts {
            if !matches!(a.outcome, AttemptOutcome::Skipped(_)) && !out.contains(&a.provider_id) {
                out.push(a.provider_id);
            }
        }
        out
    }

    /// Number of calls made against one provider.
    pub fn call_count(&self, provider_id: ProviderId) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.provider_id == provider_id && !matches!(a.outcome, AttemptOutcome::Skipped(_)))
            .count()
    }

    /// Last error kind per called provider, in first-call order.
    pub fn last_errors(&self) -> Vec<(ProviderId, ErrorKind)> {
        let mut out: Vec<(ProviderId, ErrorKind)> = Vec::new();
        for a in &self.attempts {
            if let AttemptOutcome::Failed { kind, .. } = &a.outcome {
                match out.iter_mut().find(|(p, _)| *p == a.provider_id) {
                    Some(entry) => entry.1 = *kind,
                    None => out.push((a.provider_id, *kind)),
                }
            }
        }
        out
    }

    /// Get all skip reasons.
    pub fn skip_reasons(&self) -> Vec<(ProviderId, &SkipReason)> {
        self.attempts
            .iter()
            .filter_map(|a| match &a.outcome {
                AttemptOutcome::Skipped(reason) => Some((a.provider_id, reason)),
                _ => None,
            })
            .collect()
    }
}
