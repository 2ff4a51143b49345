//! Provider orchestration.
//!
//! This module provides the retrieval pipeline around the adapters:
//! - Per-provider rate limiting and cooldowns
//! - Retry with bounded exponential backoff
//! - Priority-ordered source selection
//! - Bar validation
//! - Cache fallback once every provider is exhausted

mod backoff;
mod engine;
mod fallback;
mod rate_limiter;
mod selector;
mod skip_reason;
mod validator;

pub use backoff::BackoffPolicy;
pub use engine::{RetrievalEngine, SourceStatus};
pub use fallback::{fallback_strategy_for, CacheFallback, FallbackData, FallbackStrategy, NoFallback};
pub use rate_limiter::{Denial, RateLimiter};
pub use selector::{Selection, SourceSelector};
pub use skip_reason::{AttemptOutcome, FetchDiagnostics, ProviderAttempt, SkipReason};
pub use validator::{BarValidator, ValidationIssue, ValidationSeverity, ValidatorConfig};
