//! Priority-ordered provider selection.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::debug;

use super::rate_limiter::{Denial, RateLimiter};
use super::skip_reason::SkipReason;
use crate::config::SourcePriority;
use crate::models::ProviderId;
use crate::provider::MarketDataProvider;

/// Outcome of one selection round.
pub struct Selection {
    /// Provider to call next. Its rate-limit slot is already reserved.
    pub chosen: Option<Arc<dyn MarketDataProvider>>,
    /// Providers passed over on the way, in priority order.
    pub skipped: Vec<(ProviderId, SkipReason)>,
}

/// Walks the priority table and picks the first provider that is registered,
/// not excluded, and admitted by the rate limiter.
pub struct SourceSelector {
    priority: SourcePriority,
    providers: HashMap<ProviderId, Arc<dyn MarketDataProvider>>,
    rate_limiter: Arc<RateLimiter>,
}

impl SourceSelector {
    /// Later adapters for the same slot replace earlier ones.
    pub fn new(
        priority: SourcePriority,
        providers: Vec<Arc<dyn MarketDataProvider>>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        let providers = providers.into_iter().map(|p| (p.id(), p)).collect();
        Self {
            priority,
            providers,
            rate_limiter,
        }
    }

    pub fn select(&self, excluded: &HashSet<ProviderId>) -> Selection {
        let mut skipped = Vec::new();

        for id in self.priority.ordered() {
            if excluded.contains(&id) {
                continue;
            }
            let Some(provider) = self.providers.get(&id) else {
                skipped.push((id, SkipReason::NotRegistered));
                continue;
            };
            match self.rate_limiter.check(id) {
                Ok(()) => {
                    debug!("Selected provider '{}'", id);
                    return Selection {
                        chosen: Some(Arc::clone(provider)),
                        skipped,
                    };
                }
                Err(Denial::CoolingDown { remaining }) => {
                    debug!("Provider '{}' cooling down for {:?}, skipping", id, remaining);
                    skipped.push((id, SkipReason::CoolingDown));
                }
                Err(Denial::WindowFull { window }) => {
                    debug!("Provider '{}' at its {:?} ceiling, skipping", id, window);
                    skipped.push((id, SkipReason::RateLimited));
                }
            }
        }

        Selection {
            chosen: None,
            skipped,
        }
    }

    /// Id of the next eligible provider, reserving its slot.
    pub fn next_provider(&self, excluded: &HashSet<ProviderId>) -> Option<ProviderId> {
        self.select(excluded).chosen.map(|p| p.id())
    }

    pub fn is_registered(&self, id: ProviderId) -> bool {
        self.providers.contains_key(&id)
    }

    pub fn priority(&self) -> &SourcePriority {
        &self.priority
    }
}
