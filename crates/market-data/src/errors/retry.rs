/// Classification for retry policy.
///
/// Used by the retrieval engine to decide what happens after a provider call fails.
///
/// # Behavior Summary
///
/// | Class | Same provider again? | Next provider? | Side effect |
/// |-------|----------------------|----------------|-------------|
/// | `WithBackoff` | Yes, while the backoff policy allows | Afterwards | Sleep between attempts |
/// | `Cooldown` | No | Yes | Provider enters its cooldown |
/// | `NextProvider` | No | Yes | None, no retry attempt consumed |
/// | `Never` | No | No | Surfaced to the caller |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Transient failure (connection drop, timeout). Retry the same provider
    /// with exponential backoff until the retry budget is spent.
    WithBackoff,

    /// The provider signalled rate limiting. Put it into cooldown and move on
    /// without retrying it within the current request.
    Cooldown,

    /// This provider cannot serve the request (unknown symbol, garbage
    /// payload) but another one might.
    NextProvider,

    /// Terminal for the whole request.
    Never,
}
