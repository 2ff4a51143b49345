//! Domain models for price retrieval.

mod bar;
mod fetch_result;
mod provider_id;
mod request;

pub use bar::{normalize_bars, DailyBar};
pub use fetch_result::{DataOrigin, FetchResult, Freshness};
pub use provider_id::{ProviderId, UnknownProvider};
pub use request::FetchRequest;
