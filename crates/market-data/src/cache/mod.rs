//! Durable per-symbol price snapshots used as the fallback source.

mod csv_format;
mod store;

pub use csv_format::write_bars;
pub use store::{CacheEntry, CacheStore};

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the cache store. The retrieval engine logs these and carries on.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Cache file {file} is missing required columns")]
    MissingColumns { file: String },

    #[error("Invalid cache key: {0}")]
    InvalidKey(String),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
