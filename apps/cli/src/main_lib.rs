use std::sync::Arc;

use pricefeed_market_data::{
    AlphaVantageProvider, CacheStore, FinnhubProvider, LocalCacheProvider, MarketDataProvider,
    RetrievalEngine, YahooProvider,
};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{AppConfig, LogFormat};

/// Logs go to stderr; stdout carries command output.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init(),
    }
}

/// Wire the adapters whose credentials are present into an engine.
pub fn build_engine(config: &AppConfig) -> anyhow::Result<RetrievalEngine> {
    let sources = Arc::new(config.load_data_sources()?);
    let cache = Arc::new(CacheStore::new(
        config.price_cache_dir(),
        sources.fallback.max_cache_age_days,
    ));

    let mut providers: Vec<Arc<dyn MarketDataProvider>> =
        vec![Arc::new(LocalCacheProvider::new(Arc::clone(&cache)))];

    match YahooProvider::new() {
        Ok(yahoo) => providers.push(Arc::new(yahoo)),
        Err(e) => tracing::warn!("Yahoo Finance disabled: {}", e),
    }

    match &config.finnhub_api_key {
        Some(key) => providers.push(Arc::new(FinnhubProvider::new(key.clone()))),
        None => tracing::info!("FINNHUB_API_KEY not set, finnhub disabled"),
    }

    match &config.alpha_vantage_api_key {
        Some(key) => providers.push(Arc::new(AlphaVantageProvider::new(key.clone()))),
        None => tracing::info!("ALPHA_VANTAGE_API_KEY not set, alternative_apis disabled"),
    }

    tracing::debug!(
        "Price cache at {} ({} providers registered)",
        cache.dir().display(),
        providers.len()
    );

    Ok(RetrievalEngine::new(sources, providers, cache))
}
