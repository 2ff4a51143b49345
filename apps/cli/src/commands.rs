use std::time::Duration;

use chrono::{NaiveDate, Utc};
use pricefeed_market_data::cache::write_bars;
use pricefeed_market_data::{
    FetchRequest, FetchResult, MarketDataError, RetrievalEngine, SourceStatus,
};
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::sample;

/// Symbols fetched by `download` when none are given.
pub const POPULAR_SYMBOLS: [&str; 8] = ["AAPL", "TSLA", "GOOGL", "MSFT", "AMZN", "NVDA", "META", "SPY"];

pub async fn fetch(
    engine: &RetrievalEngine,
    request: FetchRequest,
    as_csv: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let result = engine.fetch_with_cancellation(&request, cancel).await?;

    if as_csv {
        write_bars(std::io::stdout().lock(), &result.bars)?;
    } else {
        println!("{}", summary(&result));
        if engine.config().fallback.show_data_source_info {
            println!("  {}", result.source_info());
        }
    }
    Ok(())
}

pub async fn download(
    engine: &RetrievalEngine,
    symbols: &[String],
    start: NaiveDate,
    end: NaiveDate,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let mut downloaded = 0;

    for (i, symbol) in symbols.iter().enumerate() {
        let request = match FetchRequest::new(symbol, start, end) {
            Ok(request) => request,
            Err(e) => {
                println!("{}: skipped ({})", symbol, e);
                continue;
            }
        };

        match engine.fetch_with_cancellation(&request, cancel).await {
            Ok(result) => {
                downloaded += 1;
                println!("{}", summary(&result));
            }
            Err(MarketDataError::Cancelled) => {
                tracing::warn!("Download cancelled after {} symbols", i);
                break;
            }
            Err(e) => println!("{}: failed ({})", request.symbol, e),
        }

        if i + 1 < symbols.len() {
            let pause = Duration::from_millis(rand::thread_rng().gen_range(3_000..=7_000));
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    println!("Done: {}/{} symbols downloaded", downloaded, symbols.len());
    Ok(())
}

pub fn sample(
    engine: &RetrievalEngine,
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
    age_days: u32,
) -> anyhow::Result<()> {
    let request = FetchRequest::new(symbol, start, end)?;
    let bars = sample::random_walk(&mut rand::thread_rng(), request.start, request.end);
    let written_at = Utc::now() - chrono::Duration::days(i64::from(age_days));

    let path = engine.cache().put_with_timestamp(
        &request.symbol,
        request.start,
        request.end,
        &bars,
        written_at,
    )?;

    println!("Wrote sample {} data to {}", request.symbol, path.display());
    println!("  range: {} to {}", request.start, request.end);
    println!("  rows: {}", bars.len());
    Ok(())
}

pub fn sources(engine: &RetrievalEngine) {
    println!(
        "{:<5} {:<18} {:<10} {:<22} {:<10} status",
        "rank", "provider", "adapter", "limits", "cooldown"
    );
    for status in engine.source_status() {
        println!("{}", source_line(&status));
    }
}

fn summary(result: &FetchResult) -> String {
    match (result.first_date(), result.last_date()) {
        (Some(first), Some(last)) => format!(
            "{}: {} rows, {} to {}",
            result.symbol,
            result.bars.len(),
            first,
            last
        ),
        _ => format!("{}: no rows", result.symbol),
    }
}

fn window_label(window: Duration, ceiling: u32) -> String {
    let unit = match window.as_secs() {
        1 => "s".to_string(),
        60 => "min".to_string(),
        3600 => "h".to_string(),
        secs => format!("{}s", secs),
    };
    format!("{}/{}", ceiling, unit)
}

fn source_line(status: &SourceStatus) -> String {
    let limits = if status.windows.is_empty() {
        "unlimited".to_string()
    } else {
        status
            .windows
            .iter()
            .map(|(window, ceiling)| window_label(*window, *ceiling))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let state = match status.cooldown_remaining {
        Some(remaining) => format!("cooling down ({}s left)", remaining.as_secs()),
        None => "ready".to_string(),
    };

    format!(
        "{:<5} {:<18} {:<10} {:<22} {:<10} {}",
        status.rank,
        status.provider_id.to_string(),
        if status.registered { "yes" } else { "missing" },
        limits,
        format!("{}s", status.cooldown.as_secs()),
        state
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricefeed_market_data::ProviderId;

    #[test]
    fn test_window_labels() {
        assert_eq!(window_label(Duration::from_secs(1), 1), "1/s");
        assert_eq!(window_label(Duration::from_secs(60), 60), "60/min");
        assert_eq!(window_label(Duration::from_secs(3600), 2000), "2000/h");
    }

    #[test]
    fn test_source_line() {
        let status = SourceStatus {
            provider_id: ProviderId::YahooFinance,
            rank: 2,
            registered: true,
            windows: vec![
                (Duration::from_secs(60), 60),
                (Duration::from_secs(3600), 2000),
            ],
            cooldown: Duration::from_secs(300),
            cooldown_remaining: None,
        };
        let line = source_line(&status);
        assert!(line.contains("yahoo_finance"));
        assert!(line.contains("60/min, 2000/h"));
        assert!(line.contains("300s"));
        assert!(line.ends_with("ready"));
    }
}
