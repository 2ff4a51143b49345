//! `pricefeed`: fetch, download and inspect cached daily prices.

mod commands;
mod config;
mod main_lib;
mod sample;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use pricefeed_market_data::FetchRequest;
use tokio_util::sync::CancellationToken;

use config::AppConfig;
use main_lib::{build_engine, init_tracing};

#[derive(Parser)]
#[command(name = "pricefeed")]
#[command(about = "Rate-limited, cache-backed daily price retrieval", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch daily bars for one symbol
    Fetch {
        symbol: String,

        /// First day, inclusive
        #[arg(long, default_value = "2020-01-01")]
        start: NaiveDate,

        /// Last day, inclusive (default: today)
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Serve cached data older than the configured maximum age if every provider fails
        #[arg(long)]
        accept_stale: bool,

        /// Print the rows as CSV instead of a summary
        #[arg(long)]
        csv: bool,
    },

    /// Fetch several symbols into the cache, pausing between them
    Download {
        /// Symbols to fetch (default: a list of popular tickers)
        symbols: Vec<String>,

        #[arg(long, default_value = "2020-01-01")]
        start: NaiveDate,

        #[arg(long)]
        end: Option<NaiveDate>,
    },

    /// Write a synthetic random-walk series into the cache
    Sample {
        #[arg(long, default_value = "TSLA")]
        symbol: String,

        #[arg(long, default_value = "2024-01-01")]
        start: NaiveDate,

        #[arg(long, default_value = "2024-06-19")]
        end: NaiveDate,

        /// Backdate the snapshot by this many days
        #[arg(long, default_value_t = 0)]
        age_days: u32,
    },

    /// Show the provider priority order and limits
    Sources,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env();
    init_tracing(config.log_format);

    let engine = build_engine(&config)?;
    let today = Utc::now().date_naive();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling");
            on_interrupt.cancel();
        }
    });

    match cli.command {
        Commands::Fetch {
            symbol,
            start,
            end,
            accept_stale,
            csv,
        } => {
            let request =
                FetchRequest::new(symbol, start, end.unwrap_or(today))?.accept_stale(accept_stale);
            commands::fetch(&engine, request, csv, &cancel).await?;
        }
        Commands::Download {
            symbols,
            start,
            end,
        } => {
            let symbols = if symbols.is_empty() {
                commands::POPULAR_SYMBOLS
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            } else {
                symbols
            };
            commands::download(&engine, &symbols, start, end.unwrap_or(today), &cancel).await?;
        }
        Commands::Sample {
            symbol,
            start,
            end,
            age_days,
        } => commands::sample(&engine, &symbol, start, end, age_days)?,
        Commands::Sources => commands::sources(&engine),
    }

    Ok(())
}
