//! On-disk snapshot format.
//!
//! One CSV per `(symbol, start, end)` named `{SYMBOL}-YFin-data-{start}-{end}.csv`
//! with the columns `Date,Open,High,Low,Close,Adj Close,Volume`.

use std::io::{Read, Write};
use std::str::FromStr;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use log::warn;
use rust_decimal::Decimal;

use super::CacheError;
use crate::models::DailyBar;

/// Granularity tag embedded in file names. Daily bars only.
pub(crate) const GRANULARITY: &str = "YFin";

const FILE_INFIX: &str = "-YFin-data-";
const DATE_FORMAT: &str = "%Y-%m-%d";
const HEADER: [&str; 7] = ["Date", "Open", "High", "Low", "Close", "Adj Close", "Volume"];

/// File name for a cache key.
pub(crate) fn file_name(symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
    format!(
        "{}{}{}-{}.csv",
        symbol,
        FILE_INFIX,
        start.format(DATE_FORMAT),
        end.format(DATE_FORMAT)
    )
}

/// Inverse of [`file_name`]. Returns `None` for files that are not snapshots.
///
/// Symbols may themselves contain dashes (`BRK-B`), so the dates are taken
/// from the right.
pub(crate) fn parse_file_name(name: &str) -> Option<(String, NaiveDate, NaiveDate)> {
    let stem = name.strip_suffix(".csv")?;
    let idx = stem.rfind(FILE_INFIX)?;
    let symbol = &stem[..idx];
    let dates = &stem[idx + FILE_INFIX.len()..];
    if symbol.is_empty() || dates.len() != 21 || dates.as_bytes()[10] != b'-' {
        return None;
    }
    let start = NaiveDate::parse_from_str(&dates[..10], DATE_FORMAT).ok()?;
    let end = NaiveDate::parse_from_str(&dates[11..], DATE_FORMAT).ok()?;
    Some((symbol.to_string(), start, end))
}

/// Column positions resolved from the header row.
struct Columns {
    date: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    adj_close: Option<usize>,
    volume: usize,
}

impl Columns {
    fn resolve(headers: &StringRecord) -> Option<Self> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        Some(Self {
            date: find("Date")?,
            open: find("Open")?,
            high: find("High")?,
            low: find("Low")?,
            close: find("Close")?,
            // Newer exports omit it; Close stands in.
            adj_close: find("Adj Close"),
            volume: find("Volume")?,
        })
    }

    fn parse(&self, record: &StringRecord) -> Option<DailyBar> {
        let field = |idx: usize| record.get(idx).map(str::trim);
        let price = |idx: usize| field(idx).and_then(parse_decimal);

        // Timestamps like "2024-01-02 00:00:00-05:00" carry the date up front.
        let raw_date = field(self.date)?;
        let date = NaiveDate::parse_from_str(raw_date.get(..10)?, DATE_FORMAT).ok()?;
        let close = price(self.close)?;

        Some(DailyBar {
            date,
            open: price(self.open)?,
            high: price(self.high)?,
            low: price(self.low)?,
            close,
            adj_close: match self.adj_close {
                Some(idx) => price(idx)?,
                None => close,
            },
            volume: parse_volume(field(self.volume)?)?,
        })
    }
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

/// Volumes are integers but some writers emit `12345.0`.
fn parse_volume(raw: &str) -> Option<u64> {
    let integral = raw.strip_suffix(".0").unwrap_or(raw);
    integral.parse().ok()
}

/// Read every parseable row. Malformed rows are skipped with a warning.
pub(crate) fn read_bars<R: Read>(reader: R, source: &str) -> Result<Vec<DailyBar>, CacheError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let columns = Columns::resolve(&headers).ok_or_else(|| CacheError::MissingColumns {
        file: source.to_string(),
    })?;

    let mut bars = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        match columns.parse(&record) {
            Some(bar) => bars.push(bar),
            None => warn!("Skipping malformed row {} in {}", line + 2, source),
        }
    }
    Ok(bars)
}

/// Write `bars` with the standard header.
pub fn write_bars<W: Write>(writer: W, bars: &[DailyBar]) -> Result<(), CacheError> {
    let mut wtr = WriterBuilder::new().from_writer(writer);
    wtr.write_record(HEADER)?;
    for bar in bars {
        wtr.write_record([
            bar.date.format(DATE_FORMAT).to_string(),
            bar.open.to_string(),
            bar.high.to_string(),
            bar.low.to_string(),
            bar.close.to_string(),
            bar.adj_close.to_string(),
            bar.volume.to_string(),
        ])?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}
