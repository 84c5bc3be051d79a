//! CSV input: OHLCV bars for forecasting, free-form tables for credit data.

use crate::domain::market::PriceBar;
use crate::domain::table::RawTable;
use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::info;

const TIMESTAMP_HEADERS: [&str; 4] = ["timestamp", "date", "time", "datetime"];
const MISSING_MARKERS: [&str; 5] = ["na", "nan", "null", "none", "n/a"];

/// Unix seconds from RFC 3339, `%Y-%m-%d %H:%M:%S`, `%Y-%m-%d` or a plain integer.
pub fn parse_timestamp(raw: &str) -> Result<i64> {
    let raw = raw.trim();
    if let Ok(seconds) = raw.parse::<i64>() {
        return Ok(seconds);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.timestamp());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.and_utc().timestamp());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        && let Some(dt) = date.and_hms_opt(0, 0, 0)
    {
        return Ok(dt.and_utc().timestamp());
    }
    bail!("Unrecognised timestamp '{}'", raw)
}

fn find_header(headers: &csv::StringRecord, candidates: &[&str]) -> Result<usize> {
    headers
        .iter()
        .position(|h| candidates.iter().any(|c| h.trim().eq_ignore_ascii_case(c)))
        .ok_or_else(|| anyhow!("Missing column: expected one of {:?}", candidates))
}

/// Reads OHLCV bars and sorts them by timestamp.
pub fn load_price_bars<R: Read>(reader: R) -> Result<Vec<PriceBar>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers().context("Failed to read CSV headers")?.clone();
    let ts_idx = find_header(&headers, &TIMESTAMP_HEADERS)?;
    let open_idx = find_header(&headers, &["open"])?;
    let high_idx = find_header(&headers, &["high"])?;
    let low_idx = find_header(&headers, &["low"])?;
    let close_idx = find_header(&headers, &["close"])?;
    let volume_idx = find_header(&headers, &["volume"])?;

    let mut bars = Vec::new();
    for (line, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read CSV row {}", line + 1))?;
        let number = |idx: usize, column: &str| -> Result<f64> {
            let raw = record.get(idx).unwrap_or("").trim();
            raw.parse::<f64>()
                .with_context(|| format!("Row {}: invalid {} value '{}'", line + 1, column, raw))
        };
        bars.push(PriceBar {
            timestamp: parse_timestamp(record.get(ts_idx).unwrap_or(""))
                .with_context(|| format!("Row {}: invalid timestamp", line + 1))?,
            open: number(open_idx, "open")?,
            high: number(high_idx, "high")?,
            low: number(low_idx, "low")?,
            close: number(close_idx, "close")?,
            volume: number(volume_idx, "volume")?,
        });
    }
    bars.sort_by_key(|b| b.timestamp);
    info!("Loaded {} price bars", bars.len());
    Ok(bars)
}

fn is_missing(cell: &str) -> bool {
    let cell = cell.trim();
    cell.is_empty() || MISSING_MARKERS.iter().any(|m| cell.eq_ignore_ascii_case(m))
}

/// Reads any CSV into a [`RawTable`]. Empty cells and NA-style markers become missing.
pub fn load_raw_table<R: Read>(reader: R) -> Result<RawTable> {
    let mut rdr = csv::ReaderBuilder::new().flexible(false).from_reader(reader);
    let headers: Vec<String> = rdr
        .headers()
        .context("Failed to read CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let mut rows = Vec::new();
    for (line, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read CSV row {}", line + 1))?;
        rows.push(
            record
                .iter()
                .map(|cell| {
                    if is_missing(cell) {
                        None
                    } else {
                        Some(cell.trim().to_string())
                    }
                })
                .collect(),
        );
    }
    let table = RawTable::new(headers, rows)?;
    info!("Loaded table with {} rows and {} columns", table.len(), table.headers().len());
    Ok(table)
}

pub fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_bars_are_sorted() {
        let csv = "Date,Open,High,Low,Close,Volume\n\
                   2024-01-02,2,3,1,2.5,100\n\
                   2024-01-01,1,2,0.5,1.5,90\n";
        let bars = load_price_bars(csv.as_bytes()).unwrap();
        assert_eq!(bars.len(), 2);
        assert!(bars[0].timestamp < bars[1].timestamp);
        assert_eq!(bars[0].close, 1.5);
    }

    #[test]
    fn test_missing_price_column() {
        let csv = "timestamp,open,high,low,close\n1,1,1,1,1\n";
        assert!(load_price_bars(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_timestamp_formats() {
        assert_eq!(parse_timestamp("86400").unwrap(), 86_400);
        assert_eq!(parse_timestamp("1970-01-02").unwrap(), 86_400);
        assert_eq!(parse_timestamp("1970-01-02 00:00:00").unwrap(), 86_400);
        assert_eq!(parse_timestamp("1970-01-02T00:00:00Z").unwrap(), 86_400);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_raw_table_missing_markers() {
        let csv = "gender,age\nM,NA\n,31\nF,null\n";
        let table = load_raw_table(csv.as_bytes()).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.numeric_column("age").unwrap(), vec![None, Some(31.0), None]);
        assert_eq!(table.text_column("gender").unwrap(), vec![Some("M"), None, Some("F")]);
    }
}
