//! Market data sources
//!
//! The optimizer only needs one operation from the outside world: a
//! time-ordered daily OHLCV history for a symbol over a date range.
//! `MarketDataSource` is that seam; implementations cover the Yahoo
//! Finance chart endpoint and local CSV files for offline runs.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;
use tracing::info;

use crate::{Candle, Symbol};

// =============================================================================
// Constants
// =============================================================================

const YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const HTTP_TIMEOUT_SECS: u64 = 30;

// Yahoo rejects requests without a browser-ish agent string
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36";

// =============================================================================
// Data source seam
// =============================================================================

/// A provider of daily OHLCV history for one symbol
///
/// Implementations may fail or come back empty for any symbol; callers
/// contain both per symbol and carry on with the rest of the universe.
pub trait MarketDataSource: Send + Sync {
    fn fetch(&self, symbol: &Symbol, start: NaiveDate, end: NaiveDate) -> Result<Vec<Candle>>;
}

// =============================================================================
// Yahoo Finance chart API
// =============================================================================

/// Daily-bar fetcher backed by the Yahoo Finance v8 chart endpoint
pub struct YahooDataSource {
    client: reqwest::blocking::Client,
}

#[derive(Debug, serde::Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, serde::Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, serde::Deserialize)]
struct ChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, serde::Deserialize)]
struct ChartIndicators {
    quote: Vec<ChartQuote>,
}

#[derive(Debug, serde::Deserialize)]
struct ChartQuote {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

impl YahooDataSource {
    pub fn new() -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(StdDuration::from_secs(HTTP_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to build HTTP client");

        Self { client }
    }
}

impl Default for YahooDataSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketDataSource for YahooDataSource {
    fn fetch(&self, symbol: &Symbol, start: NaiveDate, end: NaiveDate) -> Result<Vec<Candle>> {
        let period1 = start
            .and_hms_opt(0, 0, 0)
            .context("invalid start date")?
            .and_utc()
            .timestamp();
        let period2 = end
            .and_hms_opt(0, 0, 0)
            .context("invalid end date")?
            .and_utc()
            .timestamp();

        let url = format!(
            "{}/{}?period1={}&period2={}&interval=1d&events=history",
            YAHOO_CHART_URL, symbol, period1, period2
        );

        let response = self
            .client
            .get(&url)
            .send()
            .context("Failed to send request")?;

        if !response.status().is_success() {
            anyhow::bail!("API returned status: {}", response.status());
        }

        let envelope: ChartEnvelope = response.json().context("Failed to parse response")?;

        if let Some(err) = envelope.chart.error {
            if !err.is_null() {
                anyhow::bail!("chart API error for {}: {}", symbol, err);
            }
        }

        let result = envelope
            .chart
            .result
            .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) });

        let Some(result) = result else {
            return Ok(Vec::new());
        };

        let timestamps = result.timestamp.unwrap_or_default();
        let Some(quote) = result.indicators.quote.into_iter().next() else {
            return Ok(Vec::new());
        };

        let mut candles: Vec<Candle> = Vec::with_capacity(timestamps.len());
        for (i, &ts) in timestamps.iter().enumerate() {
            // Rows with any missing field (halted days, padding) are dropped
            let row = (
                quote.open.get(i).copied().flatten(),
                quote.high.get(i).copied().flatten(),
                quote.low.get(i).copied().flatten(),
                quote.close.get(i).copied().flatten(),
                quote.volume.get(i).copied().flatten(),
            );
            if let (Some(open), Some(high), Some(low), Some(close), Some(volume)) = row {
                let Some(datetime) = DateTime::from_timestamp(ts, 0) else {
                    continue;
                };
                candles.push(Candle {
                    datetime,
                    open,
                    high,
                    low,
                    close,
                    volume,
                });
            }
        }

        candles.sort_by_key(|c| c.datetime);
        candles.dedup_by_key(|c| c.datetime);

        info!("Fetched {} candles for {}", candles.len(), symbol);

        Ok(candles)
    }
}

// =============================================================================
// CSV-backed source (offline runs)
// =============================================================================

/// Data source reading `{SYMBOL}.csv` files from a local directory
pub struct CsvDataSource {
    data_dir: PathBuf,
}

impl CsvDataSource {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }
}

impl MarketDataSource for CsvDataSource {
    fn fetch(&self, symbol: &Symbol, start: NaiveDate, end: NaiveDate) -> Result<Vec<Candle>> {
        let path = self.data_dir.join(format!("{}.csv", symbol));

        if !path.exists() {
            return Ok(Vec::new());
        }

        let mut candles = load_csv(&path).context(format!("Failed to load data for {}", symbol))?;
        candles.retain(|c| {
            let date = c.datetime.date_naive();
            date >= start && date < end
        });

        Ok(candles)
    }
}

// =============================================================================
// CSV loading and saving
// =============================================================================

/// Load OHLCV data from a CSV file (datetime,open,high,low,close,volume)
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let mut reader = csv::Reader::from_path(path.as_ref()).context("Failed to open CSV file")?;

    let mut candles = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.context(format!("Failed to read row {}", row_idx + 1))?;

        let dt_str = record.get(0).context("Missing datetime column")?;
        let datetime = dt_str
            .parse::<DateTime<Utc>>()
            .or_else(|_| {
                // Try parsing without timezone and assume UTC
                chrono::NaiveDateTime::parse_from_str(dt_str, "%Y-%m-%d %H:%M:%S")
                    .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
            })
            .or_else(|_| {
                NaiveDate::parse_from_str(dt_str, "%Y-%m-%d").map(|d| {
                    DateTime::<Utc>::from_naive_utc_and_offset(
                        d.and_time(chrono::NaiveTime::MIN),
                        Utc,
                    )
                })
            })
            .context(format!("Failed to parse datetime: {}", dt_str))?;

        let open: f64 = record
            .get(1)
            .context("Missing open column")?
            .parse()
            .context("Failed to parse open")?;
        let high: f64 = record
            .get(2)
            .context("Missing high column")?
            .parse()
            .context("Failed to parse high")?;
        let low: f64 = record
            .get(3)
            .context("Missing low column")?
            .parse()
            .context("Failed to parse low")?;
        let close: f64 = record
            .get(4)
            .context("Missing close column")?
            .parse()
            .context("Failed to parse close")?;
        let volume: f64 = record
            .get(5)
            .context("Missing volume column")?
            .parse()
            .context("Failed to parse volume")?;

        candles.push(Candle {
            datetime,
            open,
            high,
            low,
            close,
            volume,
        });
    }

    Ok(candles)
}

/// Save candles to a CSV file
pub fn save_to_csv(candles: &[Candle], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let mut file = File::create(path).context("Failed to create output file")?;

    writeln!(file, "datetime,open,high,low,close,volume")?;

    for candle in candles {
        writeln!(
            file,
            "{},{},{},{},{},{}",
            candle.datetime.format("%Y-%m-%d %H:%M:%S"),
            candle.open,
            candle.high,
            candle.low,
            candle.close,
            candle.volume
        )?;
    }

    info!("Saved {} rows to {}", candles.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_source_missing_file_is_empty() {
        let source = CsvDataSource::new("definitely/not/here");
        let candles = source
            .fetch(
                &Symbol::new("AAPL"),
                NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            )
            .unwrap();
        assert!(candles.is_empty());
    }

    #[test]
    fn test_csv_round_trip() {
        let dir = std::env::temp_dir().join("crossover-optimizer-test-data");
        let path = dir.join("AAPL.csv");

        let candles = vec![
            Candle {
                datetime: DateTime::from_timestamp(1_641_038_400, 0).unwrap(),
                open: 100.0,
                high: 105.0,
                low: 99.0,
                close: 104.0,
                volume: 1_000.0,
            },
            Candle {
                datetime: DateTime::from_timestamp(1_641_124_800, 0).unwrap(),
                open: 104.0,
                high: 106.0,
                low: 103.0,
                close: 105.0,
                volume: 1_200.0,
            },
        ];

        save_to_csv(&candles, &path).unwrap();
        let loaded = load_csv(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].close, 104.0);
        assert_eq!(loaded[1].volume, 1_200.0);
    }
}
