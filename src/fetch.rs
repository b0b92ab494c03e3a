//! Concurrent per-symbol data acquisition
//!
//! One worker thread per symbol, all started before any is joined;
//! workers funnel results through an mpsc channel and the stage drains
//! it only after every worker has finished. A failed or empty fetch is
//! logged by its own worker and contributes nothing; sibling workers
//! are never interrupted. There is no per-worker timeout, so one hung
//! request stalls the whole stage.

use std::collections::HashMap;
use std::sync::mpsc;
use std::thread;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::warn;

use crate::data::MarketDataSource;
use crate::{Candle, Symbol};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no symbol yielded any data")]
    NoData,
}

/// Fetch every symbol's history concurrently
///
/// Returns the surviving (symbol, candles) pairs re-ordered to match
/// `symbols`, so downstream iteration sees assets in registration
/// order regardless of which worker finished first. Errs only when the
/// whole universe came back empty.
pub fn fetch_universe(
    source: &dyn MarketDataSource,
    symbols: &[Symbol],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<(Symbol, Vec<Candle>)>, FetchError> {
    let (tx, rx) = mpsc::channel::<(Symbol, Vec<Candle>)>();

    thread::scope(|scope| {
        for symbol in symbols {
            let tx = tx.clone();
            scope.spawn(move || match source.fetch(symbol, start, end) {
                Ok(candles) if candles.is_empty() => {
                    warn!("Failed to download data for {}: no data available", symbol);
                }
                Ok(candles) => {
                    // The receiver outlives the scope; send cannot fail here
                    let _ = tx.send((symbol.clone(), candles));
                }
                Err(e) => {
                    warn!("Failed to download data for {}: {:#}", symbol, e);
                }
            });
        }
        // scope exit joins every worker before the queue is drained
    });
    drop(tx);

    let mut fetched: HashMap<Symbol, Vec<Candle>> = rx.into_iter().collect();

    let feeds: Vec<(Symbol, Vec<Candle>)> = symbols
        .iter()
        .filter_map(|s| fetched.remove(s).map(|candles| (s.clone(), candles)))
        .collect();

    if feeds.is_empty() {
        return Err(FetchError::NoData);
    }

    Ok(feeds)
}
