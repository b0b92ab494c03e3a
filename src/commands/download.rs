//! Download command implementation
//!
//! Saves each symbol's history as {SYMBOL}.csv so searches and
//! backtests can run offline against a data directory.

use std::path::PathBuf;

use anyhow::Result;
use tracing::{info, warn};

use crossover_optimizer::data::{save_to_csv, MarketDataSource, YahooDataSource};

pub fn run(config_path: Option<String>, output: String) -> Result<()> {
    let config = super::load_config(config_path.as_deref())?;
    let source = YahooDataSource::new();
    let out_dir = PathBuf::from(&output);

    info!(
        "Downloading {} symbols from {} to {}",
        config.symbols.len(),
        config.start,
        config.end
    );

    let mut saved = 0usize;
    for symbol in config.symbols() {
        match source.fetch(&symbol, config.start, config.end) {
            Ok(candles) if candles.is_empty() => {
                warn!("No data available for {}", symbol);
            }
            Ok(candles) => {
                let path = out_dir.join(format!("{}.csv", symbol));
                save_to_csv(&candles, &path)?;
                saved += 1;
            }
            Err(e) => {
                warn!("Failed to download data for {}: {:#}", symbol, e);
            }
        }
    }

    println!(
        "Saved {} of {} symbols to {}",
        saved,
        config.symbols.len(),
        output
    );

    Ok(())
}
