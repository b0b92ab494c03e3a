//! CLI command implementations

use anyhow::Result;
use crossover_optimizer::data::{CsvDataSource, MarketDataSource, YahooDataSource};
use crossover_optimizer::SearchConfig;

pub mod backtest;
pub mod download;
pub mod search;

/// Pick the data source for a run: local CSVs when requested or
/// configured, the Yahoo chart API otherwise
fn data_source(config: &SearchConfig, offline: bool) -> Result<Box<dyn MarketDataSource>> {
    if offline || config.data_dir.is_some() {
        let dir = config
            .data_dir
            .clone()
            .ok_or_else(|| anyhow::anyhow!("offline mode requires data_dir in the config"))?;
        Ok(Box::new(CsvDataSource::new(dir)))
    } else {
        Ok(Box::new(YahooDataSource::new()))
    }
}

/// Load the config file when given, defaults otherwise
fn load_config(config_path: Option<&str>) -> Result<SearchConfig> {
    match config_path {
        Some(path) => {
            let config = SearchConfig::from_file(path)?;
            tracing::info!("Loaded configuration from: {}", path);
            Ok(config)
        }
        None => Ok(SearchConfig::default()),
    }
}
