//! Run configuration
//!
//! One immutable struct carries everything a search needs: the symbol
//! universe, the date range, broker constants, and optional candidate
//! overrides. Loaded from JSON; every field has a default mirroring the
//! stock universe and ranges the optimizer was built around.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::search::ParamGrid;
use crate::{ParameterSet, Symbol};

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// First day of history to request (inclusive)
    #[serde(default = "default_start")]
    pub start: NaiveDate,

    /// Day after the last day of history to request (exclusive)
    #[serde(default = "default_end")]
    pub end: NaiveDate,

    /// Starting broker cash, same unit as the price data
    #[serde(default = "default_initial_cash")]
    pub initial_cash: f64,

    /// Minimum entry size in units; floors every buy
    #[serde(default = "default_min_stake")]
    pub min_stake: f64,

    /// Directory of {SYMBOL}.csv files for offline runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Parameter set for single backtests; the known-good defaults apply
    /// when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<ParameterSet>,

    /// Candidate-value overrides for the grid search
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<ParamGrid>,
}

fn default_symbols() -> Vec<String> {
    [
        "AAPL", "MSFT", "GOOGL", "AMZN", "FB", "NFLX", "TSLA", "NVDA", "AMD", "INTC",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 1, 1).unwrap()
}

fn default_end() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
}

fn default_initial_cash() -> f64 {
    100_000.0
}

fn default_min_stake() -> f64 {
    10.0
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            symbols: default_symbols(),
            start: default_start(),
            end: default_end(),
            initial_cash: default_initial_cash(),
            min_stake: default_min_stake(),
            data_dir: None,
            params: None,
            grid: None,
        }
    }
}

impl SearchConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let config: SearchConfig =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        Ok(config)
    }

    pub fn symbols(&self) -> Vec<Symbol> {
        self.symbols.iter().map(Symbol::new).collect()
    }

    /// Parameter set for single backtests
    pub fn params(&self) -> ParameterSet {
        self.params.clone().unwrap_or_default()
    }

    /// Grid to search: the configured override, or the stock candidates
    pub fn grid(&self) -> ParamGrid {
        self.grid.clone().unwrap_or_default()
    }
}
