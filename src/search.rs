//! Grid-search parameter optimization
//!
//! Exhaustive, strictly sequential enumeration of the parameter
//! product space. Each parameter set gets a fresh concurrent data
//! fetch and one backtest; failed runs are recorded and skipped, never
//! fatal. The best set is the strict arg-max by ending portfolio value,
//! so the first-enumerated set wins ties.

use indicatif::{ProgressBar, ProgressStyle};
use itertools::iproduct;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backtest::{Backtester, SizingConfig};
use crate::config::SearchConfig;
use crate::data::MarketDataSource;
use crate::fetch::{self, FetchError};
use crate::strategy::CrossoverRule;
use crate::{BacktestRun, ParameterSet, SearchOutcome};

/// Candidate values per parameter field
///
/// `combinations` walks the cartesian product with `short_windows`
/// outermost and `stakes_per_trade` innermost, so enumeration order is
/// reproducible across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamGrid {
    pub short_windows: Vec<usize>,
    pub long_windows: Vec<usize>,
    pub rsi_periods: Vec<usize>,
    pub overbought_thresholds: Vec<f64>,
    pub oversold_thresholds: Vec<f64>,
    pub risk_percents: Vec<f64>,
    pub stakes_per_trade: Vec<f64>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        ParamGrid {
            short_windows: (20..=60).step_by(5).collect(),
            long_windows: (50..=150).step_by(10).collect(),
            rsi_periods: (10..=20).step_by(2).collect(),
            overbought_thresholds: vec![60.0, 65.0, 70.0, 75.0, 80.0],
            oversold_thresholds: vec![20.0, 25.0, 30.0, 35.0, 40.0],
            risk_percents: vec![0.01, 0.015, 0.02, 0.025, 0.03],
            stakes_per_trade: vec![0.01, 0.015, 0.02, 0.025, 0.03],
        }
    }
}

impl ParamGrid {
    /// Generate every parameter combination in enumeration order
    pub fn combinations(&self) -> Vec<ParameterSet> {
        iproduct!(
            &self.short_windows,
            &self.long_windows,
            &self.rsi_periods,
            &self.overbought_thresholds,
            &self.oversold_thresholds,
            &self.risk_percents,
            &self.stakes_per_trade
        )
        .map(
            |(&short, &long, &rsi, &overbought, &oversold, &risk, &stake)| ParameterSet {
                short_window: short,
                long_window: long,
                rsi_period: rsi,
                overbought_threshold: overbought,
                oversold_threshold: oversold,
                risk_percent: risk,
                stake_per_trade: stake,
            },
        )
        .collect()
    }

    /// Total number of grid combinations
    pub fn total_combinations(&self) -> usize {
        self.short_windows.len()
            * self.long_windows.len()
            * self.rsi_periods.len()
            * self.overbought_thresholds.len()
            * self.oversold_thresholds.len()
            * self.risk_percents.len()
            * self.stakes_per_trade.len()
    }
}

/// Everything the search produced: the winner plus every run's record
#[derive(Debug)]
pub struct SearchReport {
    pub outcome: SearchOutcome,
    pub runs: Vec<BacktestRun>,
}

impl SearchReport {
    pub fn failed_runs(&self) -> usize {
        self.runs.iter().filter(|r| r.ending_value.is_none()).count()
    }
}

/// Exhaustive grid search over the parameter space
pub struct GridSearch<'a> {
    source: &'a dyn MarketDataSource,
    config: &'a SearchConfig,
}

impl<'a> GridSearch<'a> {
    pub fn new(source: &'a dyn MarketDataSource, config: &'a SearchConfig) -> Self {
        GridSearch { source, config }
    }

    /// Run the full search without progress reporting
    pub fn run(&self, grid: &ParamGrid) -> SearchReport {
        self.run_with_progress(grid, &ProgressBar::hidden())
    }

    /// Run the full search, ticking the given progress bar once per set
    pub fn run_with_progress(&self, grid: &ParamGrid, progress: &ProgressBar) -> SearchReport {
        let combinations = grid.combinations();
        info!("Testing {} parameter combinations", combinations.len());

        let mut outcome = SearchOutcome::default();
        let mut runs = Vec::with_capacity(combinations.len());

        for params in combinations {
            let ending_value = self.single_run(&params);

            if let Some(value) = ending_value {
                outcome.record(&params, value);
            }

            runs.push(BacktestRun {
                params,
                ending_value,
            });
            progress.inc(1);
        }

        info!(
            "Search finished: {} runs, {} failed",
            runs.len(),
            runs.iter().filter(|r| r.ending_value.is_none()).count()
        );

        SearchReport { outcome, runs }
    }

    /// One fetch-then-backtest cycle; None marks a failed run
    fn single_run(&self, params: &ParameterSet) -> Option<f64> {
        info!("Running backtest with parameters: {}", params);

        let symbols = self.config.symbols();
        let feeds =
            match fetch::fetch_universe(self.source, &symbols, self.config.start, self.config.end)
            {
                Ok(feeds) => feeds,
                Err(FetchError::NoData) => {
                    warn!("No data available for backtesting; run recorded as failed");
                    return None;
                }
            };

        let rule = CrossoverRule::new(params.clone());
        let sizing = SizingConfig::new(params.stake_per_trade, self.config.min_stake);
        let backtester = Backtester::new(self.config.initial_cash, sizing);

        match backtester.run(&feeds, &rule) {
            Ok(value) => {
                info!("Ending portfolio value: {:.2}", value);
                Some(value)
            }
            Err(e) => {
                warn!("Backtest failed: {}", e);
                None
            }
        }
    }
}

/// Progress bar styled like the rest of the CLI's long-running commands
pub fn search_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{percent:>3}%|{bar:40}| {pos}/{len} [{elapsed}<{eta}, {per_sec:.2}]")
            .unwrap()
            .progress_chars("█░ "),
    );
    pb
}
