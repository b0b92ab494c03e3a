//! Core data types used across the optimizer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for candle data
#[derive(Debug, Error)]
pub enum CandleValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("volume ({0}) must be >= 0")]
    NegativeVolume(f64),

    #[error("open ({open}) must be between low ({low}) and high ({high})")]
    OpenOutOfRange { open: f64, low: f64, high: f64 },

    #[error("close ({close}) must be between low ({low}) and high ({high})")]
    CloseOutOfRange { close: f64, low: f64, high: f64 },

    #[error("prices must be positive: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

/// OHLCV candlestick data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub datetime: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Create a new candle with validation
    pub fn new(
        datetime: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, CandleValidationError> {
        let candle = Self {
            datetime,
            open,
            high,
            low,
            close,
            volume,
        };
        candle.validate()?;
        Ok(candle)
    }

    /// Validate the candle data
    pub fn validate(&self) -> Result<(), CandleValidationError> {
        if self.open <= 0.0 || self.high <= 0.0 || self.low <= 0.0 || self.close <= 0.0 {
            return Err(CandleValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(CandleValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if self.volume < 0.0 {
            return Err(CandleValidationError::NegativeVolume(self.volume));
        }

        if self.open < self.low || self.open > self.high {
            return Err(CandleValidationError::OpenOutOfRange {
                open: self.open,
                low: self.low,
                high: self.high,
            });
        }

        if self.close < self.low || self.close > self.high {
            return Err(CandleValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }

        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Ticker symbol using Arc<str> for cheap cloning
///
/// Symbols are cloned on every fetch task, position record, and run
/// result. Arc<str> keeps those clones at O(1) instead of re-allocating
/// the string each time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(std::sync::Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Open long position in one asset, owned by the backtester
///
/// The signal rule only observes positions; a missing entry in the
/// backtester's position map means flat.
#[derive(Debug, Clone)]
pub struct Position {
    pub symbol: Symbol,
    pub quantity: f64,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    /// Current trailing-stop price; ratchets up as the close rises
    pub trailing_stop: f64,
    /// Distance maintained between close and stop
    pub trail_amount: f64,
}

impl Position {
    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        (current_price - self.entry_price) * self.quantity
    }
}

/// One point of the strategy parameter space
///
/// Immutable once constructed; the grid search builds one per iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub short_window: usize,
    pub long_window: usize,
    pub rsi_period: usize,
    pub overbought_threshold: f64,
    pub oversold_threshold: f64,
    pub risk_percent: f64,
    pub stake_per_trade: f64,
}

impl Default for ParameterSet {
    fn default() -> Self {
        ParameterSet {
            short_window: 40,
            long_window: 100,
            rsi_period: 14,
            overbought_threshold: 70.0,
            oversold_threshold: 30.0,
            risk_percent: 0.02,
            stake_per_trade: 0.02,
        }
    }
}

impl ParameterSet {
    /// Bars that must accumulate before the rule may act
    pub fn warmup_bars(&self) -> usize {
        self.short_window.max(self.long_window).max(self.rsi_period)
    }
}

impl std::fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "short={} long={} rsi={} overbought={} oversold={} risk={} stake={}",
            self.short_window,
            self.long_window,
            self.rsi_period,
            self.overbought_threshold,
            self.oversold_threshold,
            self.risk_percent,
            self.stake_per_trade
        )
    }
}

/// Outcome of a single backtest run
///
/// `ending_value: None` marks a failed run (no data, or the oracle
/// faulted); failed runs never participate in the best-set comparison.
#[derive(Debug, Clone)]
pub struct BacktestRun {
    pub params: ParameterSet,
    pub ending_value: Option<f64>,
}

/// Best parameter set seen so far across the grid search
///
/// `best_value` starts at negative infinity and only ever increases;
/// ties keep the earlier-enumerated set.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub best_params: ParameterSet,
    pub best_value: f64,
}

impl Default for SearchOutcome {
    fn default() -> Self {
        SearchOutcome {
            best_params: ParameterSet::default(),
            best_value: f64::NEG_INFINITY,
        }
    }
}

impl SearchOutcome {
    /// Record a successful run, keeping the first-seen set on ties
    pub fn record(&mut self, params: &ParameterSet, ending_value: f64) {
        if ending_value > self.best_value {
            self.best_value = ending_value;
            self.best_params = params.clone();
        }
    }

    /// The winner, or None when every run failed
    pub fn best(&self) -> Option<(&ParameterSet, f64)> {
        if self.best_value.is_finite() {
            Some((&self.best_params, self.best_value))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candle_validation_rejects_inverted_range() {
        let candle = Candle {
            datetime: Utc::now(),
            open: 100.0,
            high: 90.0,
            low: 95.0,
            close: 92.0,
            volume: 10.0,
        };
        assert!(!candle.is_valid());
    }

    #[test]
    fn test_symbol_round_trip() {
        let symbol = Symbol::new("AAPL");
        assert_eq!(symbol.as_str(), "AAPL");
        assert_eq!(symbol.to_string(), "AAPL");
    }

    #[test]
    fn test_outcome_monotone_update() {
        let mut outcome = SearchOutcome::default();
        assert!(outcome.best().is_none());

        let a = ParameterSet::default();
        let b = ParameterSet {
            short_window: 20,
            ..ParameterSet::default()
        };

        outcome.record(&a, 105_000.0);
        outcome.record(&b, 101_000.0);
        assert_eq!(outcome.best_params, a);

        outcome.record(&b, 110_000.0);
        assert_eq!(outcome.best_params, b);
        assert_eq!(outcome.best_value, 110_000.0);
    }

    #[test]
    fn test_outcome_tie_keeps_first() {
        let mut outcome = SearchOutcome::default();
        let a = ParameterSet::default();
        let b = ParameterSet {
            long_window: 150,
            ..ParameterSet::default()
        };

        outcome.record(&a, 105_000.0);
        outcome.record(&b, 105_000.0);
        assert_eq!(outcome.best_params, a);
    }
}
