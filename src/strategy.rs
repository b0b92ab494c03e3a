//! MA/RSI crossover rule
//!
//! Pure decision function: indicator state and observed position in,
//! action out. All execution, accounting, and stop management belongs
//! to the backtester.

use crate::indicators::IndicatorState;
use crate::{ParameterSet, Position};

/// Stop-distance multiple applied to ATR when sizing an entry
pub const STOP_ATR_MULTIPLE: f64 = 1.5;

/// Action emitted by the rule for one asset on one bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    Hold,
    /// Open a long position of `size` units with a trailing stop kept
    /// `trail_amount` below the close
    EnterLong { size: f64, trail_amount: f64 },
    ExitLong,
}

/// Crossover rule bound to one parameter set
#[derive(Debug, Clone)]
pub struct CrossoverRule {
    params: ParameterSet,
}

impl CrossoverRule {
    pub fn new(params: ParameterSet) -> Self {
        CrossoverRule { params }
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    /// Evaluate one asset on one bar
    ///
    /// `state` is None until the asset's history has warmed up; the rule
    /// never acts on a cold history. Entry and exit conditions live on
    /// opposite sides of the position branch, so a single evaluation can
    /// never signal both.
    pub fn evaluate(
        &self,
        state: Option<&IndicatorState>,
        position: Option<&Position>,
        equity: f64,
    ) -> Action {
        let Some(state) = state else {
            return Action::Hold;
        };

        let flat = position.map_or(true, |p| p.quantity == 0.0);

        if flat {
            if state.short_ma > state.long_ma && state.rsi < self.params.oversold_threshold {
                return self.enter_long(state, equity);
            }
            Action::Hold
        } else if state.short_ma < state.long_ma && state.rsi > self.params.overbought_threshold {
            Action::ExitLong
        } else {
            Action::Hold
        }
    }

    /// Size the entry from risk budget and stop distance
    ///
    /// The stop sits 1.5 ATR below the close; size is risk amount over
    /// stop distance, computed in that two-step order. A zero ATR makes
    /// the stop distance zero, so the division is guarded and the rule
    /// holds instead.
    fn enter_long(&self, state: &IndicatorState, equity: f64) -> Action {
        if state.atr <= 0.0 {
            return Action::Hold;
        }

        let risk_amount = equity * self.params.risk_percent;
        let stop_loss = state.close - state.atr * STOP_ATR_MULTIPLE;
        let size = risk_amount / (state.close - stop_loss);

        if !size.is_finite() || size <= 0.0 {
            return Action::Hold;
        }

        Action::EnterLong {
            size,
            trail_amount: state.atr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Utc;
    use crate::Symbol;

    fn state(short_ma: f64, long_ma: f64, rsi: f64, atr: f64, close: f64) -> IndicatorState {
        IndicatorState {
            short_ma,
            long_ma,
            rsi,
            atr,
            close,
        }
    }

    fn open_position() -> Position {
        Position {
            symbol: Symbol::new("AAPL"),
            quantity: 10.0,
            entry_price: 100.0,
            entry_time: Utc::now(),
            trailing_stop: 95.0,
            trail_amount: 5.0,
        }
    }

    #[test]
    fn test_hold_without_warm_state() {
        let rule = CrossoverRule::new(ParameterSet::default());
        assert_eq!(rule.evaluate(None, None, 100_000.0), Action::Hold);
    }

    #[test]
    fn test_enter_long_on_bullish_cross_with_low_rsi() {
        let rule = CrossoverRule::new(ParameterSet::default());
        let s = state(105.0, 100.0, 25.0, 2.0, 110.0);

        match rule.evaluate(Some(&s), None, 100_000.0) {
            Action::EnterLong { size, trail_amount } => {
                // risk 100_000 * 0.02 = 2_000; stop distance 2.0 * 1.5 = 3.0
                assert_relative_eq!(size, 2_000.0 / 3.0, max_relative = 1e-12);
                assert_relative_eq!(trail_amount, 2.0);
            }
            other => panic!("expected EnterLong, got {:?}", other),
        }
    }

    #[test]
    fn test_no_entry_when_rsi_not_oversold() {
        let rule = CrossoverRule::new(ParameterSet::default());
        let s = state(105.0, 100.0, 55.0, 2.0, 110.0);
        assert_eq!(rule.evaluate(Some(&s), None, 100_000.0), Action::Hold);
    }

    #[test]
    fn test_zero_atr_holds_instead_of_faulting() {
        let rule = CrossoverRule::new(ParameterSet::default());
        let s = state(105.0, 100.0, 25.0, 0.0, 110.0);
        assert_eq!(rule.evaluate(Some(&s), None, 100_000.0), Action::Hold);
    }

    #[test]
    fn test_exit_on_bearish_cross_with_high_rsi() {
        let rule = CrossoverRule::new(ParameterSet::default());
        let s = state(98.0, 100.0, 75.0, 2.0, 95.0);
        let pos = open_position();
        assert_eq!(rule.evaluate(Some(&s), Some(&pos), 100_000.0), Action::ExitLong);
    }

    #[test]
    fn test_position_held_through_unconfirmed_cross() {
        let rule = CrossoverRule::new(ParameterSet::default());
        // bearish cross but RSI has not confirmed
        let s = state(98.0, 100.0, 55.0, 2.0, 95.0);
        let pos = open_position();
        assert_eq!(rule.evaluate(Some(&s), Some(&pos), 100_000.0), Action::Hold);
    }

    #[test]
    fn test_open_position_never_reenters() {
        let rule = CrossoverRule::new(ParameterSet::default());
        // entry conditions true, but a position is already open
        let s = state(105.0, 100.0, 25.0, 2.0, 110.0);
        let pos = open_position();
        assert_eq!(rule.evaluate(Some(&s), Some(&pos), 100_000.0), Action::Hold);
    }
}
