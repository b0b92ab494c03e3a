//! Backtesting engine
//!
//! Replays multi-asset daily bars through the crossover rule, simulating
//! trailing-stop exits and cash accounting, and reports the ending
//! portfolio value. Assets are evaluated per bar in the order their
//! feeds were registered.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::indicators::IndicatorSet;
use crate::strategy::{Action, CrossoverRule};
use crate::{Candle, Position, Symbol};

#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("no aligned data available for backtesting")]
    NoData,

    #[error("portfolio accounting produced a non-finite value")]
    NonFiniteEquity,
}

/// Position sizing applied by the engine, not the rule
///
/// The rule's risk-based size wins when it is usable; otherwise the
/// percent-of-equity stake applies. `min_stake` floors every entry.
#[derive(Debug, Clone, Copy)]
pub struct SizingConfig {
    pub stake_per_trade: f64,
    pub min_stake: f64,
}

impl SizingConfig {
    pub fn new(stake_per_trade: f64, min_stake: f64) -> Self {
        SizingConfig {
            stake_per_trade,
            min_stake,
        }
    }
}

/// Backtest engine
pub struct Backtester {
    initial_cash: f64,
    sizing: SizingConfig,
}

impl Backtester {
    pub fn new(initial_cash: f64, sizing: SizingConfig) -> Self {
        Backtester {
            initial_cash,
            sizing,
        }
    }

    /// Run the rule over every feed and return the ending portfolio value
    ///
    /// Feeds are aligned onto the union timestamp grid first; each bar
    /// then walks assets in feed order, enforcing trailing stops before
    /// the rule is consulted.
    pub fn run(
        &self,
        feeds: &[(Symbol, Vec<Candle>)],
        rule: &CrossoverRule,
    ) -> Result<f64, BacktestError> {
        let aligned = align_feeds(feeds);
        if aligned.is_empty() {
            return Err(BacktestError::NoData);
        }

        let indicator_sets: Vec<IndicatorSet> = aligned
            .iter()
            .map(|(_, candles)| IndicatorSet::compute(candles, rule.params()))
            .collect();

        let bar_count = aligned[0].1.len();
        let mut cash = self.initial_cash;
        let mut positions: HashMap<Symbol, Position> = HashMap::new();

        for i in 0..bar_count {
            let equity = self.mark_to_market(cash, &positions, &aligned, i);
            if !equity.is_finite() {
                return Err(BacktestError::NonFiniteEquity);
            }

            for (asset_idx, (symbol, candles)) in aligned.iter().enumerate() {
                let bar = &candles[i];
                let close = bar.close;

                // Trailing stop first: exit if hit, otherwise ratchet it up
                let stopped_out = positions
                    .get(symbol)
                    .is_some_and(|pos| close <= pos.trailing_stop);
                if stopped_out {
                    if let Some(pos) = positions.remove(symbol) {
                        cash += pos.quantity * close;
                        debug!(
                            "{} stopped out at {:.2} on {} (entry {:.2})",
                            symbol, close, bar.datetime, pos.entry_price
                        );
                    }
                    continue;
                }
                if let Some(pos) = positions.get_mut(symbol) {
                    let new_stop = close - pos.trail_amount;
                    if new_stop > pos.trailing_stop {
                        pos.trailing_stop = new_stop;
                    }
                }

                let state = indicator_sets[asset_idx].state_at(i);
                let action = rule.evaluate(state.as_ref(), positions.get(symbol), equity);

                match action {
                    Action::EnterLong { size, trail_amount }
                        if !positions.contains_key(symbol) =>
                    {
                        if let Some(quantity) = self.entry_quantity(size, equity, close) {
                            let cost = quantity * close;
                            if cash >= cost {
                                cash -= cost;
                                positions.insert(
                                    symbol.clone(),
                                    Position {
                                        symbol: symbol.clone(),
                                        quantity,
                                        entry_price: close,
                                        entry_time: bar.datetime,
                                        trailing_stop: close - trail_amount,
                                        trail_amount,
                                    },
                                );
                            }
                        }
                    }
                    Action::ExitLong => {
                        if let Some(pos) = positions.remove(symbol) {
                            cash += pos.quantity * close;
                            debug!(
                                "{} exited at {:.2} on {} (entry {:.2})",
                                symbol, close, bar.datetime, pos.entry_price
                            );
                        }
                    }
                    _ => {}
                }
            }
        }

        let ending_value = self.mark_to_market(cash, &positions, &aligned, bar_count - 1);
        if !ending_value.is_finite() {
            return Err(BacktestError::NonFiniteEquity);
        }

        Ok(ending_value)
    }

    /// Cash plus every open position valued at bar `i`'s close
    fn mark_to_market(
        &self,
        cash: f64,
        positions: &HashMap<Symbol, Position>,
        aligned: &[(Symbol, Vec<Candle>)],
        i: usize,
    ) -> f64 {
        let mut total = cash;
        for (symbol, candles) in aligned {
            if let Some(pos) = positions.get(symbol) {
                total += pos.quantity * candles[i].close;
            }
        }
        total
    }

    /// Final entry quantity after fallback sizing and the stake floor
    fn entry_quantity(&self, rule_size: f64, equity: f64, close: f64) -> Option<f64> {
        let mut quantity = if rule_size.is_finite() && rule_size > 0.0 {
            rule_size
        } else if close > 0.0 {
            equity * self.sizing.stake_per_trade / close
        } else {
            return None;
        };

        quantity = quantity.max(self.sizing.min_stake);

        if quantity.is_finite() && quantity > 0.0 {
            Some(quantity)
        } else {
            None
        }
    }
}

/// Align feeds onto the union timestamp grid
///
/// Gaps are filled with the asset's nearest candle: forward fill once
/// the asset has started, its first candle for any leading gap. Every
/// returned series has the same length and the input feed order is
/// preserved.
fn align_feeds(feeds: &[(Symbol, Vec<Candle>)]) -> Vec<(Symbol, Vec<Candle>)> {
    use std::collections::BTreeSet;

    if feeds.is_empty() {
        return Vec::new();
    }

    let mut timestamps: BTreeSet<DateTime<Utc>> = BTreeSet::new();
    for (_, candles) in feeds {
        for candle in candles {
            timestamps.insert(candle.datetime);
        }
    }

    let mut aligned = Vec::with_capacity(feeds.len());

    for (symbol, candles) in feeds {
        if candles.is_empty() {
            continue;
        }

        let mut sorted = candles.clone();
        sorted.sort_by_key(|c| c.datetime);

        let mut aligned_candles = Vec::with_capacity(timestamps.len());
        let mut iter = sorted.iter().peekable();
        let mut last: Option<&Candle> = None;

        for &ts in &timestamps {
            while let Some(&next) = iter.peek() {
                if next.datetime <= ts {
                    last = Some(next);
                    iter.next();
                } else {
                    break;
                }
            }

            let fill = last.unwrap_or(&sorted[0]);
            let mut candle = fill.clone();
            candle.datetime = ts;
            aligned_candles.push(candle);
        }

        aligned.push((symbol.clone(), aligned_candles));
    }

    aligned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParameterSet;
    use chrono::Duration;

    fn candle(datetime: DateTime<Utc>, close: f64) -> Candle {
        Candle {
            datetime,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1_000.0,
        }
    }

    fn sizing() -> SizingConfig {
        SizingConfig::new(0.02, 10.0)
    }

    #[test]
    fn test_no_feeds_is_an_error() {
        let backtester = Backtester::new(100_000.0, sizing());
        let rule = CrossoverRule::new(ParameterSet::default());
        assert!(matches!(
            backtester.run(&[], &rule),
            Err(BacktestError::NoData)
        ));
    }

    #[test]
    fn test_flat_market_preserves_cash() {
        let start = Utc::now() - Duration::days(60);
        let candles: Vec<Candle> = (0..50)
            .map(|i| candle(start + Duration::days(i), 100.0))
            .collect();
        let feeds = vec![(Symbol::new("AAPL"), candles)];

        let backtester = Backtester::new(100_000.0, sizing());
        // flat closes: no crossover ever fires
        let rule = CrossoverRule::new(ParameterSet {
            short_window: 5,
            long_window: 10,
            rsi_period: 5,
            ..ParameterSet::default()
        });

        let ending = backtester.run(&feeds, &rule).unwrap();
        assert_eq!(ending, 100_000.0);
    }

    #[test]
    fn test_align_feeds_union_grid() {
        let start = Utc::now() - Duration::days(10);
        let a: Vec<Candle> = (0..5)
            .map(|i| candle(start + Duration::days(i), 100.0 + i as f64))
            .collect();
        // second asset starts two days later and skips one day
        let b: Vec<Candle> = [2, 3, 5]
            .iter()
            .map(|&i| candle(start + Duration::days(i), 50.0 + i as f64))
            .collect();

        let aligned = align_feeds(&[(Symbol::new("A"), a), (Symbol::new("B"), b)]);

        assert_eq!(aligned.len(), 2);
        // grid is the union: days 0..=5 minus day with no data from either = 6 stamps
        assert_eq!(aligned[0].1.len(), 6);
        assert_eq!(aligned[1].1.len(), 6);

        // leading gap backfills with B's first candle, gap at day 4 forward-fills day 3
        assert_eq!(aligned[1].1[0].close, 52.0);
        assert_eq!(aligned[1].1[4].close, 53.0);
        assert_eq!(aligned[1].1[5].close, 55.0);
    }

    #[test]
    fn test_trailing_stop_exits_position() {
        use approx::assert_relative_eq;

        let start = Utc::now() - Duration::days(40);

        // bars 0..=13: 100/99 alternation; every TR is exactly 2, so the
        // ATR seeds at 2.0 and the MAs stay glued together (no entry).
        let mut closes: Vec<f64> = (0..14)
            .map(|i| if i % 2 == 0 { 100.0 } else { 99.0 })
            .collect();
        // bars 14..=18: +3/day rally; the 2-bar MA crosses the 4-bar MA
        // on bar 14 and the entry fires there (ATR = 2 + 4/15).
        closes.extend([102.0, 105.0, 108.0, 111.0, 114.0]);
        // bar 19 drops through the ratcheted stop (111.73); bars 20..=26
        // drift down so no re-entry cross occurs.
        closes.extend([109.0, 108.0, 107.0, 106.0, 105.0, 104.0, 103.0, 102.0]);

        let candles: Vec<Candle> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| candle(start + Duration::days(i as i64), c))
            .collect();
        let feeds = vec![(Symbol::new("TSLA"), candles)];

        let backtester = Backtester::new(100_000.0, sizing());
        // oversold at 100 admits any warm RSI; overbought at 150 is
        // unreachable, so the only exit path is the trailing stop
        let rule = CrossoverRule::new(ParameterSet {
            short_window: 2,
            long_window: 4,
            rsi_period: 3,
            oversold_threshold: 100.0,
            overbought_threshold: 150.0,
            ..ParameterSet::default()
        });

        let ending = backtester.run(&feeds, &rule).unwrap();

        // entry at 102 with stop distance atr*1.5 = 3.4: size = 2000/3.4,
        // cost exactly 60_000; the stop trails to 114 - atr = 111.73 and
        // fires on the 109 close. Ending = 40_000 + (2000/3.4)*109.
        assert_relative_eq!(
            ending,
            40_000.0 + (2_000.0 / 3.4) * 109.0,
            max_relative = 1e-9
        );
        // held to the 102 finish instead, the run would only break even
        assert!(ending > 103_000.0);
    }
}
