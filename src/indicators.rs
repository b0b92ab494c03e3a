//! Technical indicators
//!
//! Per-bar indicator series used by the crossover rule. All functions
//! return vectors aligned with the input, with `None` until the window
//! has warmed up.

use crate::{Candle, ParameterSet};

/// Calculate Simple Moving Average
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = Vec::with_capacity(values.len());

    for i in 0..values.len() {
        if i + 1 < period {
            result.push(None);
        } else {
            let sum: f64 = values[i + 1 - period..=i].iter().sum();
            result.push(Some(sum / period as f64));
        }
    }

    result
}

/// Calculate Exponential Moving Average
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = Vec::with_capacity(values.len());

    if values.is_empty() || period == 0 {
        return result;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema_value: Option<f64> = None;

    for (i, &value) in values.iter().enumerate() {
        if i < period - 1 {
            result.push(None);
        } else if i == period - 1 {
            // Seed with SMA
            let sum: f64 = values[0..period].iter().sum();
            ema_value = Some(sum / period as f64);
            result.push(ema_value);
        } else if let Some(prev_ema) = ema_value {
            let new_ema = (value - prev_ema) * multiplier + prev_ema;
            ema_value = Some(new_ema);
            result.push(Some(new_ema));
        }
    }

    result
}

/// Calculate True Range
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(high.len());

    for i in 0..high.len() {
        let tr_value = if i == 0 {
            high[i] - low[i]
        } else {
            let hl = high[i] - low[i];
            let hc = (high[i] - close[i - 1]).abs();
            let lc = (low[i] - close[i - 1]).abs();
            hl.max(hc).max(lc)
        };
        tr.push(tr_value);
    }

    tr
}

/// Calculate Average True Range (ATR)
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    let tr = true_range(high, low, close);
    ema(&tr, period)
}

/// Calculate RSI (Relative Strength Index)
pub fn rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut gains = Vec::with_capacity(values.len());
    let mut losses = Vec::with_capacity(values.len());

    gains.push(0.0);
    losses.push(0.0);

    for i in 1..values.len() {
        let change = values[i] - values[i - 1];
        gains.push(if change > 0.0 { change } else { 0.0 });
        losses.push(if change < 0.0 { -change } else { 0.0 });
    }

    let avg_gains = ema(&gains, period);
    let avg_losses = ema(&losses, period);

    let mut rsi_values = Vec::with_capacity(values.len());

    for i in 0..values.len() {
        if let (Some(avg_gain), Some(avg_loss)) = (avg_gains[i], avg_losses[i]) {
            if avg_loss == 0.0 {
                rsi_values.push(Some(100.0));
            } else {
                let rs = avg_gain / avg_loss;
                rsi_values.push(Some(100.0 - (100.0 / (1.0 + rs))));
            }
        } else {
            rsi_values.push(None);
        }
    }

    rsi_values
}

/// ATR window used for stop distance and sizing; not part of the grid
pub const ATR_PERIOD: usize = 14;

/// Indicator values for one asset at one bar, all warmed up
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorState {
    pub short_ma: f64,
    pub long_ma: f64,
    pub rsi: f64,
    pub atr: f64,
    pub close: f64,
}

/// Aligned indicator series for one asset's candle history
#[derive(Debug, Clone)]
pub struct IndicatorSet {
    short_ma: Vec<Option<f64>>,
    long_ma: Vec<Option<f64>>,
    rsi: Vec<Option<f64>>,
    atr: Vec<Option<f64>>,
    close: Vec<f64>,
    warmup_bars: usize,
}

impl IndicatorSet {
    /// Compute all series the rule needs from one asset's candles
    pub fn compute(candles: &[Candle], params: &ParameterSet) -> Self {
        let close: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let high: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let low: Vec<f64> = candles.iter().map(|c| c.low).collect();

        IndicatorSet {
            short_ma: sma(&close, params.short_window),
            long_ma: sma(&close, params.long_window),
            rsi: rsi(&close, params.rsi_period),
            atr: atr(&high, &low, &close, ATR_PERIOD),
            close,
            warmup_bars: params.warmup_bars(),
        }
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    /// Indicator state at the given bar index, or None while warming up
    ///
    /// The history is considered warm only once the bar count strictly
    /// exceeds max(short_window, long_window, rsi_period); at the
    /// boundary bar itself the rule must still hold off.
    pub fn state_at(&self, index: usize) -> Option<IndicatorState> {
        if index >= self.close.len() || index + 1 <= self.warmup_bars {
            return None;
        }

        Some(IndicatorState {
            short_ma: self.short_ma[index]?,
            long_ma: self.long_ma[index]?,
            rsi: self.rsi[index]?,
            atr: self.atr[index]?,
            close: self.close[index],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        let start = Utc::now() - Duration::days(closes.len() as i64);
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                datetime: start + Duration::days(i as i64),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn test_sma() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = sma(&values, 3);

        assert_eq!(result[0], None);
        assert_eq!(result[1], None);
        assert_eq!(result[2], Some(2.0));
        assert_eq!(result[3], Some(3.0));
        assert_eq!(result[4], Some(4.0));
    }

    #[test]
    fn test_ema_warmup() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = ema(&values, 3);

        assert_eq!(result[0], None);
        assert_eq!(result[1], None);
        assert!(result[2].is_some());
    }

    #[test]
    fn test_rsi_direction() {
        let up: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let rsi_up = rsi(&up, 14);
        assert!(rsi_up.last().unwrap().unwrap() > 50.0);

        let down: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        let rsi_down = rsi(&down, 14);
        assert!(rsi_down.last().unwrap().unwrap() < 50.0);
    }

    #[test]
    fn test_atr_positive_after_warmup() {
        let high = vec![12.0, 13.0, 14.0, 15.0, 16.0, 15.5, 16.5];
        let low = vec![10.0, 11.0, 12.0, 13.0, 14.0, 14.0, 15.0];
        let close = vec![11.0, 12.0, 13.0, 14.0, 15.0, 15.0, 16.0];

        let result = atr(&high, &low, &close, 5);
        assert!(result[4].is_some());
        assert!(result[4].unwrap() > 0.0);
    }

    #[test]
    fn test_state_none_at_warmup_boundary() {
        let params = ParameterSet {
            short_window: 15,
            long_window: 16,
            rsi_period: 14,
            ..ParameterSet::default()
        };
        let candles = candles_from_closes(&(1..=24).map(f64::from).collect::<Vec<_>>());
        let set = IndicatorSet::compute(&candles, &params);

        // warmup is 16 bars: index 15 is the boundary bar (count == 16), still None
        assert!(set.state_at(15).is_none());
        assert!(set.state_at(16).is_some());
    }

    #[test]
    fn test_state_gated_by_atr_window() {
        // Grid windows shorter than the fixed ATR period: the ATR series
        // is the last to warm and must still gate the state.
        let params = ParameterSet {
            short_window: 3,
            long_window: 5,
            rsi_period: 4,
            ..ParameterSet::default()
        };
        let candles = candles_from_closes(&(1..=20).map(f64::from).collect::<Vec<_>>());
        let set = IndicatorSet::compute(&candles, &params);

        assert!(set.state_at(ATR_PERIOD - 2).is_none());
        assert!(set.state_at(ATR_PERIOD - 1).is_some());
    }

    #[test]
    fn test_state_at_out_of_range() {
        let params = ParameterSet::default();
        let candles = candles_from_closes(&[1.0, 2.0, 3.0]);
        let set = IndicatorSet::compute(&candles, &params);
        assert!(set.state_at(10).is_none());
    }
}
