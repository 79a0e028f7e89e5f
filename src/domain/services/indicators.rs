//! Technical indicators over price history.
//!
//! All functions operate on close-price series extracted from
//! [`PriceSample`] history and tolerate short input by returning empty
//! vectors or `None` rather than erroring.

use crate::domain::entities::price_sample::PriceSample;

/// Extract the close series from a sample history.
pub fn closes(samples: &[PriceSample]) -> Vec<f64> {
    samples.iter().map(|s| s.close.value()).collect()
}

pub struct Ema {
    pub period: usize,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Ema { period }
    }

    /// EMA series seeded with the SMA of the first `period` values.
    pub fn calculate(&self, values: &[f64]) -> Vec<f64> {
        if values.is_empty() || self.period == 0 {
            return vec![];
        }
        let mut ema_values = Vec::with_capacity(values.len());
        let multiplier = 2.0 / (self.period as f64 + 1.0);

        let initial_count = self.period.min(values.len());
        let sum: f64 = values[..initial_count].iter().sum();
        let mut ema = sum / initial_count as f64;
        ema_values.push(ema);

        for &val in values.iter().skip(self.period) {
            ema = (val - ema) * multiplier + ema;
            ema_values.push(ema);
        }

        ema_values
    }
}

pub struct Rsi {
    pub period: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Rsi { period }
    }

    pub fn calculate(&self, values: &[f64]) -> Vec<f64> {
        if self.period == 0 || values.len() < self.period + 1 {
            return vec![];
        }
        let mut gains = Vec::new();
        let mut losses = Vec::new();

        for i in 1..values.len() {
            let change = values[i] - values[i - 1];
            if change > 0.0 {
                gains.push(change);
                losses.push(0.0);
            } else {
                gains.push(0.0);
                losses.push(change.abs());
            }
        }

        let mut rsi_values = Vec::new();
        for i in self.period..=gains.len() {
            let start = i - self.period;
            let end = i - 1;
            let avg_gain = gains[start..=end].iter().sum::<f64>() / self.period as f64;
            let avg_loss = losses[start..=end].iter().sum::<f64>() / self.period as f64;
            let rs = if avg_loss == 0.0 {
                100.0
            } else {
                avg_gain / avg_loss
            };
            rsi_values.push(100.0 - (100.0 / (1.0 + rs)));
        }

        rsi_values
    }
}

/// Fractional price change over the last `lookback` bars.
pub fn momentum(values: &[f64], lookback: usize) -> Option<f64> {
    if lookback == 0 || values.len() <= lookback {
        return None;
    }
    let latest = *values.last()?;
    let base = values[values.len() - 1 - lookback];
    if base <= f64::EPSILON {
        return None;
    }
    Some((latest - base) / base)
}

/// Realized volatility: standard deviation of log returns over the last
/// `window` returns. Input shorter than `window + 1` yields `None`.
pub fn realized_volatility(values: &[f64], window: usize) -> Option<f64> {
    if window < 2 || values.len() < window + 1 {
        return None;
    }
    let tail = &values[values.len() - window - 1..];
    let mut returns = Vec::with_capacity(window);
    for pair in tail.windows(2) {
        if pair[0] <= f64::EPSILON || pair[1] <= f64::EPSILON {
            return None;
        }
        returns.push((pair[1] / pair[0]).ln());
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
    Some(variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn samples(closes: &[f64]) -> Vec<PriceSample> {
        closes
            .iter()
            .map(|&c| {
                PriceSample::new(
                    "TEST-USD".to_string(),
                    Utc::now(),
                    c,
                    c * 1.01,
                    c * 0.99,
                    c,
                    1000.0,
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_closes_extraction() {
        let history = samples(&[100.0, 102.0, 101.0]);
        assert_eq!(closes(&history), vec![100.0, 102.0, 101.0]);
    }

    #[test]
    fn test_ema_calculation() {
        let values = vec![102.0, 105.0, 108.0];
        let ema = Ema::new(2);
        let result = ema.calculate(&values);
        assert!(!result.is_empty());
        assert!(result[0] > 100.0);
    }

    #[test]
    fn test_ema_empty_input() {
        assert!(Ema::new(5).calculate(&[]).is_empty());
    }

    #[test]
    fn test_rsi_bounds() {
        let values = vec![102.0, 105.0, 108.0, 106.0, 109.0];
        let rsi = Rsi::new(2);
        let result = rsi.calculate(&values);
        assert!(!result.is_empty());
        assert!(result.iter().all(|v| (0.0..=100.0).contains(v)));
    }

    #[test]
    fn test_rsi_all_gains_is_100() {
        let values = vec![100.0, 101.0, 102.0, 103.0, 104.0];
        let result = Rsi::new(3).calculate(&values);
        assert_eq!(*result.last().unwrap(), 100.0);
    }

    #[test]
    fn test_rsi_short_input() {
        assert!(Rsi::new(14).calculate(&[100.0, 101.0]).is_empty());
    }

    #[test]
    fn test_momentum_positive() {
        let values = vec![100.0, 102.0, 104.0, 110.0];
        let m = momentum(&values, 3).unwrap();
        assert!((m - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_momentum_insufficient_data() {
        assert!(momentum(&[100.0, 101.0], 5).is_none());
    }

    #[test]
    fn test_realized_volatility_flat_series_is_zero() {
        let values = vec![100.0; 20];
        let vol = realized_volatility(&values, 10).unwrap();
        assert!(vol.abs() < 1e-12);
    }

    #[test]
    fn test_realized_volatility_increases_with_swings() {
        let calm: Vec<f64> = (0..20).map(|i| 100.0 + (i % 2) as f64 * 0.1).collect();
        let wild: Vec<f64> = (0..20).map(|i| 100.0 + (i % 2) as f64 * 20.0).collect();
        let calm_vol = realized_volatility(&calm, 10).unwrap();
        let wild_vol = realized_volatility(&wild, 10).unwrap();
        assert!(wild_vol > calm_vol);
    }

    #[test]
    fn test_realized_volatility_short_input() {
        assert!(realized_volatility(&[100.0, 101.0], 10).is_none());
    }
}
