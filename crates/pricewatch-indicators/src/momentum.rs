//! Momentum indicators.

use crate::Indicator;

/// Relative Strength Index (RSI).
///
/// Single-pass variant over the last `period` price changes: average
/// gain and average loss are plain means of the window deltas, without
/// Wilder's running smoothing. Needs `period + 1` closing prices.
#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
}

impl Rsi {
    /// Create a new RSI indicator.
    ///
    /// Common periods are 14 (default) or 9.
    pub fn new(period: usize) -> Self {
        assert!(period > 0, "Period must be greater than 0");
        Self { period }
    }

    fn rsi_window(&self, window: &[f64]) -> f64 {
        let mut gain_sum = 0.0;
        let mut loss_sum = 0.0;

        for i in 1..window.len() {
            let change = window[i] - window[i - 1];
            if change > 0.0 {
                gain_sum += change;
            } else {
                loss_sum += -change;
            }
        }

        let period_f64 = self.period as f64;
        let avg_gain = gain_sum / period_f64;
        let avg_loss = loss_sum / period_f64;

        if avg_loss == 0.0 {
            return 100.0;
        }
        100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
    }
}

impl Indicator for Rsi {
    fn calculate(&self, data: &[f64]) -> Vec<f64> {
        if data.len() < self.lookback() {
            return vec![];
        }

        data.windows(self.lookback())
            .map(|window| self.rsi_window(window))
            .collect()
    }

    fn latest(&self, data: &[f64]) -> f64 {
        if data.len() < self.lookback() {
            return f64::NAN;
        }
        self.rsi_window(&data[data.len() - self.lookback()..])
    }

    fn lookback(&self) -> usize {
        // Need period+1 data points for period deltas
        self.period + 1
    }

    fn name(&self) -> &str {
        "RSI"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsi_bounded() {
        let rsi = Rsi::new(14);
        let data: Vec<f64> = (0..30)
            .map(|i| 100.0 + (i as f64 * 0.5).sin() * 5.0)
            .collect();

        let result = rsi.calculate(&data);
        assert!(!result.is_empty());

        for value in &result {
            assert!(*value >= 0.0 && *value <= 100.0);
        }
    }

    #[test]
    fn test_rsi_all_gains() {
        let rsi = Rsi::new(5);
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];

        // Monotonically rising closes have no losses
        assert!((rsi.latest(&data) - 100.0).abs() < 1e-10);
    }

    #[test]
    fn test_rsi_all_losses() {
        let rsi = Rsi::new(5);
        let data = vec![6.0, 5.0, 4.0, 3.0, 2.0, 1.0];

        assert!(rsi.latest(&data).abs() < 1e-10);
    }

    #[test]
    fn test_rsi_balanced() {
        let rsi = Rsi::new(4);
        // Gains and losses of equal magnitude
        let data = vec![10.0, 11.0, 10.0, 11.0, 10.0];

        assert!((rsi.latest(&data) - 50.0).abs() < 1e-10);
    }

    #[test]
    fn test_rsi_insufficient_data() {
        let rsi = Rsi::new(14);
        let data = vec![1.0; 14]; // need 15

        assert!(rsi.latest(&data).is_nan());
        assert!(rsi.calculate(&data).is_empty());
    }
}
