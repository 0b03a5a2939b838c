//! Moving average indicators.

use crate::Indicator;

/// Simple Moving Average (SMA).
///
/// Arithmetic mean of the last N closing prices.
#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
}

impl Sma {
    /// Create a new SMA with the specified period.
    pub fn new(period: usize) -> Self {
        assert!(period > 0, "Period must be greater than 0");
        Self { period }
    }
}

impl Indicator for Sma {
    fn calculate(&self, data: &[f64]) -> Vec<f64> {
        if data.len() < self.period {
            return vec![];
        }

        let mut result = Vec::with_capacity(data.len() - self.period + 1);
        let period_f64 = self.period as f64;

        // Initial sum
        let mut sum: f64 = data[..self.period].iter().sum();
        result.push(sum / period_f64);

        // Sliding window
        for i in self.period..data.len() {
            sum = sum - data[i - self.period] + data[i];
            result.push(sum / period_f64);
        }

        result
    }

    fn latest(&self, data: &[f64]) -> f64 {
        if data.len() < self.period {
            return f64::NAN;
        }
        let window = &data[data.len() - self.period..];
        window.iter().sum::<f64>() / self.period as f64
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn name(&self) -> &str {
        "SMA"
    }
}

/// Exponential Moving Average (EMA).
///
/// Evaluated over a window of exactly N values: seeded with the oldest
/// value of the window, then folded forward with multiplier 2/(N+1).
/// Recomputing from the window start keeps the value a pure function of
/// the retained history, so reconnects and backfills cannot drift it.
#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    multiplier: f64,
}

impl Ema {
    /// Create a new EMA with the specified period.
    pub fn new(period: usize) -> Self {
        assert!(period > 0, "Period must be greater than 0");
        let multiplier = 2.0 / (period as f64 + 1.0);
        Self { period, multiplier }
    }

    fn ema_window(&self, window: &[f64]) -> f64 {
        let mut ema = window[0];
        let one_minus_mult = 1.0 - self.multiplier;
        for &price in &window[1..] {
            ema = price * self.multiplier + ema * one_minus_mult;
        }
        ema
    }
}

impl Indicator for Ema {
    fn calculate(&self, data: &[f64]) -> Vec<f64> {
        if data.len() < self.period {
            return vec![];
        }

        data.windows(self.period)
            .map(|window| self.ema_window(window))
            .collect()
    }

    fn latest(&self, data: &[f64]) -> f64 {
        if data.len() < self.period {
            return f64::NAN;
        }
        self.ema_window(&data[data.len() - self.period..])
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn name(&self) -> &str {
        "EMA"
    }
}
