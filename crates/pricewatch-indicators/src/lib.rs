//! Technical indicators evaluated over rolling candle history.
//!
//! This crate provides the indicator targets an alert rule can track:
//! - Moving averages (SMA, EMA)
//! - Momentum (RSI)
//! - Fibonacci retracement levels
//!
//! Indicators are evaluated over the most recent window of closing prices.
//! When the history is too short to fill the window, evaluation yields NaN
//! and the caller skips the comparison instead of alerting on garbage.

pub mod algo;
pub mod momentum;
pub mod moving_average;

pub use algo::IndicatorAlgo;
pub use momentum::Rsi;
pub use moving_average::{Ema, Sma};

/// A technical indicator producing one value per evaluation point.
pub trait Indicator: Send + Sync {
    /// Calculate indicator values for the given data, one output per
    /// index at which the full lookback window is available.
    fn calculate(&self, data: &[f64]) -> Vec<f64>;

    /// Evaluate at the latest point only.
    ///
    /// Returns NaN when `data` is shorter than the lookback window.
    fn latest(&self, data: &[f64]) -> f64;

    /// Minimum number of data points required for one output.
    fn lookback(&self) -> usize;

    /// Indicator name.
    fn name(&self) -> &str;
}
