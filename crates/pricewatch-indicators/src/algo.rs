//! Indicator selection by name.
//!
//! Alert rules reference indicators with compact names: `sma25`, `ema7`,
//! `rsi14`, or `fib_<high>_<low>_<ratio>` for a Fibonacci retracement
//! level. Parsing happens once when a rule is compiled; evaluation then
//! runs against the closing prices of the rule's candle history.

use crate::{Ema, Indicator, Rsi, Sma};
use pricewatch_core::error::RuleError;

/// A parsed indicator target.
#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorAlgo {
    Sma(usize),
    Ema(usize),
    Rsi(usize),
    /// Fixed retracement level: `high - (high - low) * ratio`.
    Fib { high: f64, low: f64, ratio: f64 },
}

impl IndicatorAlgo {
    /// Parse an indicator name as carried on an alert rule.
    pub fn parse(name: &str) -> Result<Self, RuleError> {
        let name = name.trim();

        if let Some(rest) = name.strip_prefix("fib_") {
            return Self::parse_fib(name, rest);
        }

        for (prefix, build) in [
            ("sma", IndicatorAlgo::Sma as fn(usize) -> IndicatorAlgo),
            ("ema", IndicatorAlgo::Ema),
            ("rsi", IndicatorAlgo::Rsi),
        ] {
            if let Some(digits) = name.strip_prefix(prefix) {
                let period: usize = digits
                    .parse()
                    .map_err(|_| RuleError::UnknownAlgo(name.to_string()))?;
                if period == 0 {
                    return Err(RuleError::UnknownAlgo(name.to_string()));
                }
                return Ok(build(period));
            }
        }

        Err(RuleError::UnknownAlgo(name.to_string()))
    }

    fn parse_fib(name: &str, rest: &str) -> Result<Self, RuleError> {
        let mut parts = rest.splitn(3, '_');
        let mut next = || -> Result<f64, RuleError> {
            parts
                .next()
                .and_then(|p| p.parse::<f64>().ok())
                .ok_or_else(|| RuleError::UnknownAlgo(name.to_string()))
        };

        let high = next()?;
        let low = next()?;
        let ratio = next()?;
        Ok(IndicatorAlgo::Fib { high, low, ratio })
    }

    /// Minimum closing prices needed for a non-NaN evaluation.
    pub fn lookback(&self) -> usize {
        match self {
            IndicatorAlgo::Sma(period) => Sma::new(*period).lookback(),
            IndicatorAlgo::Ema(period) => Ema::new(*period).lookback(),
            IndicatorAlgo::Rsi(period) => Rsi::new(*period).lookback(),
            IndicatorAlgo::Fib { .. } => 0,
        }
    }

    /// Evaluate at the latest point of `closes`.
    ///
    /// Returns NaN when the history is too short.
    pub fn evaluate(&self, closes: &[f64]) -> f64 {
        match self {
            IndicatorAlgo::Sma(period) => Sma::new(*period).latest(closes),
            IndicatorAlgo::Ema(period) => Ema::new(*period).latest(closes),
            IndicatorAlgo::Rsi(period) => Rsi::new(*period).latest(closes),
            IndicatorAlgo::Fib { high, low, ratio } => high - (high - low) * ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_moving_averages() {
        assert_eq!(IndicatorAlgo::parse("sma25").unwrap(), IndicatorAlgo::Sma(25));
        assert_eq!(IndicatorAlgo::parse("ema7").unwrap(), IndicatorAlgo::Ema(7));
        assert_eq!(IndicatorAlgo::parse("rsi14").unwrap(), IndicatorAlgo::Rsi(14));
    }

    #[test]
    fn test_parse_fib() {
        let algo = IndicatorAlgo::parse("fib_64000_60000_0.618").unwrap();
        assert_eq!(
            algo,
            IndicatorAlgo::Fib {
                high: 64000.0,
                low: 60000.0,
                ratio: 0.618
            }
        );
        // 64000 - 4000 * 0.618 = 61528
        assert!((algo.evaluate(&[]) - 61528.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(IndicatorAlgo::parse("sma").is_err());
        assert!(IndicatorAlgo::parse("sma0").is_err());
        assert!(IndicatorAlgo::parse("macd12").is_err());
        assert!(IndicatorAlgo::parse("fib_1_2").is_err());
        assert!(IndicatorAlgo::parse("fib_a_b_c").is_err());
    }

    #[test]
    fn test_evaluate_short_history_is_nan() {
        let algo = IndicatorAlgo::parse("sma5").unwrap();
        assert!(algo.evaluate(&[1.0, 2.0]).is_nan());
    }
}
