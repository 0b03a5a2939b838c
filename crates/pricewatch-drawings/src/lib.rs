//! Chart drawing targets evaluated as time-dependent price lines.
//!
//! A drawing rule carries a geometric description serialized by the
//! charting frontend: an algorithm name plus a flat parameter map.
//! Compilation turns that map into a typed [`DrawingAlgo`] once;
//! evaluation then yields the candidate target price(s) at a given
//! timestamp. Timestamps are Unix seconds, matching the chart's
//! coordinate space.
//!
//! Supported algorithms:
//! - `price_level`: horizontal line at a fixed price
//! - `linear_ray`: trendline `p0 + slope * (t - t0)`
//! - `parallel_channel` / `multi_ray`: base ray plus vertical offsets
//! - `rect_zone`: price band active only inside a time window

use pricewatch_core::error::RuleError;
use serde_json::Value;
use std::collections::HashMap;

/// A compiled drawing target.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawingAlgo {
    PriceLevel {
        price: f64,
    },
    LinearRay {
        t0: f64,
        p0: f64,
        slope: f64,
    },
    /// Covers both `parallel_channel` and `multi_ray`; a channel is a
    /// multi-ray with offsets `[0, height]`.
    MultiRay {
        t0: f64,
        p0: f64,
        slope: f64,
        offsets: Vec<f64>,
    },
    RectZone {
        t_start: f64,
        t_end: f64,
        p_high: f64,
        p_low: f64,
    },
}

fn param_f64(params: &HashMap<String, Value>, key: &'static str) -> Result<f64, RuleError> {
    params
        .get(key)
        .and_then(Value::as_f64)
        .ok_or(RuleError::MissingParam(key))
}

fn param_f64_list(params: &HashMap<String, Value>, key: &'static str) -> Result<Vec<f64>, RuleError> {
    let list = params
        .get(key)
        .and_then(Value::as_array)
        .ok_or(RuleError::MissingParam(key))?;
    list.iter()
        .map(|v| v.as_f64().ok_or(RuleError::MissingParam(key)))
        .collect()
}

impl DrawingAlgo {
    /// Compile a drawing algorithm name and its parameter map.
    pub fn compile(algo: &str, params: &HashMap<String, Value>) -> Result<Self, RuleError> {
        match algo {
            "price_level" => Ok(DrawingAlgo::PriceLevel {
                price: param_f64(params, "price")?,
            }),
            "linear_ray" => Ok(DrawingAlgo::LinearRay {
                t0: param_f64(params, "t0")?,
                p0: param_f64(params, "p0")?,
                slope: param_f64(params, "slope")?,
            }),
            "parallel_channel" | "multi_ray" => Ok(DrawingAlgo::MultiRay {
                t0: param_f64(params, "t0")?,
                p0: param_f64(params, "p0")?,
                slope: param_f64(params, "slope")?,
                offsets: param_f64_list(params, "offsets")?,
            }),
            "rect_zone" => Ok(DrawingAlgo::RectZone {
                t_start: param_f64(params, "tStart")?,
                t_end: param_f64(params, "tEnd")?,
                p_high: param_f64(params, "pHigh")?,
                p_low: param_f64(params, "pLow")?,
            }),
            other => Err(RuleError::UnknownAlgo(other.to_string())),
        }
    }

    /// Candidate target prices at `ts_secs` (Unix seconds).
    ///
    /// An empty vector means the drawing is inactive at that time.
    pub fn evaluate(&self, ts_secs: f64) -> Vec<f64> {
        match self {
            DrawingAlgo::PriceLevel { price } => vec![*price],
            DrawingAlgo::LinearRay { t0, p0, slope } => {
                vec![p0 + slope * (ts_secs - t0)]
            }
            DrawingAlgo::MultiRay {
                t0,
                p0,
                slope,
                offsets,
            } => {
                let base = p0 + slope * (ts_secs - t0);
                offsets.iter().map(|offset| base + offset).collect()
            }
            DrawingAlgo::RectZone {
                t_start,
                t_end,
                p_high,
                p_low,
            } => {
                if ts_secs < *t_start || ts_secs > *t_end {
                    return vec![];
                }
                vec![*p_high, *p_low]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_price_level() {
        let algo =
            DrawingAlgo::compile("price_level", &params(&[("price", json!(65000.0))])).unwrap();
        assert_eq!(algo.evaluate(0.0), vec![65000.0]);
        assert_eq!(algo.evaluate(1e12), vec![65000.0]);
    }

    #[test]
    fn test_linear_ray_projects_forward() {
        let algo = DrawingAlgo::compile(
            "linear_ray",
            &params(&[
                ("t0", json!(1000.0)),
                ("p0", json!(100.0)),
                ("slope", json!(0.5)),
            ]),
        )
        .unwrap();

        // 100 + 0.5 * (1010 - 1000) = 105
        let targets = algo.evaluate(1010.0);
        assert_eq!(targets.len(), 1);
        assert!((targets[0] - 105.0).abs() < 1e-10);
    }

    #[test]
    fn test_parallel_channel_offsets() {
        let algo = DrawingAlgo::compile(
            "parallel_channel",
            &params(&[
                ("t0", json!(0.0)),
                ("p0", json!(100.0)),
                ("slope", json!(1.0)),
                ("offsets", json!([0.0, 10.0])),
            ]),
        )
        .unwrap();

        let targets = algo.evaluate(5.0);
        assert_eq!(targets.len(), 2);
        assert!((targets[0] - 105.0).abs() < 1e-10);
        assert!((targets[1] - 115.0).abs() < 1e-10);
    }

    #[test]
    fn test_rect_zone_window() {
        let algo = DrawingAlgo::compile(
            "rect_zone",
            &params(&[
                ("tStart", json!(100.0)),
                ("tEnd", json!(200.0)),
                ("pHigh", json!(110.0)),
                ("pLow", json!(90.0)),
            ]),
        )
        .unwrap();

        assert_eq!(algo.evaluate(150.0), vec![110.0, 90.0]);
        // Boundary timestamps are inside the window
        assert_eq!(algo.evaluate(100.0), vec![110.0, 90.0]);
        assert_eq!(algo.evaluate(200.0), vec![110.0, 90.0]);
        // Outside the window the zone yields no targets
        assert!(algo.evaluate(99.9).is_empty());
        assert!(algo.evaluate(200.1).is_empty());
    }

    #[test]
    fn test_missing_param() {
        let err = DrawingAlgo::compile("linear_ray", &params(&[("t0", json!(0.0))])).unwrap_err();
        assert!(matches!(err, RuleError::MissingParam(_)));
    }

    #[test]
    fn test_unknown_algo() {
        let err = DrawingAlgo::compile("spiral", &HashMap::new()).unwrap_err();
        assert!(matches!(err, RuleError::UnknownAlgo(_)));
    }

    #[test]
    fn test_integer_params_accepted() {
        // Frontend serializers emit whole numbers without a decimal point
        let algo = DrawingAlgo::compile(
            "linear_ray",
            &params(&[("t0", json!(1000)), ("p0", json!(100)), ("slope", json!(2))]),
        )
        .unwrap();
        assert_eq!(algo.evaluate(1001.0), vec![102.0]);
    }
}
