//! Rule compilation.
//!
//! Raw [`AlertRule`] records are configuration: indicator names are
//! strings and drawing parameters live in a generic JSON map. Compiling
//! happens once per sync and produces the representation the per-tick
//! path consumes, so evaluation never parses a string or probes a map.

use pricewatch_core::error::RuleError;
use pricewatch_core::types::{AlertRule, Condition, Subscription, TargetType};
use pricewatch_drawings::DrawingAlgo;
use pricewatch_indicators::IndicatorAlgo;
use std::collections::HashMap;
use tracing::warn;

/// Precomputed target of a compiled rule.
#[derive(Debug, Clone)]
pub enum CompiledTarget {
    Price(f64),
    Indicator(IndicatorAlgo),
    Drawing(DrawingAlgo),
}

/// An alert rule with its derived fields resolved at sync time.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: AlertRule,
    pub key: Subscription,
    pub target: CompiledTarget,
    /// Never empty: an unset condition list defaults to crossing_up.
    pub conditions: Vec<Condition>,
    /// Whether this rule evaluates on candle events or plain tickers.
    pub kline_path: bool,
}

impl CompiledRule {
    /// Compile one raw rule. Fails on unparseable targets; inactive
    /// rules are filtered by [`compile_set`], not here.
    pub fn compile(rule: AlertRule) -> Result<Self, RuleError> {
        let target = match rule.target_type {
            TargetType::Price => CompiledTarget::Price(rule.target),
            TargetType::Indicator => {
                let name = rule
                    .target_value
                    .as_deref()
                    .ok_or_else(|| RuleError::BadTarget(rule.id.clone()))?;
                CompiledTarget::Indicator(IndicatorAlgo::parse(name)?)
            }
            TargetType::Drawing => {
                let algo = rule
                    .algo
                    .as_deref()
                    .ok_or_else(|| RuleError::BadTarget(rule.id.clone()))?;
                let empty = HashMap::new();
                let params = rule.params.as_ref().unwrap_or(&empty);
                CompiledTarget::Drawing(DrawingAlgo::compile(algo, params)?)
            }
        };

        let conditions = if rule.conditions.is_empty() {
            vec![Condition::CrossingUp]
        } else {
            rule.conditions.clone()
        };

        let key = Subscription::new(rule.symbol.clone(), rule.interval);
        let kline_path = rule.needs_klines();

        Ok(Self {
            rule,
            key,
            target,
            conditions,
            kline_path,
        })
    }

    /// A rect zone tests its max candidate as the up boundary and its
    /// min as the down boundary instead of each candidate independently.
    pub fn is_rect_zone(&self) -> bool {
        matches!(self.target, CompiledTarget::Drawing(DrawingAlgo::RectZone { .. }))
    }
}

/// Compile a synced rule set. Inactive rules are dropped; rules that
/// fail to compile are skipped with a warning so one bad record never
/// aborts the sync.
pub fn compile_set(rules: Vec<AlertRule>) -> Vec<CompiledRule> {
    let mut compiled = Vec::with_capacity(rules.len());
    for rule in rules {
        if !rule.active {
            continue;
        }
        let id = rule.id.clone();
        match CompiledRule::compile(rule) {
            Ok(c) => compiled.push(c),
            Err(e) => warn!(rule_id = %id, error = %e, "Skipping uncompilable alert rule"),
        }
    }
    compiled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn price_rule(id: &str) -> AlertRule {
        AlertRule::parse_list(&format!(
            r#"[{{"id": "{id}", "symbol": "BTCUSDT", "target": 100.0}}]"#
        ))
        .unwrap()
        .remove(0)
    }

    #[test]
    fn test_compile_price_rule() {
        let compiled = CompiledRule::compile(price_rule("a1")).unwrap();
        assert!(matches!(compiled.target, CompiledTarget::Price(t) if t == 100.0));
        assert_eq!(compiled.conditions, vec![Condition::CrossingUp]);
        assert!(!compiled.kline_path);
    }

    #[test]
    fn test_compile_indicator_rule() {
        let json = r#"[{"id": "a2", "symbol": "BTCUSDT", "targetType": "indicator", "targetValue": "ema7"}]"#;
        let rule = AlertRule::parse_list(json).unwrap().remove(0);
        let compiled = CompiledRule::compile(rule).unwrap();
        assert!(matches!(
            compiled.target,
            CompiledTarget::Indicator(IndicatorAlgo::Ema(7))
        ));
        assert!(compiled.kline_path);
    }

    #[test]
    fn test_compile_drawing_rule() {
        let json = r#"[{
            "id": "a3", "symbol": "BTCUSDT", "targetType": "drawing",
            "algo": "rect_zone",
            "params": {"tStart": 0, "tEnd": 100, "pHigh": 110, "pLow": 90}
        }]"#;
        let rule = AlertRule::parse_list(json).unwrap().remove(0);
        let compiled = CompiledRule::compile(rule).unwrap();
        assert!(compiled.is_rect_zone());
    }

    #[test]
    fn test_compile_set_skips_bad_rules() {
        let json = r#"[
            {"id": "ok", "symbol": "BTCUSDT", "target": 1.0},
            {"id": "bad", "symbol": "BTCUSDT", "targetType": "indicator", "targetValue": "macd12"},
            {"id": "off", "symbol": "BTCUSDT", "target": 2.0, "active": false}
        ]"#;
        let rules = AlertRule::parse_list(json).unwrap();
        let compiled = compile_set(rules);
        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled[0].rule.id, "ok");
    }

    #[test]
    fn test_compile_missing_target_value() {
        let json = r#"[{"id": "a4", "symbol": "BTCUSDT", "targetType": "indicator"}]"#;
        let rule = AlertRule::parse_list(json).unwrap().remove(0);
        assert!(matches!(
            CompiledRule::compile(rule),
            Err(RuleError::BadTarget(_))
        ));
    }
}
