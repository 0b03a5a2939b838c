//! Alert rule configuration.
//!
//! Rules arrive as JSON from the hosting application and are replaced
//! wholesale on each sync. They are raw configuration only; the engine
//! compiles them into a hot-path representation at sync time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::Interval;

/// What kind of value the rule is watching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    /// A literal price level.
    #[default]
    Price,
    /// An indicator spec string, e.g. "sma25" or "fib_100_90_0.618".
    Indicator,
    /// A time-parameterized drawing construct.
    Drawing,
}

/// Crossing direction a rule listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    CrossingUp,
    CrossingDown,
}

/// Policy gating when a detected crossing becomes an actual firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationMode {
    #[default]
    Immediate,
    CandleClose,
    TimeDelay,
    CandleDelay,
}

/// Whether a rule fires once or repeatedly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    #[default]
    Once,
    Repeat,
}

/// Vibration style requested by a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VibrationKind {
    #[default]
    None,
    Once,
    Continuous,
}

/// Side effects to dispatch when the rule fires. The engine passes these
/// through on the trigger; presentation is the collaborator's job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertActions {
    pub notify: bool,
    /// 0 disables sound.
    pub sound_id: u8,
    pub vibration: VibrationKind,
}

impl Default for AlertActions {
    fn default() -> Self {
        Self {
            notify: true,
            sound_id: 1,
            vibration: VibrationKind::Once,
        }
    }
}

/// A user-defined alert rule, as synced from the hosting application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    pub id: String,
    pub symbol: String,
    #[serde(default)]
    pub interval: Interval,
    #[serde(default)]
    pub target_type: TargetType,
    /// Literal price level for `TargetType::Price`.
    #[serde(default)]
    pub target: f64,
    /// Indicator spec string for `TargetType::Indicator`.
    #[serde(default)]
    pub target_value: Option<String>,
    /// Drawing algorithm name for `TargetType::Drawing`.
    #[serde(default)]
    pub algo: Option<String>,
    /// Raw drawing parameters, compiled once at sync.
    #[serde(default)]
    pub params: Option<HashMap<String, serde_json::Value>>,
    /// Empty set defaults to crossing_up.
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub confirmation: ConfirmationMode,
    #[serde(default)]
    pub delay_seconds: u64,
    #[serde(default)]
    pub delay_candles: u32,
    #[serde(default)]
    pub repeat: RepeatMode,
    #[serde(default = "default_repeat_interval")]
    pub repeat_interval_seconds: u64,
    #[serde(default)]
    pub actions: AlertActions,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_repeat_interval() -> u64 {
    60
}

fn default_active() -> bool {
    true
}

impl AlertRule {
    /// Parse a rule list from its JSON representation.
    pub fn parse_list(json: &str) -> Result<Vec<AlertRule>, crate::error::RuleError> {
        serde_json::from_str(json).map_err(|e| crate::error::RuleError::Deserialize(e.to_string()))
    }

    /// Whether this rule needs candle data rather than plain tickers.
    pub fn needs_klines(&self) -> bool {
        !matches!(self.target_type, TargetType::Price)
            || matches!(
                self.confirmation,
                ConfirmationMode::CandleClose | ConfirmationMode::CandleDelay
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_from_json_defaults() {
        let json = r#"[{"id": "a1", "symbol": "BTCUSDT", "target": 100000.0}]"#;
        let rules = AlertRule::parse_list(json).unwrap();
        assert_eq!(rules.len(), 1);
        let r = &rules[0];
        assert_eq!(r.target_type, TargetType::Price);
        assert_eq!(r.confirmation, ConfirmationMode::Immediate);
        assert_eq!(r.repeat, RepeatMode::Once);
        assert!(r.conditions.is_empty());
        assert!(r.active);
    }

    #[test]
    fn test_rule_full_json() {
        let json = r#"[{
            "id": "a2",
            "symbol": "ETHUSDT.P",
            "interval": "1h",
            "targetType": "indicator",
            "targetValue": "rsi14",
            "conditions": ["crossing_down"],
            "confirmation": "candle_delay",
            "delayCandles": 3,
            "repeat": "repeat",
            "repeatIntervalSeconds": 300,
            "actions": {"notify": true, "soundId": 2, "vibration": "continuous"}
        }]"#;
        let r = &AlertRule::parse_list(json).unwrap()[0];
        assert_eq!(r.interval, Interval::Hour1);
        assert_eq!(r.target_type, TargetType::Indicator);
        assert_eq!(r.target_value.as_deref(), Some("rsi14"));
        assert_eq!(r.conditions, vec![Condition::CrossingDown]);
        assert_eq!(r.delay_candles, 3);
        assert_eq!(r.repeat_interval_seconds, 300);
        assert_eq!(r.actions.vibration, VibrationKind::Continuous);
        assert!(r.needs_klines());
    }

    #[test]
    fn test_needs_klines() {
        let json = r#"[
            {"id": "p", "symbol": "X", "target": 1.0},
            {"id": "c", "symbol": "X", "target": 1.0, "confirmation": "candle_close"},
            {"id": "d", "symbol": "X", "targetType": "drawing", "algo": "price_level"}
        ]"#;
        let rules = AlertRule::parse_list(json).unwrap();
        assert!(!rules[0].needs_klines());
        assert!(rules[1].needs_klines());
        assert!(rules[2].needs_klines());
    }
}
