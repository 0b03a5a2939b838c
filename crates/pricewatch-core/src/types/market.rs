//! Canonical market data events.
//!
//! Providers normalize exchange-specific messages into these types before
//! handing them to the alert engine. Nothing downstream of a provider ever
//! sees a wire format.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::rule::{AlertActions, Condition};
use super::Interval;

/// A (symbol, interval) pair identifying a requested candle stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscription {
    pub symbol: String,
    pub interval: Interval,
}

impl Subscription {
    pub fn new(symbol: impl Into<String>, interval: Interval) -> Self {
        Self {
            symbol: symbol.into(),
            interval,
        }
    }
}

/// Latest price for a symbol, with 24h change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerUpdate {
    pub symbol: String,
    pub price: f64,
    pub change_percent: f64,
}

/// A single candle update, closed or still forming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub symbol: String,
    pub interval: Interval,
    pub close: f64,
    /// True when this candle is final for its open time.
    pub is_closed: bool,
    /// Candle open time, Unix milliseconds.
    pub open_time_ms: i64,
}

/// A closed candle used for history seeding and gap backfill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClosedCandle {
    pub open_time_ms: i64,
    pub close: f64,
}

/// Canonical event delivered by a provider to the alert engine.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    Ticker(TickerUpdate),
    Kline(Kline),
    /// Bulk history for a key, appended to the store without evaluating
    /// any alert. Candles must be in ascending open-time order.
    Seed {
        symbol: String,
        interval: Interval,
        candles: Vec<ClosedCandle>,
    },
}

/// Direction of a crossing that fired an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
}

impl From<Condition> for Direction {
    fn from(c: Condition) -> Self {
        match c {
            Condition::CrossingUp => Direction::Up,
            Condition::CrossingDown => Direction::Down,
        }
    }
}

/// Emitted when an alert rule fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub rule_id: String,
    pub symbol: String,
    /// Price at the moment of firing.
    pub price: f64,
    /// The resolved target value that was crossed.
    pub target: f64,
    pub direction: Direction,
    /// Side effects the collaborator should dispatch.
    pub actions: AlertActions,
}

pub type EventSender = mpsc::Sender<MarketEvent>;
pub type EventReceiver = mpsc::Receiver<MarketEvent>;

/// Create the provider-to-engine event channel.
pub fn create_event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(capacity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_from_condition() {
        assert_eq!(Direction::from(Condition::CrossingUp), Direction::Up);
        assert_eq!(Direction::from(Condition::CrossingDown), Direction::Down);
    }

    #[test]
    fn test_trigger_serializes() {
        let t = Trigger {
            rule_id: "a1".into(),
            symbol: "BTCUSDT".into(),
            price: 101.0,
            target: 100.0,
            direction: Direction::Up,
            actions: AlertActions::default(),
        };
        let json = serde_json::to_string(&t).unwrap();
        assert!(json.contains("\"direction\":\"up\""));
    }
}
