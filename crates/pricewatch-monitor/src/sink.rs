//! Logging event sink.

use pricewatch_core::traits::EventSink;
use pricewatch_core::types::{Direction, TickerUpdate, Trigger};
use tracing::{debug, info};

/// Sink that reports engine output through the tracing pipeline.
/// Tickers are high volume and go out at debug; fired alerts at info.
#[derive(Debug, Default)]
pub struct LoggingSink;

impl LoggingSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LoggingSink {
    fn on_ticker(&self, update: &TickerUpdate) {
        debug!(
            symbol = %update.symbol,
            price = update.price,
            change_percent = update.change_percent,
            "Ticker"
        );
    }

    fn on_trigger(&self, trigger: &Trigger) {
        let direction = match trigger.direction {
            Direction::Up => "up",
            Direction::Down => "down",
        };
        info!(
            rule_id = %trigger.rule_id,
            symbol = %trigger.symbol,
            price = trigger.price,
            target = trigger.target,
            direction,
            notify = trigger.actions.notify,
            sound_id = trigger.actions.sound_id,
            "Alert fired"
        );
    }
}
