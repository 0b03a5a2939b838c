//! Outbound event sinks.
//!
//! The engine takes sink handles at construction; observers register
//! explicitly instead of claiming a process-wide callback slot.

use crate::types::{TickerUpdate, Trigger};
use std::sync::Arc;

/// Receiver for engine output: display updates and fired alerts.
pub trait EventSink: Send + Sync {
    /// A normalized ticker update, for display collaborators.
    fn on_ticker(&self, update: &TickerUpdate);

    /// An alert rule fired.
    fn on_trigger(&self, trigger: &Trigger);
}

/// Broadcasts engine output to a list of registered sinks.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanoutSink {
    fn on_ticker(&self, update: &TickerUpdate) {
        for sink in &self.sinks {
            sink.on_ticker(update);
        }
    }

    fn on_trigger(&self, trigger: &Trigger) {
        for sink in &self.sinks {
            sink.on_trigger(trigger);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AlertActions, Direction};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        tickers: AtomicUsize,
        triggers: AtomicUsize,
    }

    impl EventSink for Counter {
        fn on_ticker(&self, _update: &TickerUpdate) {
            self.tickers.fetch_add(1, Ordering::SeqCst);
        }
        fn on_trigger(&self, _trigger: &Trigger) {
            self.triggers.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_fanout_broadcasts_to_all() {
        let a = Arc::new(Counter {
            tickers: AtomicUsize::new(0),
            triggers: AtomicUsize::new(0),
        });
        let b = Arc::new(Counter {
            tickers: AtomicUsize::new(0),
            triggers: AtomicUsize::new(0),
        });

        let mut fanout = FanoutSink::new();
        fanout.register(a.clone());
        fanout.register(b.clone());

        fanout.on_ticker(&TickerUpdate {
            symbol: "BTCUSDT".into(),
            price: 1.0,
            change_percent: 0.0,
        });
        fanout.on_trigger(&Trigger {
            rule_id: "a1".into(),
            symbol: "BTCUSDT".into(),
            price: 1.0,
            target: 1.0,
            direction: Direction::Up,
            actions: AlertActions::default(),
        });

        assert_eq!(a.tickers.load(Ordering::SeqCst), 1);
        assert_eq!(b.tickers.load(Ordering::SeqCst), 1);
        assert_eq!(a.triggers.load(Ordering::SeqCst), 1);
        assert_eq!(b.triggers.load(Ordering::SeqCst), 1);
    }
}
