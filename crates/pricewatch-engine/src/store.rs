//! Rolling candle history store.
//!
//! One entry per (symbol, interval) key: a bounded sequence of closed
//! close prices, the open time of the newest closed candle, and the
//! last observed close of the still-forming candle. Pure data
//! structure; the engine actor is the only writer.

use pricewatch_core::types::{ClosedCandle, Subscription};
use std::collections::HashMap;

/// Maximum closed candles retained per key.
pub const HISTORY_CAP: usize = 100;

#[derive(Debug, Default)]
struct KeyEntry {
    closes: Vec<f64>,
    last_open_time_ms: Option<i64>,
    live_close: Option<f64>,
}

/// Bounded per-key candle history with live-close tracking.
#[derive(Debug, Default)]
pub struct CandleStore {
    entries: HashMap<Subscription, KeyEntry>,
}

impl CandleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a closed candle. Returns false when `open_time_ms` is not
    /// newer than the most recent append for this key: re-delivery of
    /// the same closed candle is a no-op, and late-arriving older bars
    /// (a seed landing after live candles already closed) cannot break
    /// the ascending order of the history.
    pub fn append_closed(&mut self, key: &Subscription, open_time_ms: i64, close: f64) -> bool {
        let entry = self.entries.entry(key.clone()).or_default();
        if entry
            .last_open_time_ms
            .is_some_and(|last| open_time_ms <= last)
        {
            return false;
        }
        entry.closes.push(close);
        entry.last_open_time_ms = Some(open_time_ms);
        if entry.closes.len() > HISTORY_CAP {
            entry.closes.remove(0);
        }
        true
    }

    /// Overwrite the live close for a key, returning the prior value.
    pub fn update_live(&mut self, key: &Subscription, close: f64) -> Option<f64> {
        let entry = self.entries.entry(key.clone()).or_default();
        entry.live_close.replace(close)
    }

    /// Bulk-append seeded or backfilled closed candles, oldest first.
    pub fn seed(&mut self, key: &Subscription, candles: &[ClosedCandle]) {
        for candle in candles {
            self.append_closed(key, candle.open_time_ms, candle.close);
        }
    }

    /// Closed close prices for a key, oldest first.
    pub fn history(&self, key: &Subscription) -> &[f64] {
        self.entries.get(key).map(|e| e.closes.as_slice()).unwrap_or(&[])
    }

    /// Open time of the newest closed candle for a key.
    pub fn last_open_time(&self, key: &Subscription) -> Option<i64> {
        self.entries.get(key).and_then(|e| e.last_open_time_ms)
    }

    /// Previous price for crossing detection on a just-appended closed
    /// candle: the close before the one at the end of history.
    pub fn previous_close_after_append(&self, key: &Subscription) -> Option<f64> {
        let closes = self.history(key);
        if closes.len() >= 2 {
            Some(closes[closes.len() - 2])
        } else {
            None
        }
    }

    /// Last closed close for a key, used as the live-path fallback when
    /// no live close has been observed yet.
    pub fn last_close(&self, key: &Subscription) -> Option<f64> {
        self.history(key).last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricewatch_core::types::Interval;

    fn key() -> Subscription {
        Subscription::new("BTCUSDT", Interval::Minute1)
    }

    #[test]
    fn test_history_capped_at_100() {
        let mut store = CandleStore::new();
        for i in 0..150i64 {
            store.append_closed(&key(), i * 60_000, i as f64);
        }
        let history = store.history(&key());
        assert_eq!(history.len(), HISTORY_CAP);
        // Oldest entries evicted from the front
        assert_eq!(history[0], 50.0);
        assert_eq!(*history.last().unwrap(), 149.0);
    }

    #[test]
    fn test_duplicate_open_time_is_noop() {
        let mut store = CandleStore::new();
        assert!(store.append_closed(&key(), 60_000, 10.0));
        assert!(!store.append_closed(&key(), 60_000, 11.0));
        assert_eq!(store.history(&key()), &[10.0]);
        assert_eq!(store.last_open_time(&key()), Some(60_000));
    }

    #[test]
    fn test_update_live_returns_prior() {
        let mut store = CandleStore::new();
        assert_eq!(store.update_live(&key(), 10.0), None);
        assert_eq!(store.update_live(&key(), 11.0), Some(10.0));
    }

    #[test]
    fn test_previous_close_after_append() {
        let mut store = CandleStore::new();
        assert_eq!(store.previous_close_after_append(&key()), None);
        store.append_closed(&key(), 0, 10.0);
        assert_eq!(store.previous_close_after_append(&key()), None);
        store.append_closed(&key(), 60_000, 11.0);
        assert_eq!(store.previous_close_after_append(&key()), Some(10.0));
    }

    #[test]
    fn test_seed_is_idempotent_per_open_time() {
        let mut store = CandleStore::new();
        let candles = vec![
            ClosedCandle { open_time_ms: 0, close: 1.0 },
            ClosedCandle { open_time_ms: 60_000, close: 2.0 },
        ];
        store.seed(&key(), &candles);
        // Re-seeding the tail candle does not duplicate it
        store.seed(&key(), &candles[1..]);
        assert_eq!(store.history(&key()), &[1.0, 2.0]);
    }

    #[test]
    fn test_seed_after_live_close_skips_stale_bars() {
        let mut store = CandleStore::new();
        // A closed candle arrives from the socket before the history
        // fetch lands
        store.append_closed(&key(), 120_000, 5.0);
        let candles = vec![
            ClosedCandle { open_time_ms: 0, close: 1.0 },
            ClosedCandle { open_time_ms: 60_000, close: 2.0 },
            ClosedCandle { open_time_ms: 120_000, close: 3.0 },
            ClosedCandle { open_time_ms: 180_000, close: 4.0 },
        ];
        store.seed(&key(), &candles);
        // Bars at or before the recorded open time are dropped; history
        // stays ascending with each open time stored once
        assert_eq!(store.history(&key()), &[5.0, 4.0]);
        assert_eq!(store.last_open_time(&key()), Some(180_000));
    }

    #[test]
    fn test_out_of_order_closed_candle_rejected() {
        let mut store = CandleStore::new();
        assert!(store.append_closed(&key(), 120_000, 5.0));
        assert!(!store.append_closed(&key(), 60_000, 4.0));
        assert_eq!(store.history(&key()), &[5.0]);
        assert_eq!(store.last_open_time(&key()), Some(120_000));
    }

    #[test]
    fn test_keys_are_independent() {
        let mut store = CandleStore::new();
        let other = Subscription::new("ETHUSDT", Interval::Minute1);
        store.append_closed(&key(), 0, 1.0);
        store.update_live(&other, 5.0);
        assert!(store.history(&other).is_empty());
        assert_eq!(store.history(&key()), &[1.0]);
    }
}
