//! Per-rule runtime state.
//!
//! Keyed by rule id and kept across rule syncs, so resyncing an
//! unchanged rule does not forget that it already fired or reset a
//! pending delay. Entries whose rule id disappears from a sync are
//! pruned.

use std::collections::{HashMap, HashSet};

/// Mutable bookkeeping for one rule id.
#[derive(Debug, Default, Clone)]
pub struct RuleState {
    /// Permanent once set; only `once` rules set it.
    pub fired_once: bool,
    /// Cooldown anchor for `repeat` rules, Unix milliseconds.
    pub last_fired_at_ms: Option<i64>,
    /// When the time_delay condition first became true, Unix milliseconds.
    pub pending_since_ms: Option<i64>,
    /// Consecutive closed candles with the candle_delay condition true.
    pub consecutive_hits: u32,
}

/// Runtime state table for the active rule set.
#[derive(Debug, Default)]
pub struct RuntimeStates {
    states: HashMap<String, RuleState>,
}

impl RuntimeStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&mut self, rule_id: &str) -> &mut RuleState {
        self.states.entry(rule_id.to_string()).or_default()
    }

    pub fn get(&self, rule_id: &str) -> Option<&RuleState> {
        self.states.get(rule_id)
    }

    /// Drop state for rule ids no longer present after a sync.
    pub fn prune(&mut self, live_ids: &HashSet<String>) {
        self.states.retain(|id, _| live_ids.contains(id));
    }
}
