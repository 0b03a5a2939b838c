//! Alert evaluation actor.
//!
//! One task owns every mutable structure: candle history, live closes,
//! rule set, and per-rule runtime state. Providers deliver canonical
//! events over a channel and the orchestrator sends commands over a
//! second one, so evaluation and rule syncs are serialized without any
//! locking and a sync can never be observed half-applied.

use chrono::Utc;
use pricewatch_core::error::{AlertError, AlertResult};
use pricewatch_core::traits::EventSink;
use pricewatch_core::types::{
    AlertRule, Condition, ConfirmationMode, Direction, EventReceiver, Kline, MarketEvent,
    RepeatMode, Subscription, TickerUpdate, Trigger,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::compiled::{compile_set, CompiledRule, CompiledTarget};
use crate::state::{RuleState, RuntimeStates};
use crate::store::CandleStore;

/// Commands accepted by the engine actor.
#[derive(Debug)]
pub enum EngineCommand {
    /// Replace the rule set wholesale.
    SyncRules(Vec<AlertRule>),
    Shutdown,
}

/// Cloneable handle for talking to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
    active_rules: watch::Receiver<bool>,
}

impl EngineHandle {
    pub async fn sync_rules(&self, rules: Vec<AlertRule>) -> AlertResult<()> {
        self.commands
            .send(EngineCommand::SyncRules(rules))
            .await
            .map_err(|_| AlertError::Internal("engine command channel closed".to_string()))
    }

    pub async fn shutdown(&self) {
        let _ = self.commands.send(EngineCommand::Shutdown).await;
    }

    /// Whether any active rule currently needs background evaluation.
    /// The orchestrator watches this to hold or release its keep-alive
    /// resource; the engine itself touches no power primitive.
    pub fn has_active_rules(&self) -> bool {
        *self.active_rules.borrow()
    }

    /// Watchable form of [`has_active_rules`](Self::has_active_rules).
    pub fn active_rules_signal(&self) -> watch::Receiver<bool> {
        self.active_rules.clone()
    }
}

/// The evaluation actor. Drive it with [`AlertEngine::run`].
pub struct AlertEngine {
    store: CandleStore,
    rules: Vec<CompiledRule>,
    states: RuntimeStates,
    /// Last ticker price per symbol, the "previous price" for
    /// ticker-path rules.
    last_ticker: HashMap<String, f64>,
    sink: Arc<dyn EventSink>,
    events: EventReceiver,
    commands: mpsc::Receiver<EngineCommand>,
    active_tx: watch::Sender<bool>,
}

impl AlertEngine {
    pub fn new(events: EventReceiver, sink: Arc<dyn EventSink>) -> (Self, EngineHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (active_tx, active_rx) = watch::channel(false);

        let engine = Self {
            store: CandleStore::new(),
            rules: Vec::new(),
            states: RuntimeStates::new(),
            last_ticker: HashMap::new(),
            sink,
            events,
            commands: cmd_rx,
            active_tx,
        };
        let handle = EngineHandle {
            commands: cmd_tx,
            active_rules: active_rx,
        };
        (engine, handle)
    }

    /// Run until shutdown or until every provider sender is dropped.
    /// Events already queued when shutdown arrives are still evaluated.
    pub async fn run(mut self) {
        info!("Alert engine started");
        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(EngineCommand::SyncRules(rules)) => self.sync_rules(rules),
                    Some(EngineCommand::Shutdown) | None => {
                        self.drain_events();
                        break;
                    }
                },
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event, Utc::now().timestamp_millis()),
                    None => break,
                },
            }
        }
        let _ = self.active_tx.send(false);
        info!("Alert engine stopped");
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event, Utc::now().timestamp_millis());
        }
    }

    fn sync_rules(&mut self, rules: Vec<AlertRule>) {
        let compiled = compile_set(rules);
        let live_ids: HashSet<String> = compiled.iter().map(|c| c.rule.id.clone()).collect();
        self.states.prune(&live_ids);
        self.rules = compiled;
        let _ = self.active_tx.send(!self.rules.is_empty());
        info!(count = self.rules.len(), "Alert rules synced");
    }

    fn handle_event(&mut self, event: MarketEvent, now_ms: i64) {
        match event {
            MarketEvent::Ticker(update) => self.handle_ticker(update, now_ms),
            MarketEvent::Kline(kline) => self.handle_kline(kline, now_ms),
            MarketEvent::Seed {
                symbol,
                interval,
                candles,
            } => {
                let key = Subscription::new(symbol, interval);
                debug!(symbol = %key.symbol, interval = %key.interval, count = candles.len(), "Seeding history");
                self.store.seed(&key, &candles);
            }
        }
    }

    fn handle_ticker(&mut self, update: TickerUpdate, now_ms: i64) {
        let prev = self.last_ticker.insert(update.symbol.clone(), update.price);
        if let Some(prev) = prev {
            for rule in &self.rules {
                if rule.kline_path || rule.rule.symbol != update.symbol {
                    continue;
                }
                let state = self.states.entry(&rule.rule.id);
                if let Some(trigger) =
                    evaluate_rule(rule, &self.store, state, prev, update.price, now_ms, false)
                {
                    emit_trigger(self.sink.as_ref(), trigger);
                }
            }
        }
        self.sink.on_ticker(&update);
    }

    fn handle_kline(&mut self, kline: Kline, now_ms: i64) {
        let key = Subscription::new(kline.symbol.clone(), kline.interval);

        let prev = if kline.is_closed {
            // Re-delivered or stale candles: no append, no evaluation,
            // so duplicates cannot double-fire and out-of-order bars
            // cannot corrupt history.
            if !self.store.append_closed(&key, kline.open_time_ms, kline.close) {
                return;
            }
            self.store.update_live(&key, kline.close);
            self.store.previous_close_after_append(&key)
        } else {
            let prior_live = self.store.update_live(&key, kline.close);
            prior_live.or_else(|| self.store.last_close(&key))
        };
        let Some(prev) = prev else { return };

        for rule in &self.rules {
            if !rule.kline_path || rule.key != key {
                continue;
            }
            let state = self.states.entry(&rule.rule.id);
            if let Some(trigger) = evaluate_rule(
                rule,
                &self.store,
                state,
                prev,
                kline.close,
                now_ms,
                kline.is_closed,
            ) {
                emit_trigger(self.sink.as_ref(), trigger);
            }
        }
    }
}

fn emit_trigger(sink: &dyn EventSink, trigger: Trigger) {
    info!(
        rule_id = %trigger.rule_id,
        symbol = %trigger.symbol,
        price = trigger.price,
        target = trigger.target,
        "Alert fired"
    );
    sink.on_trigger(&trigger);
}

/// Run one rule against one event. Returns the trigger to emit, if the
/// rule fired.
fn evaluate_rule(
    rule: &CompiledRule,
    store: &CandleStore,
    state: &mut RuleState,
    prev: f64,
    current: f64,
    now_ms: i64,
    is_closed_event: bool,
) -> Option<Trigger> {
    // Closed-candle confirmations never look at a forming candle
    match rule.rule.confirmation {
        ConfirmationMode::CandleClose | ConfirmationMode::CandleDelay if !is_closed_event => {
            return None
        }
        _ => {}
    }

    match rule.rule.repeat {
        RepeatMode::Once => {
            if state.fired_once {
                return None;
            }
        }
        RepeatMode::Repeat => {
            if let Some(last) = state.last_fired_at_ms {
                if now_ms - last < rule.rule.repeat_interval_seconds as i64 * 1000 {
                    return None;
                }
            }
        }
    }

    let candidates: Vec<f64> = match &rule.target {
        CompiledTarget::Price(price) => vec![*price],
        CompiledTarget::Indicator(algo) => {
            let value = algo.evaluate(store.history(&rule.key));
            if value.is_nan() {
                return None;
            }
            vec![value]
        }
        CompiledTarget::Drawing(algo) => {
            let values = algo.evaluate(now_ms as f64 / 1000.0);
            if values.is_empty() {
                return None;
            }
            values
        }
    };

    let (crossing, beyond) = detect(rule, &candidates, prev, current);

    match rule.rule.confirmation {
        ConfirmationMode::Immediate | ConfirmationMode::CandleClose => {
            let (target, direction) = crossing?;
            Some(fire(rule, state, current, target, direction, now_ms))
        }
        ConfirmationMode::TimeDelay => {
            // Crossing or already-beyond arms the timer; losing the
            // condition disarms it without firing.
            match crossing.or(beyond) {
                Some((target, direction)) => match state.pending_since_ms {
                    None => {
                        state.pending_since_ms = Some(now_ms);
                        None
                    }
                    Some(start) => {
                        if now_ms - start >= rule.rule.delay_seconds as i64 * 1000 {
                            state.pending_since_ms = None;
                            Some(fire(rule, state, current, target, direction, now_ms))
                        } else {
                            None
                        }
                    }
                },
                None => {
                    state.pending_since_ms = None;
                    None
                }
            }
        }
        ConfirmationMode::CandleDelay => match crossing.or(beyond) {
            Some((target, direction)) => {
                state.consecutive_hits += 1;
                if state.consecutive_hits >= rule.rule.delay_candles {
                    state.consecutive_hits = 0;
                    Some(fire(rule, state, current, target, direction, now_ms))
                } else {
                    None
                }
            }
            None => {
                state.consecutive_hits = 0;
                None
            }
        },
    }
}

/// Find the first crossed target and, separately, the first target the
/// price currently sits beyond. "Beyond" only ever drives delay timers.
fn detect(
    rule: &CompiledRule,
    candidates: &[f64],
    prev: f64,
    current: f64,
) -> (Option<(f64, Direction)>, Option<(f64, Direction)>) {
    let up_enabled = rule.conditions.contains(&Condition::CrossingUp);
    let down_enabled = rule.conditions.contains(&Condition::CrossingDown);

    let mut crossing: Option<(f64, Direction)> = None;
    let mut beyond: Option<(f64, Direction)> = None;

    let mut test = |target: f64, direction: Direction| {
        let (crossed, past) = match direction {
            Direction::Up => (prev < target && target <= current, current >= target),
            Direction::Down => (prev > target && target >= current, current <= target),
        };
        if crossed && crossing.is_none() {
            crossing = Some((target, direction));
        }
        if past && beyond.is_none() {
            beyond = Some((target, direction));
        }
    };

    if rule.is_rect_zone() {
        // The zone's upper bound is the only up boundary and its lower
        // bound the only down boundary.
        let max = candidates.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let min = candidates.iter().cloned().fold(f64::INFINITY, f64::min);
        if up_enabled {
            test(max, Direction::Up);
        }
        if down_enabled {
            test(min, Direction::Down);
        }
    } else {
        for &target in candidates {
            if up_enabled {
                test(target, Direction::Up);
            }
            if down_enabled {
                test(target, Direction::Down);
            }
        }
    }

    (crossing, beyond)
}

fn fire(
    rule: &CompiledRule,
    state: &mut RuleState,
    current: f64,
    target: f64,
    direction: Direction,
    now_ms: i64,
) -> Trigger {
    match rule.rule.repeat {
        RepeatMode::Once => state.fired_once = true,
        RepeatMode::Repeat => state.last_fired_at_ms = Some(now_ms),
    }
    Trigger {
        rule_id: rule.rule.id.clone(),
        symbol: rule.rule.symbol.clone(),
        price: current,
        target,
        direction,
        actions: rule.rule.actions,
    }
}

/// Unique (symbol, interval) pairs the active rule set needs candle
/// streams for.
pub fn kline_subscriptions(rules: &[AlertRule]) -> Vec<Subscription> {
    let mut seen = HashSet::new();
    rules
        .iter()
        .filter(|r| r.active && r.needs_klines())
        .map(|r| Subscription::new(r.symbol.clone(), r.interval))
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

/// Unique symbols the active rule set watches.
pub fn ticker_symbols(rules: &[AlertRule]) -> Vec<String> {
    let mut seen = HashSet::new();
    rules
        .iter()
        .filter(|r| r.active)
        .map(|r| r.symbol.clone())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}
