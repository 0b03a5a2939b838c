//! Alert evaluation engine.
//!
//! Consumes canonical market events from the active provider, maintains
//! the rolling candle store, resolves indicator and drawing targets,
//! and runs the crossing/confirmation state machine that decides when a
//! rule actually fires.

pub mod compiled;
pub mod engine;
pub mod state;
pub mod store;

pub use compiled::{compile_set, CompiledRule, CompiledTarget};
pub use engine::{kline_subscriptions, ticker_symbols, AlertEngine, EngineCommand, EngineHandle};
pub use store::{CandleStore, HISTORY_CAP};
