//! Core traits for the alert engine.

mod provider;
mod sink;

pub use provider::MarketDataProvider;
pub use sink::{EventSink, FanoutSink};
