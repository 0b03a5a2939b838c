//! Core types and traits for the alert engine.
//!
//! This crate provides the foundational building blocks including:
//! - Market data types (Kline, TickerUpdate, canonical MarketEvent)
//! - Alert rule configuration types
//! - Core traits for market data providers and event sinks

pub mod error;
pub mod traits;
pub mod types;

pub use error::{AlertError, AlertResult};
pub use traits::*;
pub use types::*;
