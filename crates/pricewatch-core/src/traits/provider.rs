//! Market data provider trait.

use crate::error::ProviderError;
use crate::types::Subscription;
use async_trait::async_trait;

/// A pluggable market data source.
///
/// Implementations own their connection lifecycle and deliver canonical
/// [`MarketEvent`](crate::types::MarketEvent)s into the engine's channel.
/// None of these calls may block on network I/O: starting a stream spawns
/// the receive task and returns.
///
/// Changing the requested set while already connected must be idempotent:
/// a call with the same effective subscription set is a no-op, not a
/// reconnect.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Subscribe to live ticker updates for the given symbols.
    async fn start_ticker(&self, symbols: &[String]) -> Result<(), ProviderError>;

    /// Stop all ticker streams.
    async fn stop_ticker(&self);

    /// Subscribe to live candle updates for the given (symbol, interval)
    /// pairs. First-time subscriptions also seed bounded history.
    async fn start_klines(&self, subscriptions: &[Subscription]) -> Result<(), ProviderError>;

    /// Stop all kline streams.
    async fn stop_klines(&self);

    /// Re-emit the last seen ticker for every subscribed symbol, so a late
    /// subscriber doesn't wait for the next tick.
    async fn request_replay(&self);

    /// Tear down all connections and background tasks.
    async fn shutdown(&self);

    /// Get the provider name.
    fn name(&self) -> &str;
}
