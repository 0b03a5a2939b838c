//! Exchange market-data providers.
//!
//! Every provider speaks the same [`MarketDataProvider`] trait and
//! pushes [`MarketEvent`]s into a shared channel; the engine never
//! knows which exchange is on the other side. Selection happens once
//! at startup through [`ProviderChoice`].

use std::sync::Arc;

use pricewatch_core::traits::MarketDataProvider;
use pricewatch_core::types::EventSender;
use serde::{Deserialize, Serialize};

pub mod backoff;
pub mod binance;
pub mod hyperliquid;
mod ws;

pub use backoff::ExponentialBackoff;
pub use binance::{BinanceEndpoints, BinanceProvider};
pub use hyperliquid::{HyperliquidEndpoints, HyperliquidProvider};

// Re-exported so callers can name the event types without a direct
// core dependency.
pub use pricewatch_core::types::MarketEvent;

/// Which exchange to connect to, with its endpoint overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "exchange", rename_all = "lowercase")]
pub enum ProviderChoice {
    Binance {
        #[serde(flatten)]
        endpoints: BinanceEndpoints,
    },
    Hyperliquid {
        #[serde(flatten)]
        endpoints: HyperliquidEndpoints,
    },
}

impl Default for ProviderChoice {
    fn default() -> Self {
        ProviderChoice::Binance {
            endpoints: BinanceEndpoints::default(),
        }
    }
}

impl ProviderChoice {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderChoice::Binance { .. } => "binance",
            ProviderChoice::Hyperliquid { .. } => "hyperliquid",
        }
    }

    /// Build the provider, wired to push events into `events`.
    pub fn build(&self, events: EventSender) -> Arc<dyn MarketDataProvider> {
        match self {
            ProviderChoice::Binance { endpoints } => {
                Arc::new(BinanceProvider::new(endpoints.clone(), events))
            }
            ProviderChoice::Hyperliquid { endpoints } => {
                Arc::new(HyperliquidProvider::new(endpoints.clone(), events))
            }
        }
    }
}
