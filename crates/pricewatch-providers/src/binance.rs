//! Binance provider.
//!
//! Symbols are routed by naming convention: a `.P` suffix marks a
//! perpetual-futures instrument served from the futures endpoints, all
//! others go to spot. Each partition gets its own socket per stream
//! kind (miniTicker, kline), and every event is tagged back with the
//! original symbol string before it reaches the engine.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use pricewatch_core::error::ProviderError;
use pricewatch_core::traits::MarketDataProvider;
use pricewatch_core::types::{
    ClosedCandle, EventSender, Interval, Kline, MarketEvent, Subscription, TickerUpdate,
    PERP_SUFFIX,
};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use crate::backoff::retry_request;
use crate::ws::{self, SessionEnd};

/// Most closed candles fetched when seeding a fresh (symbol, interval).
const SEED_BAR_CAP: i64 = 110;
/// Seeding never looks back further than this.
const SEED_LOOKBACK_SECS: i64 = 7 * 86_400;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BinanceEndpoints {
    pub spot_ws_url: String,
    pub futures_ws_url: String,
    pub spot_rest_url: String,
    pub futures_rest_url: String,
}

impl Default for BinanceEndpoints {
    fn default() -> Self {
        Self {
            spot_ws_url: "wss://stream.binance.com:9443".to_string(),
            futures_ws_url: "wss://fstream.binance.com".to_string(),
            spot_rest_url: "https://api.binance.com".to_string(),
            futures_rest_url: "https://fapi.binance.com".to_string(),
        }
    }
}

#[derive(Default)]
struct Inner {
    ticker_key: String,
    ticker_shutdown: Option<watch::Sender<bool>>,
    kline_key: String,
    kline_shutdown: Option<watch::Sender<bool>>,
    seeded: HashSet<Subscription>,
}

pub struct BinanceProvider {
    endpoints: BinanceEndpoints,
    events: EventSender,
    http: reqwest::Client,
    inner: Mutex<Inner>,
    last_tickers: Arc<Mutex<HashMap<String, TickerUpdate>>>,
}

impl BinanceProvider {
    pub fn new(endpoints: BinanceEndpoints, events: EventSender) -> Self {
        Self {
            endpoints,
            events,
            http: reqwest::Client::new(),
            inner: Mutex::new(Inner::default()),
            last_tickers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Split symbols into spot and futures partitions; futures symbols
    /// are returned without their routing suffix.
    fn partition(symbols: &[String]) -> (Vec<String>, Vec<String>) {
        let mut spot = Vec::new();
        let mut perp = Vec::new();
        for symbol in symbols {
            match symbol.strip_suffix(PERP_SUFFIX) {
                Some(base) => perp.push(base.to_string()),
                None => spot.push(symbol.clone()),
            }
        }
        (spot, perp)
    }

    fn spawn_ticker_socket(&self, base_url: &str, symbols: Vec<String>, restore_suffix: bool, shutdown: watch::Receiver<bool>) {
        let streams: Vec<String> = symbols
            .iter()
            .map(|s| format!("{}@miniTicker", s.to_lowercase()))
            .collect();
        let url = format!("{}/stream?streams={}", base_url, streams.join("/"));
        let events = self.events.clone();
        let cache = self.last_tickers.clone();
        let label = if restore_suffix { "binance-futures-ticker" } else { "binance-spot-ticker" };

        tokio::spawn(async move {
            let session_shutdown = shutdown.clone();
            ws::supervise(label, shutdown, move || {
                let url = url.clone();
                let events = events.clone();
                let cache = cache.clone();
                let mut shutdown = session_shutdown.clone();
                async move { run_ticker_session(&url, &events, &cache, restore_suffix, &mut shutdown).await }
            })
            .await;
        });
    }

    fn spawn_kline_socket(&self, base_url: &str, subs: Vec<Subscription>, restore_suffix: bool, shutdown: watch::Receiver<bool>) {
        let streams: Vec<String> = subs
            .iter()
            .map(|s| format!("{}@kline_{}", s.symbol.to_lowercase(), s.interval))
            .collect();
        let url = format!("{}/stream?streams={}", base_url, streams.join("/"));
        let events = self.events.clone();
        let label = if restore_suffix { "binance-futures-kline" } else { "binance-spot-kline" };

        tokio::spawn(async move {
            let session_shutdown = shutdown.clone();
            ws::supervise(label, shutdown, move || {
                let url = url.clone();
                let events = events.clone();
                let mut shutdown = session_shutdown.clone();
                async move { run_kline_session(&url, &events, restore_suffix, &mut shutdown).await }
            })
            .await;
        });
    }

    fn spawn_seed(&self, sub: Subscription) {
        let (wire_symbol, rest_base, kline_path) = match sub.symbol.strip_suffix(PERP_SUFFIX) {
            Some(base) => (base.to_string(), self.endpoints.futures_rest_url.clone(), "/fapi/v1/klines"),
            None => (sub.symbol.clone(), self.endpoints.spot_rest_url.clone(), "/api/v3/klines"),
        };
        let bars = seed_bar_count(sub.interval);
        let url = format!(
            "{}{}?symbol={}&interval={}&limit={}",
            rest_base, kline_path, wire_symbol, sub.interval, bars
        );
        let http = self.http.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            // Seeding is retried until it lands or the engine goes away;
            // a transient REST failure must not leave the key unseeded
            let Some(candles) = retry_request(
                "binance-seed",
                || fetch_seed_candles(&http, &url),
                || events.is_closed(),
            )
            .await
            else {
                return;
            };
            info!(symbol = %sub.symbol, interval = %sub.interval, count = candles.len(), "Seeded candle history");
            let _ = events
                .send(MarketEvent::Seed {
                    symbol: sub.symbol,
                    interval: sub.interval,
                    candles,
                })
                .await;
        });
    }
}

#[async_trait]
impl MarketDataProvider for BinanceProvider {
    async fn start_ticker(&self, symbols: &[String]) -> Result<(), ProviderError> {
        let key = subscription_key(symbols.iter().cloned());

        let shutdown = {
            let mut inner = self.inner.lock().expect("provider lock");
            if inner.ticker_key == key && inner.ticker_shutdown.is_some() {
                debug!("Ticker subscription unchanged, keeping sockets");
                return Ok(());
            }
            if let Some(tx) = inner.ticker_shutdown.take() {
                let _ = tx.send(true);
            }
            inner.ticker_key = key;
            if symbols.is_empty() {
                return Ok(());
            }
            let (tx, rx) = watch::channel(false);
            inner.ticker_shutdown = Some(tx);
            rx
        };

        let (spot, perp) = Self::partition(symbols);
        if !spot.is_empty() {
            self.spawn_ticker_socket(&self.endpoints.spot_ws_url, spot, false, shutdown.clone());
        }
        if !perp.is_empty() {
            self.spawn_ticker_socket(&self.endpoints.futures_ws_url, perp, true, shutdown);
        }
        Ok(())
    }

    async fn stop_ticker(&self) {
        let mut inner = self.inner.lock().expect("provider lock");
        if let Some(tx) = inner.ticker_shutdown.take() {
            let _ = tx.send(true);
        }
        inner.ticker_key.clear();
    }

    async fn start_klines(&self, subscriptions: &[Subscription]) -> Result<(), ProviderError> {
        let key = subscription_key(
            subscriptions
                .iter()
                .map(|s| format!("{}@{}", s.symbol, s.interval)),
        );

        let (shutdown, to_seed) = {
            let mut inner = self.inner.lock().expect("provider lock");
            let to_seed: Vec<Subscription> = subscriptions
                .iter()
                .filter(|s| !inner.seeded.contains(s))
                .cloned()
                .collect();
            for sub in &to_seed {
                inner.seeded.insert(sub.clone());
            }

            if inner.kline_key == key && inner.kline_shutdown.is_some() {
                debug!("Kline subscription unchanged, keeping sockets");
                (None, to_seed)
            } else {
                if let Some(tx) = inner.kline_shutdown.take() {
                    let _ = tx.send(true);
                }
                inner.kline_key = key;
                if subscriptions.is_empty() {
                    (None, to_seed)
                } else {
                    let (tx, rx) = watch::channel(false);
                    inner.kline_shutdown = Some(tx);
                    (Some(rx), to_seed)
                }
            }
        };

        for sub in to_seed {
            self.spawn_seed(sub);
        }

        if let Some(shutdown) = shutdown {
            let mut spot = Vec::new();
            let mut perp = Vec::new();
            for sub in subscriptions {
                match sub.symbol.strip_suffix(PERP_SUFFIX) {
                    Some(base) => perp.push(Subscription::new(base, sub.interval)),
                    None => spot.push(sub.clone()),
                }
            }
            if !spot.is_empty() {
                self.spawn_kline_socket(&self.endpoints.spot_ws_url, spot, false, shutdown.clone());
            }
            if !perp.is_empty() {
                self.spawn_kline_socket(&self.endpoints.futures_ws_url, perp, true, shutdown);
            }
        }
        Ok(())
    }

    async fn stop_klines(&self) {
        let mut inner = self.inner.lock().expect("provider lock");
        if let Some(tx) = inner.kline_shutdown.take() {
            let _ = tx.send(true);
        }
        inner.kline_key.clear();
    }

    async fn request_replay(&self) {
        let cached: Vec<TickerUpdate> = {
            let cache = self.last_tickers.lock().expect("ticker cache lock");
            cache.values().cloned().collect()
        };
        for update in cached {
            let _ = self.events.send(MarketEvent::Ticker(update)).await;
        }
    }

    async fn shutdown(&self) {
        self.stop_ticker().await;
        self.stop_klines().await;
    }

    fn name(&self) -> &str {
        "binance"
    }
}

/// Order-independent identity of a subscription set. Matching keys mean
/// the live sockets already carry the requested streams.
fn subscription_key(streams: impl Iterator<Item = String>) -> String {
    let mut sorted: Vec<String> = streams.collect();
    sorted.sort();
    sorted.join("/")
}

fn seed_bar_count(interval: Interval) -> i64 {
    (SEED_LOOKBACK_SECS / interval.as_secs() as i64).clamp(1, SEED_BAR_CAP)
}

async fn fetch_seed_candles(
    http: &reqwest::Client,
    url: &str,
) -> Result<Vec<ClosedCandle>, ProviderError> {
    let rows: Vec<serde_json::Value> = http
        .get(url)
        .send()
        .await
        .map_err(|e| ProviderError::Api(e.to_string()))?
        .json()
        .await
        .map_err(|e| ProviderError::Parse(e.to_string()))?;

    let mut candles = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(cells) = row.as_array() else { continue };
        let open_time_ms = cells.first().and_then(|v| v.as_i64());
        let close = cells
            .get(4)
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<f64>().ok());
        if let (Some(open_time_ms), Some(close)) = (open_time_ms, close) {
            candles.push(ClosedCandle {
                open_time_ms,
                close,
            });
        }
    }
    // REST returns the still-forming bar last; drop it so only final
    // closes are seeded
    candles.pop();
    Ok(candles)
}

async fn run_ticker_session(
    url: &str,
    events: &EventSender,
    cache: &Mutex<HashMap<String, TickerUpdate>>,
    restore_suffix: bool,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let stream = match ws::connect(url, shutdown).await {
        Ok(stream) => stream,
        Err(end) => return end,
    };
    info!(url = %url, "Ticker socket connected");
    let connected_at = Instant::now();
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            biased;

            _ = ws::shutdown_requested(shutdown) => {
                let _ = write.close().await;
                return SessionEnd::Shutdown;
            }

            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Some(update) = parse_mini_ticker(&text, restore_suffix) {
                        cache.lock().expect("ticker cache lock").insert(update.symbol.clone(), update.clone());
                        if events.send(MarketEvent::Ticker(update)).await.is_err() {
                            return SessionEnd::ChannelClosed;
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    if write.send(Message::Pong(data)).await.is_err() {
                        return SessionEnd::Lost {
                            error: ProviderError::WebSocket("pong failed".to_string()),
                            connected_for: Some(connected_at.elapsed()),
                        };
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    return SessionEnd::Lost {
                        error: ProviderError::Connection("socket closed".to_string()),
                        connected_for: Some(connected_at.elapsed()),
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return SessionEnd::Lost {
                        error: ProviderError::WebSocket(e.to_string()),
                        connected_for: Some(connected_at.elapsed()),
                    };
                }
            }
        }
    }
}

async fn run_kline_session(
    url: &str,
    events: &EventSender,
    restore_suffix: bool,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let stream = match ws::connect(url, shutdown).await {
        Ok(stream) => stream,
        Err(end) => return end,
    };
    info!(url = %url, "Kline socket connected");
    let connected_at = Instant::now();
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            biased;

            _ = ws::shutdown_requested(shutdown) => {
                let _ = write.close().await;
                return SessionEnd::Shutdown;
            }

            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Some(kline) = parse_kline(&text, restore_suffix) {
                        if events.send(MarketEvent::Kline(kline)).await.is_err() {
                            return SessionEnd::ChannelClosed;
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    if write.send(Message::Pong(data)).await.is_err() {
                        return SessionEnd::Lost {
                            error: ProviderError::WebSocket("pong failed".to_string()),
                            connected_for: Some(connected_at.elapsed()),
                        };
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    return SessionEnd::Lost {
                        error: ProviderError::Connection("socket closed".to_string()),
                        connected_for: Some(connected_at.elapsed()),
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return SessionEnd::Lost {
                        error: ProviderError::WebSocket(e.to_string()),
                        connected_for: Some(connected_at.elapsed()),
                    };
                }
            }
        }
    }
}

#[derive(Deserialize)]
struct StreamEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct MiniTickerMsg {
    #[serde(rename = "e")]
    event: String,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "o")]
    open: String,
}

#[derive(Deserialize)]
struct KlineMsg {
    #[serde(rename = "e")]
    event: String,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "k")]
    kline: KlinePayload,
}

#[derive(Deserialize)]
struct KlinePayload {
    #[serde(rename = "i")]
    interval: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "x")]
    is_closed: bool,
    #[serde(rename = "t")]
    open_time_ms: i64,
}

fn restore(symbol: String, restore_suffix: bool) -> String {
    if restore_suffix {
        format!("{}{}", symbol, PERP_SUFFIX)
    } else {
        symbol
    }
}

/// Parse a combined-stream miniTicker message. 24h change is derived
/// from the open/close pair the stream carries.
fn parse_mini_ticker(text: &str, restore_suffix: bool) -> Option<TickerUpdate> {
    let envelope: StreamEnvelope<MiniTickerMsg> = serde_json::from_str(text).ok()?;
    let msg = envelope.data;
    if msg.event != "24hrMiniTicker" {
        return None;
    }
    let price: f64 = msg.close.parse().ok()?;
    let open: f64 = msg.open.parse().ok()?;
    let change_percent = if open != 0.0 {
        (price - open) / open * 100.0
    } else {
        0.0
    };
    Some(TickerUpdate {
        symbol: restore(msg.symbol, restore_suffix),
        price,
        change_percent,
    })
}

fn parse_kline(text: &str, restore_suffix: bool) -> Option<Kline> {
    let envelope: StreamEnvelope<KlineMsg> = serde_json::from_str(text).ok()?;
    let msg = envelope.data;
    if msg.event != "kline" {
        return None;
    }
    let interval: Interval = msg.kline.interval.parse().ok()?;
    let close: f64 = msg.kline.close.parse().ok()?;
    Some(Kline {
        symbol: restore(msg.symbol, restore_suffix),
        interval,
        close,
        is_closed: msg.kline.is_closed,
        open_time_ms: msg.kline.open_time_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_by_suffix() {
        let symbols = vec![
            "BTCUSDT".to_string(),
            "ETHUSDT.P".to_string(),
            "SOLUSDT".to_string(),
        ];
        let (spot, perp) = BinanceProvider::partition(&symbols);
        assert_eq!(spot, vec!["BTCUSDT", "SOLUSDT"]);
        assert_eq!(perp, vec!["ETHUSDT"]);
    }

    #[test]
    fn test_parse_mini_ticker() {
        let text = r#"{"stream":"btcusdt@miniTicker","data":{"e":"24hrMiniTicker","E":1700000000,"s":"BTCUSDT","c":"105.0","o":"100.0","h":"106.0","l":"99.0","v":"1","q":"1"}}"#;
        let update = parse_mini_ticker(text, false).unwrap();
        assert_eq!(update.symbol, "BTCUSDT");
        assert_eq!(update.price, 105.0);
        assert!((update.change_percent - 5.0).abs() < 1e-10);
    }

    #[test]
    fn test_parse_mini_ticker_restores_suffix() {
        let text = r#"{"stream":"ethusdt@miniTicker","data":{"e":"24hrMiniTicker","s":"ETHUSDT","c":"2000","o":"2000"}}"#;
        let update = parse_mini_ticker(text, true).unwrap();
        assert_eq!(update.symbol, "ETHUSDT.P");
    }

    #[test]
    fn test_parse_kline() {
        let text = r#"{"stream":"btcusdt@kline_1m","data":{"e":"kline","s":"BTCUSDT","k":{"t":1700000000000,"i":"1m","c":"101.5","x":true,"o":"100.0"}}}"#;
        let kline = parse_kline(text, false).unwrap();
        assert_eq!(kline.symbol, "BTCUSDT");
        assert_eq!(kline.interval, Interval::Minute1);
        assert_eq!(kline.close, 101.5);
        assert!(kline.is_closed);
        assert_eq!(kline.open_time_ms, 1_700_000_000_000);
    }

    #[test]
    fn test_parse_garbage_is_dropped() {
        assert!(parse_mini_ticker("not json", false).is_none());
        assert!(parse_kline(r#"{"data":{"e":"aggTrade"}}"#, false).is_none());
    }

    #[test]
    fn test_subscription_key_ignores_order() {
        let a = subscription_key(["BTCUSDT", "ETHUSDT.P"].map(String::from).into_iter());
        let b = subscription_key(["ETHUSDT.P", "BTCUSDT"].map(String::from).into_iter());
        assert_eq!(a, b);
        let c = subscription_key(["BTCUSDT"].map(String::from).into_iter());
        assert_ne!(a, c);
    }

    #[test]
    fn test_seed_bar_count_caps() {
        assert_eq!(seed_bar_count(Interval::Minute1), SEED_BAR_CAP);
        assert_eq!(seed_bar_count(Interval::Daily), 7);
        assert_eq!(seed_bar_count(Interval::Weekly), 1);
    }
}
