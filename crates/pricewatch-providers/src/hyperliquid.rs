//! Hyperliquid provider.
//!
//! One multiplexed socket carries everything: `activeAssetCtx`
//! subscriptions for tickers and `candle` subscriptions for klines.
//! Hyperliquid names markets by bare coin (`BTC`), so incoming symbols
//! are mapped down for the wire and events fan back out to every
//! original symbol that maps to the same coin.
//!
//! The exchange pushes only the currently forming candle, so closed
//! bars are synthesized on rollover, and a jump of more than one
//! interval is recovered through the REST `candleSnapshot` endpoint. A
//! fetched bar only counts as closed once the server-adjusted clock is
//! past its close boundary, which is why a server/local clock offset is
//! tracked and periodically refreshed. The socket has no retry signal
//! of its own; a liveness watchdog forces a reconnect after 30 seconds
//! of silence.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use pricewatch_core::error::ProviderError;
use pricewatch_core::traits::MarketDataProvider;
use pricewatch_core::types::{
    strip_perp_suffix, ClosedCandle, EventSender, Interval, Kline, MarketEvent, Subscription,
    TickerUpdate,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::backoff::retry_request;
use crate::ws::{self, SessionEnd};

/// Reconnect when no candle message arrives for this long while candle
/// subscriptions are held. Ticker traffic does not count: a stalled
/// candle subscription must be detected even when contexts keep
/// flowing on the shared socket.
const LIVENESS_TIMEOUT: Duration = Duration::from_secs(30);
const WATCHDOG_TICK: Duration = Duration::from_secs(5);
/// How often the server clock offset is refreshed.
const CLOCK_REFRESH: Duration = Duration::from_secs(300);

const SEED_BAR_CAP: i64 = 110;
const SEED_LOOKBACK_SECS: i64 = 7 * 86_400;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HyperliquidEndpoints {
    pub ws_url: String,
    pub info_url: String,
}

impl Default for HyperliquidEndpoints {
    fn default() -> Self {
        Self {
            ws_url: "wss://api.hyperliquid.xyz/ws".to_string(),
            info_url: "https://api.hyperliquid.xyz/info".to_string(),
        }
    }
}

/// Map a display symbol to a Hyperliquid market name: drop the
/// derivative suffix, then a trailing USDT/USD quote.
pub fn to_hl_coin(symbol: &str) -> String {
    let base = strip_perp_suffix(symbol);
    let base = base
        .strip_suffix("USDT")
        .or_else(|| base.strip_suffix("USD"))
        .unwrap_or(base);
    base.to_string()
}

/// Last candle observed per (coin, interval), kept across reconnects so
/// a gap after an outage is detected and backfilled.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    last_open_ms: i64,
    last_close: f64,
}

type Cursors = Arc<Mutex<HashMap<(String, Interval), Cursor>>>;

#[derive(Default)]
struct Inner {
    ticker_symbols: Vec<String>,
    kline_subs: Vec<Subscription>,
    socket_key: String,
    shutdown: Option<watch::Sender<bool>>,
    seeded: HashSet<Subscription>,
}

/// Immutable description of one socket generation.
struct SocketPlan {
    url: String,
    info_url: String,
    /// coin -> original symbols wanting ticker updates.
    ticker_map: HashMap<String, Vec<String>>,
    /// (coin, interval) -> original symbols wanting that candle stream.
    candle_map: HashMap<(String, Interval), Vec<String>>,
}

pub struct HyperliquidProvider {
    endpoints: HyperliquidEndpoints,
    events: EventSender,
    http: reqwest::Client,
    inner: Mutex<Inner>,
    last_tickers: Arc<Mutex<HashMap<String, TickerUpdate>>>,
    cursors: Cursors,
    clock_offset_ms: Arc<AtomicI64>,
}

impl HyperliquidProvider {
    pub fn new(endpoints: HyperliquidEndpoints, events: EventSender) -> Self {
        Self {
            endpoints,
            events,
            http: reqwest::Client::new(),
            inner: Mutex::new(Inner::default()),
            last_tickers: Arc::new(Mutex::new(HashMap::new())),
            cursors: Arc::new(Mutex::new(HashMap::new())),
            clock_offset_ms: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Rebuild the socket if the effective subscription set changed.
    /// Repeated identical calls keep the existing connection.
    fn resubscribe(&self) {
        let (plan, shutdown) = {
            let mut inner = self.inner.lock().expect("provider lock");

            let mut ticker_map: HashMap<String, Vec<String>> = HashMap::new();
            for symbol in &inner.ticker_symbols {
                ticker_map
                    .entry(to_hl_coin(symbol))
                    .or_default()
                    .push(symbol.clone());
            }
            let mut candle_map: HashMap<(String, Interval), Vec<String>> = HashMap::new();
            for sub in &inner.kline_subs {
                candle_map
                    .entry((to_hl_coin(&sub.symbol), sub.interval))
                    .or_default()
                    .push(sub.symbol.clone());
            }

            let mut streams: Vec<String> = ticker_map.keys().map(|c| format!("ctx:{c}")).collect();
            streams.extend(
                candle_map
                    .keys()
                    .map(|(c, i)| format!("candle:{c}@{i}")),
            );
            streams.sort();
            let key = streams.join("/");

            if inner.socket_key == key && inner.shutdown.is_some() {
                debug!("Subscription set unchanged, keeping socket");
                return;
            }
            if let Some(tx) = inner.shutdown.take() {
                let _ = tx.send(true);
            }
            inner.socket_key = key;
            if ticker_map.is_empty() && candle_map.is_empty() {
                return;
            }

            let (tx, rx) = watch::channel(false);
            inner.shutdown = Some(tx);
            (
                Arc::new(SocketPlan {
                    url: self.endpoints.ws_url.clone(),
                    info_url: self.endpoints.info_url.clone(),
                    ticker_map,
                    candle_map,
                }),
                rx,
            )
        };

        let events = self.events.clone();
        let cache = self.last_tickers.clone();
        let cursors = self.cursors.clone();
        let offset = self.clock_offset_ms.clone();
        let http = self.http.clone();

        tokio::spawn(async move {
            let session_shutdown = shutdown.clone();
            ws::supervise("hyperliquid", shutdown, move || {
                let plan = plan.clone();
                let events = events.clone();
                let cache = cache.clone();
                let cursors = cursors.clone();
                let offset = offset.clone();
                let http = http.clone();
                let mut shutdown = session_shutdown.clone();
                async move {
                    run_session(&plan, &events, &cache, &cursors, &offset, &http, &mut shutdown)
                        .await
                }
            })
            .await;
        });
    }

    fn spawn_seed(&self, sub: Subscription) {
        let coin = to_hl_coin(&sub.symbol);
        let info_url = self.endpoints.info_url.clone();
        let http = self.http.clone();
        let events = self.events.clone();
        let cursors = self.cursors.clone();
        let offset = self.clock_offset_ms.clone();

        tokio::spawn(async move {
            let interval_ms = sub.interval.as_millis();
            let end = Utc::now().timestamp_millis() + 2_000;
            let start = end - seed_bar_count(sub.interval) * interval_ms;

            // Retried until the snapshot lands or the engine goes away
            let Some(bars) = retry_request(
                "hyperliquid-seed",
                || fetch_candle_snapshot(&http, &info_url, &coin, sub.interval, start, end),
                || events.is_closed(),
            )
            .await
            else {
                return;
            };
            if bars.is_empty() {
                return;
            }

            let adjusted_now = Utc::now().timestamp_millis() + offset.load(Ordering::Relaxed);
            let candles: Vec<ClosedCandle> = bars
                .iter()
                .filter(|b| b.open_time_ms + interval_ms <= adjusted_now)
                .map(|b| ClosedCandle {
                    open_time_ms: b.open_time_ms,
                    close: b.close,
                })
                .collect();

            if let Some(last) = bars.last() {
                let mut cursors = cursors.lock().expect("cursor lock");
                cursors
                    .entry((coin.clone(), sub.interval))
                    .or_insert(Cursor {
                        last_open_ms: last.open_time_ms,
                        last_close: last.close,
                    });
            }

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
impl MarketDataProvider for HyperliquidProvider {
    async fn start_ticker(&self, symbols: &[String]) -> Result<(), ProviderError> {
        {
            let mut inner = self.inner.lock().expect("provider lock");
            inner.ticker_symbols = symbols.to_vec();
        }
        self.resubscribe();
        Ok(())
    }

    async fn stop_ticker(&self) {
        {
            let mut inner = self.inner.lock().expect("provider lock");
            inner.ticker_symbols.clear();
        }
        self.resubscribe();
    }

    async fn start_klines(&self, subscriptions: &[Subscription]) -> Result<(), ProviderError> {
        let to_seed: Vec<Subscription> = {
            let mut inner = self.inner.lock().expect("provider lock");
            inner.kline_subs = subscriptions.to_vec();
            let fresh: Vec<Subscription> = subscriptions
                .iter()
                .filter(|s| !inner.seeded.contains(s))
                .cloned()
                .collect();
            for sub in &fresh {
                inner.seeded.insert(sub.clone());
            }
            fresh
        };
        for sub in to_seed {
            self.spawn_seed(sub);
        }
        self.resubscribe();
        Ok(())
    }

    async fn stop_klines(&self) {
        {
            let mut inner = self.inner.lock().expect("provider lock");
            inner.kline_subs.clear();
        }
        self.resubscribe();
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
        let mut inner = self.inner.lock().expect("provider lock");
        inner.ticker_symbols.clear();
        inner.kline_subs.clear();
        inner.socket_key.clear();
        if let Some(tx) = inner.shutdown.take() {
            let _ = tx.send(true);
        }
    }

    fn name(&self) -> &str {
        "hyperliquid"
    }
}

async fn run_session(
    plan: &SocketPlan,
    events: &EventSender,
    cache: &Mutex<HashMap<String, TickerUpdate>>,
    cursors: &Cursors,
    offset: &AtomicI64,
    http: &reqwest::Client,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let stream = match ws::connect(&plan.url, shutdown).await {
        Ok(stream) => stream,
        Err(end) => return end,
    };
    info!(url = %plan.url, "Hyperliquid socket connected");
    let connected_at = Instant::now();
    let (mut write, mut read) = stream.split();

    for coin in plan.ticker_map.keys() {
        let sub = json!({"method": "subscribe", "subscription": {"type": "activeAssetCtx", "coin": coin}});
        if write.send(Message::Text(sub.to_string())).await.is_err() {
            return SessionEnd::Lost {
                error: ProviderError::WebSocket("subscribe failed".to_string()),
                connected_for: Some(connected_at.elapsed()),
            };
        }
    }
    for (coin, interval) in plan.candle_map.keys() {
        let sub = json!({"method": "subscribe", "subscription": {"type": "candle", "coin": coin, "interval": interval.to_string()}});
        if write.send(Message::Text(sub.to_string())).await.is_err() {
            return SessionEnd::Lost {
                error: ProviderError::WebSocket("subscribe failed".to_string()),
                connected_for: Some(connected_at.elapsed()),
            };
        }
    }

    refresh_clock_offset(http, &plan.info_url, offset).await;

    let mut last_candle = Instant::now();
    let mut watchdog = tokio::time::interval(WATCHDOG_TICK);
    let mut clock = tokio::time::interval(CLOCK_REFRESH);
    clock.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            biased;

            _ = ws::shutdown_requested(shutdown) => {
                let _ = write.close().await;
                return SessionEnd::Shutdown;
            }

            _ = watchdog.tick() => {
                if !plan.candle_map.is_empty() && last_candle.elapsed() > LIVENESS_TIMEOUT {
                    return SessionEnd::Lost {
                        error: ProviderError::Connection("no candle messages within liveness window".to_string()),
                        connected_for: Some(connected_at.elapsed()),
                    };
                }
            }

            _ = clock.tick() => {
                refresh_clock_offset(http, &plan.info_url, offset).await;
            }

            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    match handle_message(&text, plan, events, cache, cursors, offset, http).await {
                        Ok(true) => last_candle = Instant::now(),
                        Ok(false) => {}
                        Err(()) => return SessionEnd::ChannelClosed,
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
struct WsEnvelope {
    channel: String,
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct AssetCtxMsg {
    coin: String,
    ctx: AssetCtx,
}

#[derive(Deserialize)]
struct AssetCtx {
    #[serde(rename = "midPx")]
    mid_px: Option<String>,
    #[serde(rename = "prevDayPx")]
    prev_day_px: Option<String>,
}

#[derive(Deserialize)]
struct CandleMsg {
    #[serde(rename = "t")]
    open_time_ms: i64,
    #[serde(rename = "s")]
    coin: String,
    #[serde(rename = "i")]
    interval: String,
    #[serde(rename = "c")]
    close: String,
}

/// What a new candle open time implies for the stream.
#[derive(Debug, PartialEq)]
enum Rollover {
    /// Same candle still forming, or first observation.
    None,
    /// Exactly the next candle: the previous one closed at its cached price.
    SyntheticClose { open_time_ms: i64, close: f64 },
    /// More than one interval jumped: refetch from the last known bar.
    Backfill { from_ms: i64 },
}

fn plan_rollover(prior: Option<Cursor>, open_ms: i64, interval_ms: i64) -> Rollover {
    match prior {
        Some(cursor) if open_ms > cursor.last_open_ms => {
            if open_ms - cursor.last_open_ms > interval_ms {
                Rollover::Backfill {
                    from_ms: cursor.last_open_ms,
                }
            } else {
                Rollover::SyntheticClose {
                    open_time_ms: cursor.last_open_ms,
                    close: cursor.last_close,
                }
            }
        }
        _ => Rollover::None,
    }
}

/// Process one socket message. The returned flag reports whether it was
/// candle-channel traffic, which is what feeds the liveness watchdog.
async fn handle_message(
    text: &str,
    plan: &SocketPlan,
    events: &EventSender,
    cache: &Mutex<HashMap<String, TickerUpdate>>,
    cursors: &Cursors,
    offset: &AtomicI64,
    http: &reqwest::Client,
) -> Result<bool, ()> {
    let Ok(envelope) = serde_json::from_str::<WsEnvelope>(text) else {
        return Ok(false);
    };

    match envelope.channel.as_str() {
        "activeAssetCtx" => {
            let Ok(msg) = serde_json::from_value::<AssetCtxMsg>(envelope.data) else {
                return Ok(false);
            };
            let Some(price) = msg.ctx.mid_px.as_deref().and_then(|p| p.parse::<f64>().ok())
            else {
                return Ok(false);
            };
            let prev_day = msg
                .ctx
                .prev_day_px
                .as_deref()
                .and_then(|p| p.parse::<f64>().ok());
            let change_percent = match prev_day {
                Some(prev) if prev != 0.0 => (price - prev) / prev * 100.0,
                _ => 0.0,
            };
            let Some(symbols) = plan.ticker_map.get(&msg.coin) else {
                return Ok(false);
            };
            for symbol in symbols {
                let update = TickerUpdate {
                    symbol: symbol.clone(),
                    price,
                    change_percent,
                };
                cache
                    .lock()
                    .expect("ticker cache lock")
                    .insert(symbol.clone(), update.clone());
                if events.send(MarketEvent::Ticker(update)).await.is_err() {
                    return Err(());
                }
            }
            Ok(false)
        }
        "candle" => {
            let Ok(msg) = serde_json::from_value::<CandleMsg>(envelope.data) else {
                return Ok(true);
            };
            let Ok(interval) = msg.interval.parse::<Interval>() else {
                return Ok(true);
            };
            let Some(close) = msg.close.parse::<f64>().ok() else {
                return Ok(true);
            };
            let key = (msg.coin.clone(), interval);
            let Some(symbols) = plan.candle_map.get(&key) else {
                return Ok(true);
            };

            let interval_ms = interval.as_millis();
            let prior = cursors.lock().expect("cursor lock").get(&key).copied();

            let mut advance_cursor = true;
            match plan_rollover(prior, msg.open_time_ms, interval_ms) {
                Rollover::None => {}
                Rollover::SyntheticClose { open_time_ms, close } => {
                    send_closed(events, symbols, interval, open_time_ms, close).await?;
                }
                Rollover::Backfill { from_ms } => {
                    // Missed boundaries: re-deliver every bar the final
                    // snapshot knows about, oldest first, before the
                    // live event. A bar is closed only once the
                    // server-adjusted clock passed its close boundary.
                    let end = Utc::now().timestamp_millis() + 2_000;
                    match fetch_candle_snapshot(http, &plan.info_url, &msg.coin, interval, from_ms, end).await {
                        Ok(bars) => {
                            let adjusted_now =
                                Utc::now().timestamp_millis() + offset.load(Ordering::Relaxed);
                            for bar in bars {
                                if bar.open_time_ms >= msg.open_time_ms
                                    || bar.open_time_ms + interval_ms > adjusted_now
                                {
                                    continue;
                                }
                                send_closed(events, symbols, interval, bar.open_time_ms, bar.close)
                                    .await?;
                            }
                        }
                        Err(e) => {
                            // Keep the cursor at the gap; the next push
                            // retries the snapshot fetch instead of
                            // losing the missed bars
                            advance_cursor = false;
                            warn!(coin = %msg.coin, error = %e, "Gap backfill failed");
                        }
                    }
                }
            }

            if advance_cursor {
                cursors.lock().expect("cursor lock").insert(
                    key,
                    Cursor {
                        last_open_ms: msg.open_time_ms,
                        last_close: close,
                    },
                );
            }

            for symbol in symbols {
                let kline = Kline {
                    symbol: symbol.clone(),
                    interval,
                    close,
                    is_closed: false,
                    open_time_ms: msg.open_time_ms,
                };
                if events.send(MarketEvent::Kline(kline)).await.is_err() {
                    return Err(());
                }
            }
            Ok(true)
        }
        _ => Ok(false),
    }
}

async fn send_closed(
    events: &EventSender,
    symbols: &[String],
    interval: Interval,
    open_time_ms: i64,
    close: f64,
) -> Result<(), ()> {
    for symbol in symbols {
        let kline = Kline {
            symbol: symbol.clone(),
            interval,
            close,
            is_closed: true,
            open_time_ms,
        };
        if events.send(MarketEvent::Kline(kline)).await.is_err() {
            return Err(());
        }
    }
    Ok(())
}

struct SnapshotBar {
    open_time_ms: i64,
    close: f64,
}

async fn fetch_candle_snapshot(
    http: &reqwest::Client,
    info_url: &str,
    coin: &str,
    interval: Interval,
    start_ms: i64,
    end_ms: i64,
) -> Result<Vec<SnapshotBar>, ProviderError> {
    #[derive(Deserialize)]
    struct RawBar {
        t: i64,
        c: String,
    }

    let body = json!({
        "type": "candleSnapshot",
        "req": {
            "coin": coin,
            "interval": interval.to_string(),
            "startTime": start_ms,
            "endTime": end_ms,
        }
    });
    let raw: Vec<RawBar> = http
        .post(info_url)
        .json(&body)
        .send()
        .await
        .map_err(|e| ProviderError::Api(e.to_string()))?
        .json()
        .await
        .map_err(|e| ProviderError::Parse(e.to_string()))?;

    let mut bars: Vec<SnapshotBar> = raw
        .into_iter()
        .filter_map(|b| {
            b.c.parse::<f64>().ok().map(|close| SnapshotBar {
                open_time_ms: b.t,
                close,
            })
        })
        .collect();
    bars.sort_by_key(|b| b.open_time_ms);
    Ok(bars)
}

fn seed_bar_count(interval: Interval) -> i64 {
    (SEED_LOOKBACK_SECS / interval.as_secs() as i64).clamp(1, SEED_BAR_CAP)
}

/// Estimate the server/local clock offset from the HTTP Date header of
/// a cheap info request. Second resolution is plenty for deciding
/// whether a candle's close boundary has passed.
async fn refresh_clock_offset(http: &reqwest::Client, info_url: &str, offset: &AtomicI64) {
    let before = Utc::now().timestamp_millis();
    let response = match http.post(info_url).json(&json!({"type": "meta"})).send().await {
        Ok(response) => response,
        Err(e) => {
            debug!(error = %e, "Clock offset refresh failed");
            return;
        }
    };
    let Some(date) = response
        .headers()
        .get(reqwest::header::DATE)
        .and_then(|v| v.to_str().ok())
    else {
        return;
    };
    let Ok(server) = DateTime::parse_from_rfc2822(date) else {
        return;
    };
    let midpoint = (before + Utc::now().timestamp_millis()) / 2;
    let new_offset = server.timestamp_millis() - midpoint;
    offset.store(new_offset, Ordering::Relaxed);
    debug!(offset_ms = new_offset, "Server clock offset refreshed");
}
