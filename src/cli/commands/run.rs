//! Run command: watch markets and evaluate alert rules.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use pricewatch_config::load_config;
use pricewatch_core::traits::FanoutSink;
use pricewatch_core::types::{create_event_channel, AlertRule};
use pricewatch_engine::{kline_subscriptions, ticker_symbols, AlertEngine};
use pricewatch_monitor::LoggingSink;
use pricewatch_providers::ProviderChoice;
use tracing::info;

use crate::cli::RunArgs;

pub async fn run(args: RunArgs, config_path: &Path) -> Result<()> {
    let config = load_config(config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    let provider_choice = match args.exchange.as_deref() {
        None => config.provider,
        Some("binance") => ProviderChoice::Binance {
            endpoints: Default::default(),
        },
        Some("hyperliquid") => ProviderChoice::Hyperliquid {
            endpoints: Default::default(),
        },
        Some(other) => bail!("unknown exchange: {other}"),
    };

    let rules_path = args
        .rules
        .or_else(|| config.watch.rules_file.as_deref().map(PathBuf::from));
    let rules = match rules_path {
        Some(path) => load_rules(&path)?,
        None => Vec::new(),
    };

    let (events_tx, events_rx) = create_event_channel(config.engine.channel_capacity);

    let mut fanout = FanoutSink::new();
    fanout.register(Arc::new(LoggingSink::new()));
    let (engine, handle) = AlertEngine::new(events_rx, Arc::new(fanout));
    let engine_task = tokio::spawn(engine.run());

    let provider = provider_choice.build(events_tx);
    info!(provider = provider.name(), "Starting market watch");

    // The rule-derived set plus whatever the config and CLI add.
    let mut symbols = ticker_symbols(&rules);
    for symbol in config.watch.symbols.iter().chain(args.symbols.iter()) {
        if !symbols.contains(symbol) {
            symbols.push(symbol.clone());
        }
    }
    if symbols.is_empty() {
        bail!("nothing to watch: no symbols configured and no rules loaded");
    }

    handle.sync_rules(rules.clone()).await?;
    provider
        .start_ticker(&symbols)
        .await
        .context("starting ticker stream")?;
    let subscriptions = kline_subscriptions(&rules);
    if !subscriptions.is_empty() {
        provider
            .start_klines(&subscriptions)
            .await
            .context("starting kline streams")?;
    }

    // Stand-in for a platform keep-alive resource: log transitions of
    // the background-evaluation signal.
    let mut signal = handle.active_rules_signal();
    tokio::spawn(async move {
        loop {
            let active = *signal.borrow_and_update();
            if active {
                info!("Active rules present, background evaluation held");
            } else {
                info!("No active rules, background evaluation released");
            }
            if signal.changed().await.is_err() {
                break;
            }
        }
    });

    info!(
        symbols = symbols.len(),
        rules = rules.len(),
        klines = subscriptions.len(),
        "Watching; press Ctrl-C to stop"
    );
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    provider.shutdown().await;
    handle.shutdown().await;
    let _ = engine_task.await;
    Ok(())
}

fn load_rules(path: &Path) -> Result<Vec<AlertRule>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading rules from {}", path.display()))?;
    let rules = AlertRule::parse_list(&text)
        .with_context(|| format!("parsing rules from {}", path.display()))?;
    Ok(rules)
}
