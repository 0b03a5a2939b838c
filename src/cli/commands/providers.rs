//! List providers command.

use anyhow::Result;

pub async fn run() -> Result<()> {
    println!("Supported Exchanges");
    println!("═══════════════════════════════════════════════════════════");
    println!();
    println!("  binance");
    println!("  ───────────────────────────────────────────────────────");
    println!("  Spot and futures via combined WebSocket streams.");
    println!("  Symbols ending in .P route to the futures endpoints.");
    println!();
    println!("  hyperliquid");
    println!("  ───────────────────────────────────────────────────────");
    println!("  Perp DEX via a single multiplexed WebSocket. Symbols");
    println!("  map down to bare coin names (BTCUSDT.P -> BTC).");
    println!();
    println!("Select with [provider] exchange = \"<name>\" or --exchange.");

    Ok(())
}
