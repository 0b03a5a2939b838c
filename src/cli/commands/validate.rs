//! Validate configuration command.

use anyhow::{Context, Result};
use pricewatch_config::load_config;
use pricewatch_core::types::AlertRule;
use std::path::Path;

pub async fn run(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {:?}", config_path);

    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("Configuration error: {}", e);
            return Err(e.into());
        }
    };

    println!("Configuration is valid!");
    println!();
    println!("App: {}", config.app.name);
    println!("Environment: {}", config.app.environment);
    println!("Log level: {}", config.logging.level);
    println!("Provider: {}", config.provider.name());
    println!("Channel capacity: {}", config.engine.channel_capacity);
    println!("Watched symbols: {}", config.watch.symbols.len());

    if let Some(path) = &config.watch.rules_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading rules from {path}"))?;
        match AlertRule::parse_list(&text) {
            Ok(rules) => {
                let active = rules.iter().filter(|r| r.active).count();
                println!("Rules: {} ({} active)", rules.len(), active);
            }
            Err(e) => {
                println!("Rules error: {}", e);
                return Err(e.into());
            }
        }
    } else {
        println!("Rules: none configured");
    }

    Ok(())
}
