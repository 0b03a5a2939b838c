//! Configuration management.

mod settings;

pub use settings::{AppConfig, AppSettings, EngineSettings, LoggingConfig, WatchSettings};

use config::{Config, ConfigError, Environment, File};
use std::path::Path;

/// Load configuration from file and environment.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::from(path).required(true))
        .add_source(
            Environment::with_prefix("PRICEWATCH")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.name, "pricewatch");
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.provider.name(), "binance");
        assert_eq!(cfg.engine.channel_capacity, 1024);
        assert!(cfg.watch.symbols.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let text = r#"
            [app]
            name = "pricewatch"
            environment = "production"

            [logging]
            level = "debug"
            format = "json"

            [provider]
            exchange = "hyperliquid"

            [engine]
            channel_capacity = 256

            [watch]
            symbols = ["BTCUSDT", "ETHUSDT.P"]
            rules_file = "rules.json"
        "#;
        let cfg: AppConfig = toml::from_str(text).expect("parse");
        assert_eq!(cfg.app.environment, "production");
        assert_eq!(cfg.logging.format, "json");
        assert_eq!(cfg.provider.name(), "hyperliquid");
        assert_eq!(cfg.engine.channel_capacity, 256);
        assert_eq!(cfg.watch.symbols.len(), 2);
        assert_eq!(cfg.watch.rules_file.as_deref(), Some("rules.json"));
    }
}
