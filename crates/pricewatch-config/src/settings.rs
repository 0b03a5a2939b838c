//! Configuration structures.

use pricewatch_providers::ProviderChoice;
use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub provider: ProviderChoice,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub watch: WatchSettings,
}

/// General app settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    pub name: String,
    pub environment: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: "pricewatch".to_string(),
            environment: "development".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file: None,
        }
    }
}

/// Evaluation engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Market-event channel capacity before providers block.
    pub channel_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// What the process watches at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchSettings {
    /// Symbols given live ticker subscriptions even without rules.
    pub symbols: Vec<String>,
    /// Path to the alert-rule JSON list.
    pub rules_file: Option<String>,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            rules_file: None,
        }
    }
}
