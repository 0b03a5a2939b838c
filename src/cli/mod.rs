//! CLI definitions.

pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pricewatch")]
#[command(author, version, about = "Real-time crypto price and indicator alert engine")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Log level
    #[arg(short, long, default_value = "info")]
    pub log_level: LogLevel,

    /// Enable JSON log format
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch markets and evaluate alert rules
    Run(RunArgs),
    /// List supported exchanges
    Providers,
    /// Validate configuration and rules
    ValidateConfig,
}

#[derive(clap::Args)]
pub struct RunArgs {
    /// Extra symbols to watch (comma-separated), on top of the config
    /// and rule-derived set
    #[arg(short = 'S', long, value_delimiter = ',')]
    pub symbols: Vec<String>,

    /// Alert-rule JSON file, overriding the configured one
    #[arg(short, long)]
    pub rules: Option<PathBuf>,

    /// Exchange override (binance, hyperliquid) with default endpoints
    #[arg(short, long)]
    pub exchange: Option<String>,
}
