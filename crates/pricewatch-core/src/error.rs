//! Error types for the alert engine.

use thiserror::Error;

/// Top-level error for the alert system.
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Market data provider errors.
///
/// All of these are transient from the engine's point of view: providers
/// retry with backoff and never surface them as fatal.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Alert rule configuration errors.
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Invalid rule {id}: {reason}")]
    Invalid { id: String, reason: String },

    #[error("Unparseable target specification: {0}")]
    BadTarget(String),

    #[error("Unknown algorithm: {0}")]
    UnknownAlgo(String),

    #[error("Missing drawing parameter: {0}")]
    MissingParam(&'static str),

    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

/// Result type alias for alert operations.
pub type AlertResult<T> = Result<T, AlertError>;
