//! Logging setup and observer sinks.

mod logging;
mod sink;

pub use logging::setup_logging;
pub use sink::LoggingSink;
