//! Core data types.

mod interval;
mod market;
mod rule;

pub use interval::Interval;
pub use market::{
    create_event_channel, ClosedCandle, Direction, EventReceiver, EventSender, Kline, MarketEvent,
    Subscription, TickerUpdate, Trigger,
};
pub use rule::{
    AlertActions, AlertRule, Condition, ConfirmationMode, RepeatMode, TargetType, VibrationKind,
};

/// Suffix marking a derivative (perpetual) instrument in a symbol name.
pub const PERP_SUFFIX: &str = ".P";

/// Check whether a symbol names a derivative instrument.
pub fn is_perp_symbol(symbol: &str) -> bool {
    symbol.ends_with(PERP_SUFFIX)
}

/// Strip the derivative suffix, returning the plain instrument name.
pub fn strip_perp_suffix(symbol: &str) -> &str {
    symbol.strip_suffix(PERP_SUFFIX).unwrap_or(symbol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perp_suffix() {
        assert!(is_perp_symbol("BTCUSDT.P"));
        assert!(!is_perp_symbol("BTCUSDT"));
        assert_eq!(strip_perp_suffix("BTCUSDT.P"), "BTCUSDT");
        assert_eq!(strip_perp_suffix("ETHUSDT"), "ETHUSDT");
    }
}
