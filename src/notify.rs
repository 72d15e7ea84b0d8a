// =============================================================================
// Notifications — pluggable sink for trade/lifecycle events
// =============================================================================
//
// A seam for routing fills, exits, and errors to an external channel
// (Discord webhook, email, etc.) without coupling the engine to any one
// transport. `LogOnlySink` is the default and the only implementation
// shipped: it simply re-emits the event as a structured log line.
// =============================================================================

use tracing::info;

use crate::types::{ExitReason, TradeHistoryEntry};

pub trait NotificationSink: Send + Sync {
    fn position_opened(&self, strategy_name: &str, symbol: &str, quantity: i64, entry_price: f64);
    fn position_closed(&self, trade: &TradeHistoryEntry);
    fn error(&self, context: &str, message: &str);
}

/// Default sink: structured log lines only, no outbound network calls.
pub struct LogOnlySink;

impl NotificationSink for LogOnlySink {
    fn position_opened(&self, strategy_name: &str, symbol: &str, quantity: i64, entry_price: f64) {
        info!(strategy_name, symbol, quantity, entry_price, "position opened");
    }

    fn position_closed(&self, trade: &TradeHistoryEntry) {
        info!(
            strategy_name = %trade.strategy_name,
            symbol = %trade.symbol,
            exit_reason = %trade.exit_reason,
            pnl_dollars = trade.pnl_dollars,
            pnl_pct = trade.pnl_pct,
            administrative = trade.exit_reason.is_administrative(),
            "position closed"
        );
    }

    fn error(&self, context: &str, message: &str) {
        tracing::error!(context, message, "engine error");
    }
}

/// Whether a close reason should ever be notified loudly (vs just logged).
pub fn is_notable(reason: ExitReason) -> bool {
    !reason.is_administrative()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn administrative_reasons_are_not_notable() {
        assert!(!is_notable(ExitReason::ManualClose));
        assert!(!is_notable(ExitReason::ReconciliationNotFound));
        assert!(is_notable(ExitReason::ProfitTarget));
    }
}
