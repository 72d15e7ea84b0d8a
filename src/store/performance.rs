// =============================================================================
// Performance reporting — CSV export, excluding administrative exit reasons
// =============================================================================

use sqlx::Row;

use super::TradeStore;
use crate::error::StoreError;
use crate::types::ExitReason;

#[derive(Debug, Clone, Default)]
pub struct PerformanceSummary {
    pub total_trades: i64,
    pub winners: i64,
    pub losers: i64,
    pub total_pnl: f64,
    pub by_symbol: Vec<(String, f64, i64)>,
    pub by_strategy: Vec<(String, f64, i64)>,
    pub by_day: Vec<(String, f64, f64)>,
}

fn is_administrative(reason: &str) -> bool {
    matches!(reason, "manual_close" | "reconciliation_not_found")
}

impl TradeStore {
    /// Export all trade history rows to CSV text, excluding administrative
    /// exit reasons unless `include_administrative` is set.
    pub async fn export_trades_to_csv(
        &self,
        include_administrative: bool,
    ) -> Result<String, StoreError> {
        let rows = sqlx::query("SELECT * FROM trade_history ORDER BY exit_time ASC")
            .fetch_all(self.pool())
            .await?;

        let mut out = String::from(
            "order_ref,strategy,symbol,direction,entry_price,exit_price,quantity,entry_time,exit_time,exit_reason,pnl_dollars,pnl_pct\n",
        );
        for row in &rows {
            let reason: String = row.get("exit_reason");
            if !include_administrative && is_administrative(&reason) {
                continue;
            }
            out.push_str(&format!(
                "{},{},{},{},{:.2},{:.2},{},{},{},{},{:.2},{:.4}\n",
                row.get::<String, _>("order_ref"),
                row.get::<String, _>("strategy_name"),
                row.get::<String, _>("symbol"),
                row.get::<String, _>("direction"),
                row.get::<f64, _>("entry_price"),
                row.get::<f64, _>("exit_price"),
                row.get::<i64, _>("quantity"),
                row.get::<String, _>("entry_time"),
                row.get::<String, _>("exit_time"),
                reason,
                row.get::<f64, _>("pnl_dollars"),
                row.get::<f64, _>("pnl_pct"),
            ));
        }
        Ok(out)
    }

    pub async fn export_performance_report(
        &self,
        include_administrative: bool,
    ) -> Result<PerformanceSummary, StoreError> {
        let exclude_clause = if include_administrative {
            ""
        } else {
            "WHERE exit_reason NOT IN ('manual_close', 'reconciliation_not_found')"
        };

        let rows = sqlx::query(&format!(
            "SELECT * FROM trade_history {exclude_clause} ORDER BY exit_time ASC"
        ))
        .fetch_all(self.pool())
        .await?;

        let mut summary = PerformanceSummary::default();
        let mut by_symbol: std::collections::HashMap<String, (f64, i64)> = Default::default();
        let mut by_strategy: std::collections::HashMap<String, (f64, i64)> = Default::default();
        let mut by_day: std::collections::HashMap<String, f64> = Default::default();

        for row in &rows {
            let pnl: f64 = row.get("pnl_dollars");
            summary.total_trades += 1;
            summary.total_pnl += pnl;
            if pnl > 0.0 {
                summary.winners += 1;
            } else if pnl < 0.0 {
                summary.losers += 1;
            }

            let symbol: String = row.get("symbol");
            let entry = by_symbol.entry(symbol).or_insert((0.0, 0));
            entry.0 += pnl;
            entry.1 += 1;

            let strategy: String = row.get("strategy_name");
            let entry = by_strategy.entry(strategy).or_insert((0.0, 0));
            entry.0 += pnl;
            entry.1 += 1;

            let exit_time: String = row.get("exit_time");
            let day = exit_time.get(0..10).unwrap_or(&exit_time).to_string();
            *by_day.entry(day).or_insert(0.0) += pnl;
        }

        summary.by_symbol = by_symbol.into_iter().map(|(k, (p, c))| (k, p, c)).collect();
        summary.by_strategy = by_strategy.into_iter().map(|(k, (p, c))| (k, p, c)).collect();

        let mut cumulative = 0.0;
        let mut days: Vec<_> = by_day.into_iter().collect();
        days.sort_by(|a, b| a.0.cmp(&b.0));
        for (day, pnl) in days {
            cumulative += pnl;
            summary.by_day.push((day, pnl, cumulative));
        }

        Ok(summary)
    }
}

/// An exit reason not excluded from performance figures by default.
pub fn is_performance_eligible(reason: ExitReason) -> bool {
    !reason.is_administrative()
}
