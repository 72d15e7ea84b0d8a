// =============================================================================
// Trade Store — durable SQL-backed state (positions, history, budgets, bars)
// =============================================================================
//
// Every mutation commits before control returns to the caller; `close_position`
// performs the move from `positions` to `trade_history` plus the owning
// strategy's budget release in a single transaction so a crash between steps
// can never leave the store half-updated.
// =============================================================================

pub mod performance;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::error::StoreError;
use crate::types::{
    Bar, Direction, ExitReason, OptionContract, PendingOrder, Position, Right, StrategyBudget,
    TradeHistoryEntry,
};

pub struct TradeStore {
    pool: SqlitePool,
}

impl TradeStore {
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn direction_to_str(d: Direction) -> String {
    d.to_string()
}

fn direction_from_str(s: &str) -> Direction {
    match s {
        "long_call" => Direction::LongCall,
        "long_put" => Direction::LongPut,
        "bull_put_spread" => Direction::BullPutSpread,
        "bear_put_spread" => Direction::BearPutSpread,
        "long_put_straight" => Direction::LongPutStraight,
        "iron_condor" => Direction::IronCondor,
        _ => Direction::NoTrade,
    }
}

fn reason_to_str(r: ExitReason) -> String {
    r.to_string()
}

fn reason_from_str(s: &str) -> ExitReason {
    match s {
        "profit_target" => ExitReason::ProfitTarget,
        "stop_loss" => ExitReason::StopLoss,
        "trailing_stop" => ExitReason::TrailingStop,
        "max_hold" => ExitReason::MaxHold,
        "manual_close" => ExitReason::ManualClose,
        "reconciliation_not_found" => ExitReason::ReconciliationNotFound,
        "order_cancelled" => ExitReason::OrderCancelled,
        "order_timeout_drift" => ExitReason::OrderTimeoutDrift,
        "order_timeout_no_price" => ExitReason::OrderTimeoutNoPrice,
        "order_no_fills" => ExitReason::OrderNoFills,
        _ => ExitReason::OrderFailed,
    }
}

impl TradeStore {
    pub async fn connect(path: &str) -> Result<Self, StoreError> {
        let url = format!("sqlite://{path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await?;
        sqlx::query("PRAGMA journal_mode=WAL;").execute(&pool).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn connect_in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    // --- positions -----------------------------------------------------

    pub async fn insert_position(
        &self,
        strategy_name: &str,
        contract: &OptionContract,
        direction: Direction,
        order_ref: &str,
        entry_price: f64,
        quantity: i64,
        stop_loss: f64,
        profit_target: f64,
    ) -> Result<i64, StoreError> {
        let now = Utc::now();
        let rec = sqlx::query(
            r#"INSERT INTO positions
               (order_ref, strategy_name, symbol, con_id, local_symbol, strike, expiry, right,
                direction, status, entry_price, quantity, stop_loss, profit_target, peak_price,
                entry_time)
               VALUES (?,?,?,?,?,?,?,?,?,'pending_fill',?,?,?,?,?,?)"#,
        )
        .bind(order_ref)
        .bind(strategy_name)
        .bind(&contract.symbol)
        .bind(contract.con_id)
        .bind(&contract.local_symbol)
        .bind(contract.strike)
        .bind(contract.expiry.to_string())
        .bind(contract.right.to_string())
        .bind(direction_to_str(direction))
        .bind(entry_price)
        .bind(quantity)
        .bind(stop_loss)
        .bind(profit_target)
        .bind(entry_price)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(rec.last_insert_rowid())
    }

    pub async fn set_entry_order_id(&self, store_id: i64, order_id: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE positions SET entry_order_id = ? WHERE id = ?")
            .bind(order_id)
            .bind(store_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_bracket_order_ids(
        &self,
        store_id: i64,
        entry_id: &str,
        stop_id: &str,
        target_id: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE positions SET entry_order_id = ?, stop_order_id = ?, target_order_id = ? WHERE id = ?",
        )
        .bind(entry_id)
        .bind(stop_id)
        .bind(target_id)
        .bind(store_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Promote a pending_fill row to `open`, rewriting the fill price/qty.
    pub async fn mark_filled(
        &self,
        store_id: i64,
        fill_price: f64,
        filled_qty: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE positions SET status = 'open', entry_price = ?, quantity = ?, peak_price = ? WHERE id = ?",
        )
        .bind(fill_price)
        .bind(filled_qty)
        .bind(fill_price)
        .bind(store_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_peak(&self, store_id: i64, peak_price: f64) -> Result<(), StoreError> {
        sqlx::query("UPDATE positions SET peak_price = ? WHERE id = ?")
            .bind(peak_price)
            .bind(store_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_open_positions(&self) -> Result<Vec<Position>, StoreError> {
        let rows = sqlx::query("SELECT * FROM positions WHERE status = 'open'")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_position).collect()
    }

    pub async fn get_pending_orders(&self) -> Result<Vec<PendingOrder>, StoreError> {
        let rows = sqlx::query("SELECT * FROM positions WHERE status = 'pending_fill'")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_pending).collect()
    }

    /// Remove a pending_fill row without ever realizing it as a trade,
    /// e.g. when it is cancelled with zero fills.
    pub async fn discard_pending(&self, store_id: i64, reason: ExitReason) -> Result<(), StoreError> {
        let now = Utc::now();
        let row = sqlx::query("SELECT * FROM positions WHERE id = ?")
            .bind(store_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::PositionNotFound(store_id))?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"INSERT INTO trade_history
               (order_ref, strategy_name, symbol, direction, entry_price, exit_price, quantity,
                entry_time, exit_time, exit_reason, exit_order_id, pnl_dollars, pnl_pct)
               VALUES (?,?,?,?,?,0,?,?,?,?,NULL,0,0)"#,
        )
        .bind(row.get::<String, _>("order_ref"))
        .bind(row.get::<String, _>("strategy_name"))
        .bind(row.get::<String, _>("symbol"))
        .bind(row.get::<String, _>("direction"))
        .bind(row.get::<f64, _>("entry_price"))
        .bind(row.get::<i64, _>("quantity"))
        .bind(row.get::<String, _>("entry_time"))
        .bind(now.to_rfc3339())
        .bind(reason_to_str(reason))
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM positions WHERE id = ?")
            .bind(store_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Close an open (or pending) position: move it to `trade_history` and
    /// release its committed budget, in one transaction.
    pub async fn close_position(
        &self,
        store_id: i64,
        exit_price: f64,
        reason: ExitReason,
        exit_order_id: Option<&str>,
    ) -> Result<TradeHistoryEntry, StoreError> {
        let row = sqlx::query("SELECT * FROM positions WHERE id = ?")
            .bind(store_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::PositionNotFound(store_id))?;

        let position = row_to_position_loose(&row)?;
        let now = Utc::now();
        let committed = position.entry_price * position.quantity as f64 * 100.0;
        let exit_value = exit_price.max(0.0) * position.quantity as f64 * 100.0;
        let pnl_dollars = exit_value - committed;
        let pnl_pct = if position.entry_price > 0.0 {
            (exit_price - position.entry_price) / position.entry_price
        } else {
            0.0
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO trade_history
               (order_ref, strategy_name, symbol, direction, entry_price, exit_price, quantity,
                entry_time, exit_time, exit_reason, exit_order_id, pnl_dollars, pnl_pct)
               VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?)"#,
        )
        .bind(&position.order_ref)
        .bind(&position.strategy_name)
        .bind(&position.contract.symbol)
        .bind(direction_to_str(position.direction))
        .bind(position.entry_price)
        .bind(exit_price)
        .bind(position.quantity)
        .bind(position.entry_time.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(reason_to_str(reason))
        .bind(exit_order_id)
        .bind(pnl_dollars)
        .bind(pnl_pct)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM positions WHERE id = ?")
            .bind(store_id)
            .execute(&mut *tx)
            .await?;

        release_budget_tx(&mut tx, &position.strategy_name, committed, exit_value).await?;

        tx.commit().await?;

        Ok(TradeHistoryEntry {
            store_id,
            order_ref: position.order_ref,
            strategy_name: position.strategy_name,
            symbol: position.contract.symbol,
            direction: position.direction,
            entry_price: position.entry_price,
            exit_price,
            quantity: position.quantity,
            entry_time: position.entry_time,
            exit_time: now,
            exit_reason: reason,
            exit_order_id: exit_order_id.map(str::to_string),
            pnl_dollars,
            pnl_pct,
        })
    }

    pub async fn has_traded_symbol_today(
        &self,
        symbol: &str,
        strategy: &str,
    ) -> Result<bool, StoreError> {
        let today = Utc::now().date_naive().to_string();
        let open: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM positions WHERE symbol = ? AND strategy_name = ? AND substr(entry_time,1,10) = ?",
        )
        .bind(symbol)
        .bind(strategy)
        .bind(&today)
        .fetch_one(&self.pool)
        .await?;
        if open > 0 {
            return Ok(true);
        }
        let closed: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM trade_history WHERE symbol = ? AND strategy_name = ? AND substr(entry_time,1,10) = ?",
        )
        .bind(symbol)
        .bind(strategy)
        .bind(&today)
        .fetch_one(&self.pool)
        .await?;
        Ok(closed > 0)
    }

    // --- budgets ---------------------------------------------------------

    pub async fn ensure_budget(&self, strategy: &str, budget: f64) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO strategy_budgets (strategy_name, budget, drawdown, committed) VALUES (?,?,0,0)
             ON CONFLICT(strategy_name) DO UPDATE SET budget = excluded.budget",
        )
        .bind(strategy)
        .bind(budget)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_budget(&self, strategy: &str) -> Result<Option<StrategyBudget>, StoreError> {
        let row = sqlx::query("SELECT budget, drawdown, committed FROM strategy_budgets WHERE strategy_name = ?")
            .bind(strategy)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| StrategyBudget {
            budget: r.get("budget"),
            drawdown: r.get("drawdown"),
            committed: r.get("committed"),
        }))
    }

    pub async fn commit_budget(&self, strategy: &str, amount: f64) -> Result<(), StoreError> {
        sqlx::query("UPDATE strategy_budgets SET committed = committed + ? WHERE strategy_name = ?")
            .bind(amount)
            .bind(strategy)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn recalculate_budget_from_history(
        &self,
        strategy: &str,
        cap: f64,
    ) -> Result<(), StoreError> {
        let rows = sqlx::query(
            "SELECT pnl_dollars, exit_reason FROM trade_history WHERE strategy_name = ? ORDER BY entry_time ASC",
        )
        .bind(strategy)
        .fetch_all(&self.pool)
        .await?;

        let mut drawdown = 0.0_f64;
        for row in &rows {
            let reason = reason_from_str(row.get::<String, _>("exit_reason").as_str());
            if reason.is_administrative() {
                continue;
            }
            let pnl: f64 = row.get("pnl_dollars");
            if pnl < 0.0 {
                drawdown += -pnl;
            } else {
                drawdown = (drawdown - pnl).max(0.0);
            }
        }

        let committed: f64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(entry_price * quantity * 100.0), 0) FROM positions WHERE strategy_name = ?",
        )
        .bind(strategy)
        .fetch_one(&self.pool)
        .await?;

        sqlx::query(
            "INSERT INTO strategy_budgets (strategy_name, budget, drawdown, committed) VALUES (?,?,?,?)
             ON CONFLICT(strategy_name) DO UPDATE SET drawdown = excluded.drawdown, committed = excluded.committed",
        )
        .bind(strategy)
        .bind(cap)
        .bind(drawdown)
        .bind(committed)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_consecutive_losses(&self, strategy: Option<&str>) -> Result<u32, StoreError> {
        let rows = if let Some(s) = strategy {
            sqlx::query("SELECT pnl_dollars, exit_reason FROM trade_history WHERE strategy_name = ? ORDER BY exit_time DESC")
                .bind(s)
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query("SELECT pnl_dollars, exit_reason FROM trade_history ORDER BY exit_time DESC")
                .fetch_all(&self.pool)
                .await?
        };

        let mut count = 0;
        for row in &rows {
            let reason = reason_from_str(row.get::<String, _>("exit_reason").as_str());
            if reason.is_administrative() {
                continue;
            }
            let pnl: f64 = row.get("pnl_dollars");
            if pnl < 0.0 {
                count += 1;
            } else {
                break;
            }
        }
        Ok(count)
    }

    /// Sum of realized P&L for trades whose `exit_time` falls on `day`
    /// (UTC), excluding administrative closes. Used by the daily-loss gate.
    pub async fn get_daily_pnl(&self, day: chrono::NaiveDate) -> Result<f64, StoreError> {
        let prefix = day.format("%Y-%m-%d").to_string();
        let rows = sqlx::query("SELECT pnl_dollars, exit_reason, exit_time FROM trade_history WHERE exit_time LIKE ?")
            .bind(format!("{prefix}%"))
            .fetch_all(&self.pool)
            .await?;

        let mut total = 0.0;
        for row in &rows {
            let reason = reason_from_str(row.get::<String, _>("exit_reason").as_str());
            if reason.is_administrative() {
                continue;
            }
            total += row.get::<f64, _>("pnl_dollars");
        }
        Ok(total)
    }

    // --- historical bar cache ---------------------------------------------

    pub async fn put_bars(&self, symbol: &str, bar_size: &str, bars: &[Bar]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM historical_bars WHERE symbol = ? AND bar_size = ?")
            .bind(symbol)
            .bind(bar_size)
            .execute(&mut *tx)
            .await?;
        let fetched_at = Utc::now().to_rfc3339();
        for bar in bars {
            sqlx::query(
                r#"INSERT INTO historical_bars
                   (symbol, bar_size, timestamp, open, high, low, close, volume, fetched_at)
                   VALUES (?,?,?,?,?,?,?,?,?)"#,
            )
            .bind(symbol)
            .bind(bar_size)
            .bind(bar.timestamp.to_rfc3339())
            .bind(bar.open)
            .bind(bar.high)
            .bind(bar.low)
            .bind(bar.close)
            .bind(bar.volume)
            .bind(&fetched_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_bars(
        &self,
        symbol: &str,
        bar_size: &str,
        max_age: chrono::Duration,
    ) -> Result<Option<Vec<Bar>>, StoreError> {
        let newest: Option<String> = sqlx::query_scalar(
            "SELECT MAX(fetched_at) FROM historical_bars WHERE symbol = ? AND bar_size = ?",
        )
        .bind(symbol)
        .bind(bar_size)
        .fetch_one(&self.pool)
        .await?;

        let Some(newest) = newest else { return Ok(None) };
        let newest: DateTime<Utc> = newest.parse().unwrap_or_else(|_| Utc::now());
        if Utc::now() - newest > max_age {
            return Ok(None);
        }

        let rows = sqlx::query(
            "SELECT * FROM historical_bars WHERE symbol = ? AND bar_size = ? ORDER BY timestamp ASC",
        )
        .bind(symbol)
        .bind(bar_size)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(
            rows.iter()
                .map(|r| Bar {
                    timestamp: r
                        .get::<String, _>("timestamp")
                        .parse()
                        .unwrap_or_else(|_| Utc::now()),
                    open: r.get("open"),
                    high: r.get("high"),
                    low: r.get("low"),
                    close: r.get("close"),
                    volume: r.get("volume"),
                })
                .collect(),
        ))
    }
}

async fn release_budget_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    strategy: &str,
    committed_amount: f64,
    exit_value: f64,
) -> Result<(), StoreError> {
    let delta = exit_value - committed_amount;
    sqlx::query(
        "UPDATE strategy_budgets SET
            committed = MAX(0, committed - ?),
            drawdown = MAX(0, drawdown - ?)
         WHERE strategy_name = ?",
    )
    .bind(committed_amount)
    .bind(delta.max(0.0))
    .bind(strategy)
    .execute(&mut **tx)
    .await?;

    // A loss (delta < 0) grows drawdown by |delta|.
    if delta < 0.0 {
        sqlx::query("UPDATE strategy_budgets SET drawdown = drawdown + ? WHERE strategy_name = ?")
            .bind(-delta)
            .bind(strategy)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

fn row_to_position(row: &sqlx::sqlite::SqliteRow) -> Result<Position, StoreError> {
    row_to_position_loose(row)
}

fn row_to_position_loose(row: &sqlx::sqlite::SqliteRow) -> Result<Position, StoreError> {
    let right_str: String = row.get("right");
    let right = if right_str == "C" { Right::Call } else { Right::Put };
    let expiry: String = row.get("expiry");
    let entry_time: String = row.get("entry_time");

    Ok(Position {
        store_id: row.get("id"),
        order_ref: row.get("order_ref"),
        strategy_name: row.get("strategy_name"),
        contract: OptionContract {
            con_id: row.get("con_id"),
            symbol: row.get("symbol"),
            local_symbol: row.get("local_symbol"),
            strike: row.get("strike"),
            expiry: expiry.parse().unwrap_or_else(|_| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()),
            right,
        },
        direction: direction_from_str(&row.get::<String, _>("direction")),
        entry_price: row.get("entry_price"),
        quantity: row.get("quantity"),
        stop_loss: row.get("stop_loss"),
        profit_target: row.get("profit_target"),
        entry_time: entry_time.parse().unwrap_or_else(|_| Utc::now()),
        peak_price: row.get("peak_price"),
        stop_order_id: row.get("stop_order_id"),
        target_order_id: row.get("target_order_id"),
    })
}

fn row_to_pending(row: &sqlx::sqlite::SqliteRow) -> Result<PendingOrder, StoreError> {
    let right_str: String = row.get("right");
    let right = if right_str == "C" { Right::Call } else { Right::Put };
    let expiry: String = row.get("expiry");
    let order_time: String = row.get("entry_time");

    Ok(PendingOrder {
        store_id: row.get("id"),
        order_ref: row.get("order_ref"),
        strategy_name: row.get("strategy_name"),
        contract: OptionContract {
            con_id: row.get("con_id"),
            symbol: row.get("symbol"),
            local_symbol: row.get("local_symbol"),
            strike: row.get("strike"),
            expiry: expiry.parse().unwrap_or_else(|_| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()),
            right,
        },
        direction: direction_from_str(&row.get::<String, _>("direction")),
        entry_price: row.get("entry_price"),
        quantity: row.get("quantity"),
        stop_loss: row.get("stop_loss"),
        profit_target: row.get("profit_target"),
        order_time: order_time.parse().unwrap_or_else(|_| Utc::now()),
        entry_order_id: row.get("entry_order_id"),
        stop_order_id: row.get("stop_order_id"),
        target_order_id: row.get("target_order_id"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn test_contract() -> OptionContract {
        OptionContract {
            con_id: 1,
            symbol: "AAPL".into(),
            local_symbol: "AAPL 250117C00200000".into(),
            strike: 200.0,
            expiry: NaiveDate::from_ymd_opt(2025, 1, 17).unwrap(),
            right: Right::Call,
        }
    }

    #[tokio::test]
    async fn insert_and_close_position_releases_budget() {
        let store = TradeStore::connect_in_memory().await.unwrap();
        store.ensure_budget("swing_aapl", 5_000.0).await.unwrap();

        let id = store
            .insert_position(
                "swing_aapl",
                &test_contract(),
                Direction::LongCall,
                "ref-1",
                2.0,
                10,
                1.4,
                3.0,
            )
            .await
            .unwrap();
        store.mark_filled(id, 2.0, 10).await.unwrap();
        store.commit_budget("swing_aapl", 2_000.0).await.unwrap();

        let entry = store
            .close_position(id, 3.05, ExitReason::ProfitTarget, Some("exit-1"))
            .await
            .unwrap();

        assert!((entry.pnl_dollars - 1_050.0).abs() < 1e-6);

        let budget = store.get_budget("swing_aapl").await.unwrap().unwrap();
        assert!((budget.committed - 0.0).abs() < 1e-6);
        assert!((budget.drawdown - 0.0).abs() < 1e-6);
        assert!((budget.available() - 5_000.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn losing_trade_increases_drawdown() {
        let store = TradeStore::connect_in_memory().await.unwrap();
        store.ensure_budget("swing_aapl", 5_000.0).await.unwrap();
        let id = store
            .insert_position("swing_aapl", &test_contract(), Direction::LongCall, "ref-2", 2.0, 10, 1.4, 3.0)
            .await
            .unwrap();
        store.mark_filled(id, 2.0, 10).await.unwrap();
        store.commit_budget("swing_aapl", 2_000.0).await.unwrap();

        store
            .close_position(id, 1.4, ExitReason::StopLoss, Some("exit-2"))
            .await
            .unwrap();

        let budget = store.get_budget("swing_aapl").await.unwrap().unwrap();
        assert!((budget.drawdown - 600.0).abs() < 1e-6);
        assert!((budget.committed - 0.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn has_traded_symbol_today_detects_open_position() {
        let store = TradeStore::connect_in_memory().await.unwrap();
        store.ensure_budget("swing_aapl", 5_000.0).await.unwrap();
        store
            .insert_position("swing_aapl", &test_contract(), Direction::LongCall, "ref-3", 2.0, 10, 1.4, 3.0)
            .await
            .unwrap();

        assert!(store.has_traded_symbol_today("AAPL", "swing_aapl").await.unwrap());
        assert!(!store.has_traded_symbol_today("MSFT", "swing_aapl").await.unwrap());
    }

    #[tokio::test]
    async fn consecutive_losses_excludes_manual_close() {
        let store = TradeStore::connect_in_memory().await.unwrap();
        store.ensure_budget("s", 5_000.0).await.unwrap();

        for (i, reason) in [
            (ExitReason::StopLoss, ()),
            (ExitReason::ManualClose, ()),
            (ExitReason::StopLoss, ()),
        ]
        .into_iter()
        .enumerate()
        {
            let id = store
                .insert_position("s", &test_contract(), Direction::LongCall, &format!("r{i}"), 2.0, 1, 1.4, 3.0)
                .await
                .unwrap();
            store.mark_filled(id, 2.0, 1).await.unwrap();
            store.commit_budget("s", 200.0).await.unwrap();
            store.close_position(id, 1.4, reason.0, None).await.unwrap();
        }

        // Two true stop_loss trades in a row once manual_close is skipped.
        assert_eq!(store.get_consecutive_losses(Some("s")).await.unwrap(), 2);
    }
}
