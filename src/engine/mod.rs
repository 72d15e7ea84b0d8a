// =============================================================================
// Trading Engine — signal evaluation, sizing, bracket placement, exits
// =============================================================================
//
// Single writer to the in-memory `positions`/`pending` lists and to the
// Trade Store rows backing them. Every other component (coordinator, CLI)
// only reads through the accessor methods below.
// =============================================================================

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::broker::{BrokerAdapter, OrderState};
use crate::context::MarketContext;
use crate::error::EngineError;
use crate::runtime_config::{OptionSelection, OrderManagement, RiskManagement, RuntimeConfig};
use crate::store::TradeStore;
use crate::types::{Direction, ExitReason, OptionContract, Pattern, PendingOrder, Position, Right, Signal};

fn round_tick(price: f64) -> f64 {
    (price / 0.05).round() * 0.05
}

pub struct TradingEngine {
    store: Arc<TradeStore>,
    broker: Arc<dyn BrokerAdapter>,
    context: Arc<MarketContext>,
    positions: RwLock<Vec<Position>>,
    pending: RwLock<Vec<PendingOrder>>,
}

impl TradingEngine {
    pub fn new(store: Arc<TradeStore>, broker: Arc<dyn BrokerAdapter>, context: Arc<MarketContext>) -> Self {
        Self {
            store,
            broker,
            context,
            positions: RwLock::new(Vec::new()),
            pending: RwLock::new(Vec::new()),
        }
    }

    /// Re-hydrate in-memory state from the durable store. Call once at startup.
    pub async fn load_from_store(&self) -> Result<(), EngineError> {
        let positions = self.store.get_open_positions().await?;
        let pending = self.store.get_pending_orders().await?;
        info!(
            open = positions.len(),
            pending = pending.len(),
            "engine state loaded from store"
        );
        *self.positions.write() = positions;
        *self.pending.write() = pending;
        Ok(())
    }

    pub fn open_positions_snapshot(&self) -> Vec<Position> {
        self.positions.read().clone()
    }

    pub fn pending_orders_snapshot(&self) -> Vec<PendingOrder> {
        self.pending.read().clone()
    }

    fn scope_count(&self, strategy_name: &str, symbol: &str) -> usize {
        let open = self
            .positions
            .read()
            .iter()
            .filter(|p| p.strategy_name == strategy_name && p.contract.symbol == symbol)
            .count();
        let pending = self
            .pending
            .read()
            .iter()
            .filter(|p| p.strategy_name == strategy_name && p.contract.symbol == symbol)
            .count();
        open + pending
    }

    // --- signal evaluation -------------------------------------------------

    /// Veto + legacy pattern-rule matching. Returns the approved direction,
    /// or `None` if the signal is rejected or carries no trade.
    pub fn evaluate_signal(&self, sig: &Signal, cfg: &RuntimeConfig) -> Option<Direction> {
        if sig.direction == Direction::NoTrade {
            return None;
        }

        let is_scalping = sig
            .metadata
            .get("strategy_type")
            .and_then(|v| v.as_str())
            == Some("scalping");

        if self.context.vetoes(sig.direction, is_scalping) {
            return None;
        }

        if let Some(pattern) = sig.pattern_name {
            let rule = match pattern {
                Pattern::RejectionAtSupport => Some((
                    Direction::LongCall,
                    cfg.trading_rules.rejection_at_support_min_confidence,
                )),
                Pattern::PotentialBreakoutUp => Some((
                    Direction::LongCall,
                    cfg.trading_rules.potential_breakout_up_min_confidence,
                )),
                Pattern::RejectionAtResistance => Some((
                    Direction::LongPut,
                    cfg.trading_rules.rejection_at_resistance_min_confidence,
                )),
                Pattern::PotentialBreakoutDown => Some((
                    Direction::LongPut,
                    cfg.trading_rules.potential_breakout_down_min_confidence,
                )),
                _ => None,
            };
            if let Some((direction, min_confidence)) = rule {
                return (sig.confidence >= min_confidence).then_some(direction);
            }
        }

        Some(sig.direction)
    }

    /// `account_value × position_size_pct`, scaled by confidence, clamped by
    /// per-trade notional and position-count caps, then capped by the
    /// owning strategy's available budget.
    pub fn size(
        &self,
        price: f64,
        confidence: f64,
        account_value: f64,
        available_budget: Option<f64>,
        risk: &RiskManagement,
    ) -> Option<i64> {
        if price <= 0.0 {
            return None;
        }
        let base_dollars = account_value * risk.position_size_pct;
        let scaled = base_dollars * confidence.clamp(0.1, 1.0);
        let mut contracts = (scaled / (price * 100.0)).floor() as i64;

        let max_by_notional = ((risk.max_position_size / price / 100.0).floor() as i64).max(1);
        contracts = contracts.max(1).min(max_by_notional);
        contracts = contracts.min(risk.max_positions as i64).max(1);

        if let Some(available) = available_budget {
            if available <= 0.0 {
                return None;
            }
            let budget_cap = (available / (price * 100.0)).floor() as i64;
            if budget_cap <= 0 {
                return None;
            }
            contracts = contracts.min(budget_cap);
        }

        (contracts >= 1).then_some(contracts)
    }

    /// Nearest-strike chain probe: first qualified contract across the first
    /// three expirations and first twenty nearest strikes wins.
    #[instrument(skip(self, cfg))]
    pub async fn select_option(
        &self,
        symbol: &str,
        direction: Direction,
        spot: f64,
        cfg: &OptionSelection,
    ) -> anyhow::Result<Option<OptionContract>> {
        let right = direction.right();
        let target_strike = match right {
            Right::Call => spot * cfg.call_strike_pct,
            Right::Put => spot * cfg.put_strike_pct,
        };

        let (strikes, expirations) = self.broker.option_chain(symbol, cfg.min_dte, cfg.max_dte).await?;
        if strikes.is_empty() || expirations.is_empty() {
            return Ok(None);
        }

        let mut ordered_strikes = strikes;
        ordered_strikes.sort_by(|a, b| {
            (a - target_strike)
                .abs()
                .partial_cmp(&(b - target_strike).abs())
                .unwrap()
        });

        for expiry in expirations.iter().take(3) {
            for strike in ordered_strikes.iter().take(20) {
                if let Some(contract) = self.broker.qualify_option(symbol, *expiry, *strike, right).await? {
                    if !contract.local_symbol.is_empty() {
                        return Ok(Some(contract));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Evaluate, size, qualify an option, write the durable row, and place a
    /// bracket order. A no-op if the signal is vetoed, already traded today,
    /// out of scope budget, or can't be sized.
    #[instrument(skip(self, signal, cfg), fields(symbol, strategy_name))]
    pub async fn place_signal(
        &self,
        strategy_name: &str,
        symbol: &str,
        signal: &Signal,
        spot: f64,
        account_value: f64,
        available_budget: Option<f64>,
        cfg: &RuntimeConfig,
    ) -> Result<(), EngineError> {
        let Some(direction) = self.evaluate_signal(signal, cfg) else {
            return Ok(());
        };

        if self.store.has_traded_symbol_today(symbol, strategy_name).await? {
            debug!(symbol, strategy_name, "already traded this symbol today");
            return Ok(());
        }

        if self.scope_count(strategy_name, symbol) >= cfg.risk_management.max_positions as usize {
            debug!(symbol, strategy_name, "strategy scope at max_positions");
            return Ok(());
        }

        let contract = match self.select_option(symbol, direction, spot, &cfg.option_selection).await {
            Ok(Some(c)) => c,
            Ok(None) => {
                warn!(symbol, strategy_name, "no option contract qualified for signal");
                return Ok(());
            }
            Err(e) => return Err(EngineError::Broker(e)),
        };

        let quote = self
            .broker
            .quote(&contract.local_symbol)
            .await
            .map_err(EngineError::Broker)?;
        let Some(quote) = quote else { return Ok(()) };
        let Some(mid) = quote.mid() else { return Ok(()) };
        let entry_price = round_tick(mid);
        if entry_price <= 0.0 {
            return Ok(());
        }

        let Some(quantity) = self.size(entry_price, signal.confidence, account_value, available_budget, &cfg.risk_management) else {
            debug!(symbol, strategy_name, "could not size position within budget");
            return Ok(());
        };

        let stop_loss = round_tick(entry_price * (1.0 - cfg.risk_management.stop_loss_pct));
        let profit_target = round_tick(entry_price * (1.0 + cfg.risk_management.profit_target_pct));

        let order_ref = Uuid::new_v4().to_string();
        let store_id = self
            .store
            .insert_position(
                strategy_name,
                &contract,
                direction,
                &order_ref,
                entry_price,
                quantity,
                stop_loss,
                profit_target,
            )
            .await?;

        match self
            .broker
            .place_bracket(&contract, quantity, entry_price, stop_loss, profit_target, &order_ref)
            .await
        {
            Ok(Some(handles)) => {
                self.store
                    .set_bracket_order_ids(
                        store_id,
                        &handles.entry_order_id,
                        &handles.stop_order_id,
                        &handles.target_order_id,
                    )
                    .await?;
                self.pending.write().push(PendingOrder {
                    store_id,
                    order_ref,
                    strategy_name: strategy_name.to_string(),
                    contract,
                    direction,
                    entry_price,
                    quantity,
                    stop_loss,
                    profit_target,
                    order_time: Utc::now(),
                    entry_order_id: handles.entry_order_id,
                    stop_order_id: handles.stop_order_id,
                    target_order_id: handles.target_order_id,
                });
                info!(symbol, strategy_name, quantity, entry_price, "bracket order placed");
            }
            Ok(None) => {
                self.store.close_position(store_id, 0.0, ExitReason::OrderFailed, None).await?;
                warn!(symbol, strategy_name, "broker rejected bracket placement");
            }
            Err(e) => {
                self.store.close_position(store_id, 0.0, ExitReason::OrderFailed, None).await?;
                return Err(EngineError::Broker(e));
            }
        }

        Ok(())
    }

    /// A `no_trade` signal carrying `exit_reason = "time_decay"` instructs
    /// the engine to close the issuing strategy's open position in this
    /// symbol, mirroring the scalping strategy's own exit decision.
    pub async fn handle_no_trade_signal(
        &self,
        strategy_name: &str,
        symbol: &str,
        signal: &Signal,
    ) -> Result<(), EngineError> {
        if signal.direction != Direction::NoTrade {
            return Ok(());
        }
        if signal.metadata.get("exit_reason").and_then(|v| v.as_str()) != Some("time_decay") {
            return Ok(());
        }

        let target = self
            .positions
            .read()
            .iter()
            .find(|p| p.strategy_name == strategy_name && p.contract.symbol == symbol)
            .cloned();

        if let Some(position) = target {
            let cur = self
                .broker
                .quote(&position.contract.local_symbol)
                .await
                .map_err(EngineError::Broker)?
                .and_then(|q| q.mid())
                .unwrap_or(position.entry_price);
            self.close_position(&position, cur, ExitReason::StopLoss).await?;
        }
        Ok(())
    }

    // --- pending-order reconciliation --------------------------------------

    #[instrument(skip(self, cfg))]
    pub async fn reconcile_pending(&self, cfg: &OrderManagement) -> Result<(), EngineError> {
        let snapshot = self.pending.read().clone();
        for pending in snapshot {
            if let Err(e) = self.reconcile_one(&pending, cfg).await {
                error!(order_ref = %pending.order_ref, error = %e, "failed to reconcile pending order");
            }
        }
        Ok(())
    }

    async fn reconcile_one(&self, pending: &PendingOrder, cfg: &OrderManagement) -> Result<(), EngineError> {
        let status = self
            .broker
            .order_status(&pending.entry_order_id)
            .await
            .map_err(EngineError::Broker)?;

        let Some(status) = status else {
            self.discard_pending(pending, ExitReason::OrderCancelled).await?;
            return Ok(());
        };

        if status.state == OrderState::Filled {
            self.promote_to_position(pending, status.avg_fill_price, status.filled.max(pending.quantity))
                .await?;
            return Ok(());
        }

        if status.state.is_terminal_unfilled() {
            if status.filled > 0 {
                self.promote_to_position(pending, status.avg_fill_price, status.filled).await?;
            } else {
                self.discard_pending(pending, ExitReason::OrderCancelled).await?;
            }
            return Ok(());
        }

        let age_secs = (Utc::now() - pending.order_time).num_seconds();
        if age_secs < cfg.order_timeout_seconds {
            return Ok(());
        }

        if status.filled > 0 {
            let _ = self.broker.cancel(&pending.entry_order_id).await;
            self.promote_to_position(pending, status.avg_fill_price, status.filled).await?;
            return Ok(());
        }

        let mid = self
            .broker
            .quote(&pending.contract.local_symbol)
            .await
            .map_err(EngineError::Broker)?
            .and_then(|q| q.mid());

        match mid {
            Some(mid) => {
                let drift = (mid - pending.entry_price).abs() / pending.entry_price;
                if drift > cfg.price_drift_threshold {
                    self.cancel_bracket(pending).await;
                    self.discard_pending(pending, ExitReason::OrderTimeoutDrift).await?;
                }
            }
            None => {
                self.cancel_bracket(pending).await;
                self.discard_pending(pending, ExitReason::OrderTimeoutNoPrice).await?;
            }
        }
        Ok(())
    }

    async fn cancel_bracket(&self, pending: &PendingOrder) {
        let _ = self.broker.cancel(&pending.entry_order_id).await;
        let _ = self.broker.cancel(&pending.stop_order_id).await;
        let _ = self.broker.cancel(&pending.target_order_id).await;
    }

    async fn discard_pending(&self, pending: &PendingOrder, reason: ExitReason) -> Result<(), EngineError> {
        self.store.discard_pending(pending.store_id, reason).await?;
        self.pending.write().retain(|p| p.order_ref != pending.order_ref);
        info!(order_ref = %pending.order_ref, reason = %reason, "pending order discarded");
        Ok(())
    }

    async fn promote_to_position(&self, pending: &PendingOrder, avg_fill_price: f64, filled: i64) -> Result<(), EngineError> {
        let fill_price = if avg_fill_price > 0.0 { avg_fill_price } else { pending.entry_price };
        let filled_qty = filled.clamp(1, pending.quantity);

        self.store.mark_filled(pending.store_id, fill_price, filled_qty).await?;
        self.store
            .commit_budget(&pending.strategy_name, fill_price * filled_qty as f64 * 100.0)
            .await?;
        self.pending.write().retain(|p| p.order_ref != pending.order_ref);

        self.positions.write().push(Position {
            store_id: pending.store_id,
            order_ref: pending.order_ref.clone(),
            strategy_name: pending.strategy_name.clone(),
            contract: pending.contract.clone(),
            direction: pending.direction,
            entry_price: fill_price,
            quantity: filled_qty,
            stop_loss: pending.stop_loss,
            profit_target: pending.profit_target,
            entry_time: Utc::now(),
            peak_price: fill_price,
            stop_order_id: pending.stop_order_id.clone(),
            target_order_id: pending.target_order_id.clone(),
        });
        info!(order_ref = %pending.order_ref, fill_price, filled_qty, "pending order filled");
        Ok(())
    }

    // --- position exit checks -----------------------------------------------

    #[instrument(skip(self, cfg))]
    pub async fn check_exits(&self, cfg: &RiskManagement) -> Result<(), EngineError> {
        let snapshot = self.positions.read().clone();
        for position in snapshot {
            if let Err(e) = self.check_exit_one(&position, cfg).await {
                error!(order_ref = %position.order_ref, error = %e, "failed to check exit");
            }
        }
        Ok(())
    }

    async fn check_exit_one(&self, position: &Position, cfg: &RiskManagement) -> Result<(), EngineError> {
        let quote = self
            .broker
            .quote(&position.contract.local_symbol)
            .await
            .map_err(EngineError::Broker)?;
        let Some(quote) = quote else { return Ok(()) };
        let Some(cur) = quote.mid() else { return Ok(()) };
        if cur <= 0.0 {
            return Ok(());
        }

        let put_style = position.direction.is_bearish();

        let new_peak = if put_style {
            position.peak_price.min(cur)
        } else {
            position.peak_price.max(cur)
        };
        if (new_peak - position.peak_price).abs() > f64::EPSILON {
            self.store.update_peak(position.store_id, new_peak).await?;
            self.set_in_memory_peak(position.store_id, new_peak);
        }

        let hit_profit = if put_style {
            cur <= position.profit_target
        } else {
            cur >= position.profit_target
        };
        if hit_profit {
            self.close_position(position, cur, ExitReason::ProfitTarget).await?;
            return Ok(());
        }

        let hit_stop = if put_style {
            cur >= position.stop_loss
        } else {
            cur <= position.stop_loss
        };
        if hit_stop {
            self.close_position(position, cur, ExitReason::StopLoss).await?;
            return Ok(());
        }

        if cfg.trailing_stop_enabled {
            let peak_profit_pct = if put_style {
                (position.entry_price - new_peak) / position.entry_price
            } else {
                (new_peak - position.entry_price) / position.entry_price
            };

            if peak_profit_pct >= cfg.trailing_stop_activation_pct {
                let trail = if put_style {
                    new_peak * (1.0 + cfg.trailing_stop_distance_pct)
                } else {
                    new_peak * (1.0 - cfg.trailing_stop_distance_pct)
                };
                let effective_stop = if put_style {
                    position.stop_loss.min(trail)
                } else {
                    position.stop_loss.max(trail)
                };
                let breached = if put_style { cur >= effective_stop } else { cur <= effective_stop };
                if breached {
                    self.close_position(position, cur, ExitReason::TrailingStop).await?;
                    return Ok(());
                }
            }
        }

        let age_days = (Utc::now() - position.entry_time).num_days();
        if age_days >= cfg.max_hold_days {
            self.close_position(position, cur, ExitReason::MaxHold).await?;
        }

        Ok(())
    }

    fn set_in_memory_peak(&self, store_id: i64, peak: f64) {
        if let Some(p) = self.positions.write().iter_mut().find(|p| p.store_id == store_id) {
            p.peak_price = peak;
        }
    }

    async fn close_position(&self, position: &Position, exit_price: f64, reason: ExitReason) -> Result<(), EngineError> {
        self.store.close_position(position.store_id, exit_price, reason, None).await?;
        self.positions.write().retain(|p| p.store_id != position.store_id);
        info!(order_ref = %position.order_ref, exit_price, reason = %reason, "position closed");
        Ok(())
    }

    // --- manual close detection ---------------------------------------------

    /// Compares the engine's open positions against the broker's reported
    /// portfolio. A position the broker no longer shows is assumed closed
    /// out-of-band (e.g. manually in the venue's UI).
    #[instrument(skip(self))]
    pub async fn detect_manual_closes(&self) -> Result<(), EngineError> {
        if !self.broker.connected().await {
            debug!("broker not connected — skipping manual-close detection");
            return Ok(());
        }
        let portfolio = self.broker.portfolio().await.map_err(EngineError::Broker)?;
        let snapshot = self.positions.read().clone();

        for position in snapshot {
            let still_held = portfolio
                .iter()
                .any(|p| p.con_id == position.contract.con_id && p.signed_quantity != 0);
            if !still_held {
                warn!(order_ref = %position.order_ref, "position missing from broker portfolio — manual close");
                self.store
                    .close_position(position.store_id, 0.0, ExitReason::ManualClose, None)
                    .await?;
                self.positions.write().retain(|p| p.store_id != position.store_id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::paper::PaperBroker;
    use crate::runtime_config::RiskManagement;
    use crate::types::{OptionContract, Right};
    use chrono::NaiveDate;

    fn contract() -> OptionContract {
        OptionContract {
            con_id: 1,
            symbol: "AAPL".into(),
            local_symbol: "AAPL 250117C00200000".into(),
            strike: 200.0,
            expiry: NaiveDate::from_ymd_opt(2025, 1, 17).unwrap(),
            right: Right::Call,
        }
    }

    async fn engine_with_store() -> (TradingEngine, Arc<TradeStore>) {
        let store = Arc::new(TradeStore::connect_in_memory().await.unwrap());
        let broker: Arc<dyn BrokerAdapter> = Arc::new(PaperBroker::new(100_000.0));
        let context = Arc::new(MarketContext::new());
        (TradingEngine::new(store.clone(), broker, context), store)
    }

    #[tokio::test]
    async fn sizing_respects_budget_cap() {
        let (engine, _store) = engine_with_store().await;
        let risk = RiskManagement::default();
        let qty = engine.size(2.0, 1.0, 100_000.0, Some(300.0), &risk);
        assert_eq!(qty, Some(1));

        let none = engine.size(2.0, 1.0, 100_000.0, Some(0.0), &risk);
        assert_eq!(none, None);
    }

    #[tokio::test]
    async fn filled_pending_order_becomes_a_position() {
        let (engine, store) = engine_with_store().await;
        store.ensure_budget("swing_aapl", 5_000.0).await.unwrap();

        let contract = contract();
        let order_ref = "ref-engine-1".to_string();
        let store_id = store
            .insert_position("swing_aapl", &contract, Direction::LongCall, &order_ref, 2.0, 5, 1.4, 3.0)
            .await
            .unwrap();
        engine.pending.write().push(PendingOrder {
            store_id,
            order_ref: order_ref.clone(),
            strategy_name: "swing_aapl".into(),
            contract,
            direction: Direction::LongCall,
            entry_price: 2.0,
            quantity: 5,
            stop_loss: 1.4,
            profit_target: 3.0,
            order_time: Utc::now(),
            entry_order_id: "entry-1".into(),
            stop_order_id: "stop-1".into(),
            target_order_id: "target-1".into(),
        });

        engine.promote_to_position(&engine.pending.read()[0].clone(), 2.05, 5).await.unwrap();

        assert!(engine.pending_orders_snapshot().is_empty());
        assert_eq!(engine.open_positions_snapshot().len(), 1);
    }
}
