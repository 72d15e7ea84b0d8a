// =============================================================================
// Scalping strategy — order-book imbalance entry/exit with time-decay
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::runtime_config::StrategyInstanceConfig;
use crate::types::{Direction, Signal};

use super::{Strategy, StrategyContext, StrategyError};

const ENTRY_THRESHOLD: f64 = 0.7;
const EXIT_THRESHOLD: f64 = 0.7;
const MIN_PROGRESS_PCT: f64 = 0.001;
const MAX_TICKS_WITHOUT_PROGRESS: u32 = 5;

struct ScalpingParams {
    entry_threshold: f64,
    exit_threshold: f64,
    min_progress_pct: f64,
    max_ticks_without_progress: u32,
}

impl ScalpingParams {
    fn from_instance(instance_cfg: &StrategyInstanceConfig) -> Self {
        let param = |key: &str, default: f64| instance_cfg.params.get(key).and_then(|v| v.as_f64()).unwrap_or(default);
        Self {
            entry_threshold: param("entry_threshold", ENTRY_THRESHOLD),
            exit_threshold: param("exit_threshold", EXIT_THRESHOLD),
            min_progress_pct: param("min_progress_pct", MIN_PROGRESS_PCT),
            max_ticks_without_progress: instance_cfg
                .params
                .get("max_ticks_without_progress")
                .and_then(|v| v.as_u64())
                .map(|v| v as u32)
                .unwrap_or(MAX_TICKS_WITHOUT_PROGRESS),
        }
    }
}

#[derive(Clone, Copy)]
struct ScalpPosition {
    entry_tick: u32,
    entry_price: f64,
    direction: Direction,
}

pub struct ScalpingStrategy {
    tick: RwLock<u32>,
    open: RwLock<HashMap<String, ScalpPosition>>,
}

impl ScalpingStrategy {
    pub fn new() -> Self {
        Self {
            tick: RwLock::new(0),
            open: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for ScalpingStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for ScalpingStrategy {
    fn strategy_type(&self) -> &'static str {
        "scalping"
    }

    fn description(&self) -> &'static str {
        "Order-book imbalance scalper with progress-based time decay exit"
    }

    fn analyze(&self, ctx: &StrategyContext, instance_cfg: &StrategyInstanceConfig) -> Result<Option<Signal>, StrategyError> {
        let params = ScalpingParams::from_instance(instance_cfg);

        let mut tick = self.tick.write();
        *tick += 1;
        let current_tick = *tick;
        drop(tick);

        let price = ctx.quote.mid().unwrap_or(ctx.quote.last);
        if price <= 0.0 {
            return Ok(None);
        }

        if let Some(pos) = self.open.read().get(ctx.symbol).copied() {
            let favorable_move = match pos.direction {
                Direction::LongCall => (price - pos.entry_price) / pos.entry_price,
                _ => (pos.entry_price - price) / pos.entry_price,
            };
            let imbalance = ctx.depth.imbalance();
            let against = match pos.direction {
                Direction::LongCall => imbalance < -params.exit_threshold,
                _ => imbalance > params.exit_threshold,
            };
            let stalled = favorable_move < params.min_progress_pct
                && current_tick.saturating_sub(pos.entry_tick) >= params.max_ticks_without_progress;

            if against || stalled {
                self.open.write().remove(ctx.symbol);
                let mut sig = Signal::new(Direction::NoTrade, 1.0, None);
                sig.metadata.insert(
                    "exit_reason".into(),
                    serde_json::Value::String("time_decay".into()),
                );
                return Ok(Some(sig));
            }
            return Ok(None);
        }

        let imbalance = ctx.depth.imbalance();
        if imbalance >= params.entry_threshold {
            self.open.write().insert(
                ctx.symbol.to_string(),
                ScalpPosition {
                    entry_tick: current_tick,
                    entry_price: price,
                    direction: Direction::LongCall,
                },
            );
            return Ok(Some(Signal::new(Direction::LongCall, imbalance, None)));
        }
        if imbalance <= -params.entry_threshold {
            self.open.write().insert(
                ctx.symbol.to_string(),
                ScalpPosition {
                    entry_tick: current_tick,
                    entry_price: price,
                    direction: Direction::LongPut,
                },
            );
            return Ok(Some(Signal::new(Direction::LongPut, imbalance.abs(), None)));
        }

        Ok(None)
    }

    fn on_position_opened(&self, symbol: &str) {
        let _ = symbol;
    }

    fn on_position_closed(&self, symbol: &str) {
        self.open.write().remove(symbol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime_config::LiquidityAnalysis;
    use crate::types::{DepthLevel, DepthSnapshot, Quote, Regime};
    use chrono::Utc;

    fn imbalanced_depth(bid: f64, ask: f64) -> DepthSnapshot {
        DepthSnapshot {
            bids: vec![DepthLevel { price: 100.0, size: bid }],
            asks: vec![DepthLevel { price: 100.1, size: ask }],
        }
    }

    #[test]
    fn enters_long_on_strong_bid_imbalance() {
        let strategy = ScalpingStrategy::new();
        let instance_cfg = StrategyInstanceConfig::default();
        let liquidity = LiquidityAnalysis::default();
        let depth = imbalanced_depth(900.0, 100.0);
        let ctx = StrategyContext {
            symbol: "AAPL",
            quote: Quote { bid: 100.0, ask: 100.1, last: 100.0, close: 100.0 },
            depth: &depth,
            regime: Regime::RangeBound,
            sector_rs_slope: None,
            timestamp: Utc::now(),
            vix_slope: None,
            liquidity: &liquidity,
        };
        let sig = strategy.analyze(&ctx, &instance_cfg).unwrap().unwrap();
        assert_eq!(sig.direction, Direction::LongCall);
    }

    #[test]
    fn stalled_position_emits_time_decay_no_trade() {
        let strategy = ScalpingStrategy::new();
        let instance_cfg = StrategyInstanceConfig::default();
        let liquidity = LiquidityAnalysis::default();
        let entry_depth = imbalanced_depth(900.0, 100.0);
        let flat_depth = imbalanced_depth(500.0, 500.0);

        let ctx_entry = StrategyContext {
            symbol: "AAPL",
            quote: Quote { bid: 100.0, ask: 100.1, last: 100.0, close: 100.0 },
            depth: &entry_depth,
            regime: Regime::RangeBound,
            sector_rs_slope: None,
            timestamp: Utc::now(),
            vix_slope: None,
            liquidity: &liquidity,
        };
        strategy.analyze(&ctx_entry, &instance_cfg).unwrap();

        let mut last = None;
        for _ in 0..MAX_TICKS_WITHOUT_PROGRESS + 1 {
            let ctx = StrategyContext {
                symbol: "AAPL",
                quote: Quote { bid: 99.95, ask: 100.0, last: 99.95, close: 99.95 },
                depth: &flat_depth,
                regime: Regime::RangeBound,
                sector_rs_slope: None,
                timestamp: Utc::now(),
                vix_slope: None,
                liquidity: &liquidity,
            };
            last = strategy.analyze(&ctx, &instance_cfg).unwrap();
        }
        let sig = last.unwrap();
        assert_eq!(sig.direction, Direction::NoTrade);
        assert_eq!(
            sig.metadata.get("exit_reason").and_then(|v| v.as_str()),
            Some("time_decay")
        );
    }

    #[test]
    fn instance_override_raises_entry_threshold() {
        let strategy = ScalpingStrategy::new();
        let liquidity = LiquidityAnalysis::default();
        let mut instance_cfg = StrategyInstanceConfig::default();
        instance_cfg.params.insert("entry_threshold".into(), serde_json::json!(0.95));
        // Imbalance of 0.8 clears the default 0.7 threshold but not a 0.95 override.
        let depth = imbalanced_depth(900.0, 100.0);
        let ctx = StrategyContext {
            symbol: "AAPL",
            quote: Quote { bid: 100.0, ask: 100.1, last: 100.0, close: 100.0 },
            depth: &depth,
            regime: Regime::RangeBound,
            sector_rs_slope: None,
            timestamp: Utc::now(),
            vix_slope: None,
            liquidity: &liquidity,
        };
        assert!(strategy.analyze(&ctx, &instance_cfg).unwrap().is_none());
    }
}
