// =============================================================================
// Swing strategy — support/resistance zones + order-book imbalance
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::runtime_config::StrategyInstanceConfig;
use crate::types::{Direction, Pattern, Signal};

use super::{Strategy, StrategyContext, StrategyError};

const IMBALANCE_THRESHOLD: f64 = 0.4;

/// An instance's `params` override the shared `liquidity_analysis` defaults
/// field-by-field.
pub(crate) fn liquidity_threshold(ctx: &StrategyContext, instance_cfg: &StrategyInstanceConfig) -> f64 {
    instance_cfg
        .params
        .get("liquidity_threshold")
        .and_then(|v| v.as_f64())
        .unwrap_or(ctx.liquidity.liquidity_threshold)
}

pub(crate) fn zone_proximity_pct(ctx: &StrategyContext, instance_cfg: &StrategyInstanceConfig) -> f64 {
    instance_cfg
        .params
        .get("zone_proximity")
        .and_then(|v| v.as_f64())
        .unwrap_or(ctx.liquidity.zone_proximity)
}

pub(crate) fn imbalance_threshold(instance_cfg: &StrategyInstanceConfig) -> f64 {
    instance_cfg
        .params
        .get("imbalance_threshold")
        .and_then(|v| v.as_f64())
        .unwrap_or(IMBALANCE_THRESHOLD)
}

pub(crate) struct Zone {
    pub(crate) price: f64,
    pub(crate) strength: f64,
    pub(crate) is_support: bool,
}

pub(crate) fn find_zones(ctx: &StrategyContext, liquidity_threshold: f64) -> Vec<Zone> {
    let max_bid = ctx.depth.bids.iter().map(|l| l.size).fold(0.0_f64, f64::max);
    let max_ask = ctx.depth.asks.iter().map(|l| l.size).fold(0.0_f64, f64::max);

    let mut zones = Vec::new();
    for level in &ctx.depth.bids {
        if level.size >= liquidity_threshold && max_bid > 0.0 {
            zones.push(Zone {
                price: level.price,
                strength: level.size / max_bid,
                is_support: true,
            });
        }
    }
    for level in &ctx.depth.asks {
        if level.size >= liquidity_threshold && max_ask > 0.0 {
            zones.push(Zone {
                price: level.price,
                strength: level.size / max_ask,
                is_support: false,
            });
        }
    }
    zones
}

pub(crate) fn nearest_zone(zones: &[Zone], price: f64, zone_proximity_pct: f64) -> Option<&Zone> {
    zones
        .iter()
        .filter(|z| z.price > 0.0 && ((z.price - price).abs() / price) <= zone_proximity_pct)
        .min_by(|a, b| {
            (a.price - price)
                .abs()
                .partial_cmp(&(b.price - price).abs())
                .unwrap()
        })
}

pub struct SwingStrategy {
    previous_price: RwLock<HashMap<String, f64>>,
}

impl SwingStrategy {
    pub fn new() -> Self {
        Self {
            previous_price: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for SwingStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for SwingStrategy {
    fn strategy_type(&self) -> &'static str {
        "swing"
    }

    fn description(&self) -> &'static str {
        "Support/resistance zones from L2 depth plus order-book imbalance"
    }

    fn analyze(&self, ctx: &StrategyContext, instance_cfg: &StrategyInstanceConfig) -> Result<Option<Signal>, StrategyError> {
        let price = ctx.quote.mid().unwrap_or(ctx.quote.last);
        if price <= 0.0 {
            return Ok(None);
        }

        let previous = {
            let mut prev = self.previous_price.write();
            let old = prev.get(ctx.symbol).copied();
            prev.insert(ctx.symbol.to_string(), price);
            old
        };

        let zones = find_zones(ctx, liquidity_threshold(ctx, instance_cfg));
        let imbalance = ctx.depth.imbalance();
        let imbalance_threshold = imbalance_threshold(instance_cfg);

        if let (Some(prev), Some(zone)) = (previous, nearest_zone(&zones, price, zone_proximity_pct(ctx, instance_cfg))) {
            if zone.is_support && prev <= zone.price && price > zone.price {
                let mut confidence = zone.strength;
                if imbalance > 0.0 {
                    confidence = (confidence + imbalance.min(0.3)).min(1.0);
                }
                let mut sig = Signal::new(Direction::LongCall, confidence, Some(Pattern::RejectionAtSupport));
                sig.price_level = Some(zone.price);
                return Ok(Some(sig));
            }
            if !zone.is_support && prev >= zone.price && price < zone.price {
                let mut confidence = zone.strength;
                if imbalance < 0.0 {
                    confidence = (confidence + imbalance.abs().min(0.3)).min(1.0);
                }
                let mut sig = Signal::new(Direction::LongPut, confidence, Some(Pattern::RejectionAtResistance));
                sig.price_level = Some(zone.price);
                return Ok(Some(sig));
            }
        }

        if imbalance > imbalance_threshold {
            let mut sig = Signal::new(Direction::LongCall, imbalance, Some(Pattern::PotentialBreakoutUp));
            sig.price_level = Some(price);
            return Ok(Some(sig));
        }
        if imbalance < -imbalance_threshold {
            let mut sig = Signal::new(Direction::LongPut, imbalance.abs(), Some(Pattern::PotentialBreakoutDown));
            sig.price_level = Some(price);
            return Ok(Some(sig));
        }

        Ok(None)
    }

    fn on_position_closed(&self, symbol: &str) {
        self.previous_price.write().remove(symbol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime_config::LiquidityAnalysis;
    use crate::types::{DepthLevel, DepthSnapshot, Quote, Regime};
    use chrono::Utc;

    fn depth_with_support(price: f64, size: f64) -> DepthSnapshot {
        DepthSnapshot {
            bids: vec![DepthLevel { price, size }],
            asks: vec![DepthLevel { price: price + 1.0, size: 10.0 }],
        }
    }

    #[test]
    fn rejection_at_support_emits_long_call() {
        let strategy = SwingStrategy::new();
        let instance_cfg = StrategyInstanceConfig::default();
        let liquidity = LiquidityAnalysis::default();
        let depth = depth_with_support(99.0, 600.0);
        let ctx_first = StrategyContext {
            symbol: "AAPL",
            quote: Quote { bid: 98.5, ask: 98.6, last: 98.5, close: 98.5 },
            depth: &depth,
            regime: Regime::BullTrend,
            sector_rs_slope: None,
            timestamp: Utc::now(),
            vix_slope: None,
            liquidity: &liquidity,
        };
        strategy.analyze(&ctx_first, &instance_cfg).unwrap();

        let ctx_second = StrategyContext {
            symbol: "AAPL",
            quote: Quote { bid: 99.4, ask: 99.5, last: 99.4, close: 99.4 },
            depth: &depth,
            regime: Regime::BullTrend,
            sector_rs_slope: None,
            timestamp: Utc::now(),
            vix_slope: None,
            liquidity: &liquidity,
        };
        let signal = strategy.analyze(&ctx_second, &instance_cfg).unwrap().unwrap();
        assert_eq!(signal.direction, Direction::LongCall);
        assert_eq!(signal.pattern_name, Some(Pattern::RejectionAtSupport));
    }

    #[test]
    fn breakout_up_from_imbalance_alone() {
        let strategy = SwingStrategy::new();
        let instance_cfg = StrategyInstanceConfig::default();
        let liquidity = LiquidityAnalysis::default();
        let depth = DepthSnapshot {
            bids: vec![DepthLevel { price: 100.0, size: 100.0 }],
            asks: vec![DepthLevel { price: 100.1, size: 10.0 }],
        };
        let ctx = StrategyContext {
            symbol: "MSFT",
            quote: Quote { bid: 100.0, ask: 100.1, last: 100.0, close: 100.0 },
            depth: &depth,
            regime: Regime::BullTrend,
            sector_rs_slope: None,
            timestamp: Utc::now(),
            vix_slope: None,
            liquidity: &liquidity,
        };
        let signal = strategy.analyze(&ctx, &instance_cfg).unwrap().unwrap();
        assert_eq!(signal.direction, Direction::LongCall);
        assert_eq!(signal.pattern_name, Some(Pattern::PotentialBreakoutUp));
    }

    #[test]
    fn instance_override_lowers_imbalance_threshold() {
        let strategy = SwingStrategy::new();
        let liquidity = LiquidityAnalysis::default();
        let mut instance_cfg = StrategyInstanceConfig::default();
        instance_cfg
            .params
            .insert("imbalance_threshold".into(), serde_json::json!(0.1));
        let depth = DepthSnapshot {
            bids: vec![DepthLevel { price: 100.0, size: 150.0 }],
            asks: vec![DepthLevel { price: 100.1, size: 100.0 }],
        };
        let ctx = StrategyContext {
            symbol: "MSFT",
            quote: Quote { bid: 100.0, ask: 100.1, last: 100.0, close: 100.0 },
            depth: &depth,
            regime: Regime::BullTrend,
            sector_rs_slope: None,
            timestamp: Utc::now(),
            vix_slope: None,
            liquidity: &liquidity,
        };
        // Imbalance here is 0.2 — below the 0.4 default threshold but above a 0.1 override.
        let default_cfg = StrategyInstanceConfig::default();
        assert!(strategy.analyze(&ctx, &default_cfg).unwrap().is_none());
        let signal = strategy.analyze(&ctx, &instance_cfg).unwrap().unwrap();
        assert_eq!(signal.direction, Direction::LongCall);
    }
}
