// =============================================================================
// Option-spread wrappers — swing zone logic conditioned on regime
// =============================================================================

use serde_json::Value;

use crate::runtime_config::StrategyInstanceConfig;
use crate::types::{Direction, Pattern, Regime, Signal};

use super::swing::{find_zones, liquidity_threshold, nearest_zone, zone_proximity_pct};
use super::{Strategy, StrategyContext, StrategyError};

fn leg_metadata(short_delta: f64, long_delta: f64, spread_type: &str) -> Value {
    serde_json::json!({
        "short_delta": short_delta,
        "long_delta": long_delta,
        "type": spread_type,
    })
}

/// bull_put_spread: swing zone logic, only acted on in bull_trend.
pub struct BullPutSpread;

impl BullPutSpread {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BullPutSpread {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for BullPutSpread {
    fn strategy_type(&self) -> &'static str {
        "bull_put_spread"
    }

    fn description(&self) -> &'static str {
        "Credit put spread entered only in bull_trend, sized off swing support zones"
    }

    fn analyze(&self, ctx: &StrategyContext, instance_cfg: &StrategyInstanceConfig) -> Result<Option<Signal>, StrategyError> {
        if ctx.regime != Regime::BullTrend {
            return Ok(None);
        }
        let price = ctx.quote.mid().unwrap_or(ctx.quote.last);
        if price <= 0.0 {
            return Ok(None);
        }
        let zones = find_zones(ctx, liquidity_threshold(ctx, instance_cfg));
        let Some(zone) = nearest_zone(&zones, price, zone_proximity_pct(ctx, instance_cfg)) else {
            return Ok(None);
        };
        if !zone.is_support {
            return Ok(None);
        }

        let mut sig = Signal::new(
            Direction::BullPutSpread,
            zone.strength.clamp(0.1, 0.95),
            Some(Pattern::TestingSupport),
        );
        sig.price_level = Some(zone.price);
        sig.metadata
            .insert("legs".into(), leg_metadata(0.30, 0.15, "bull_put_spread"));
        Ok(Some(sig))
    }
}

/// bear_put_spread: swing zone logic, only acted on in bear_trend.
pub struct BearPutSpread;

impl BearPutSpread {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BearPutSpread {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for BearPutSpread {
    fn strategy_type(&self) -> &'static str {
        "bear_put_spread"
    }

    fn description(&self) -> &'static str {
        "Debit put spread entered only in bear_trend, sized off swing resistance zones"
    }

    fn analyze(&self, ctx: &StrategyContext, instance_cfg: &StrategyInstanceConfig) -> Result<Option<Signal>, StrategyError> {
        if ctx.regime != Regime::BearTrend {
            return Ok(None);
        }
        let price = ctx.quote.mid().unwrap_or(ctx.quote.last);
        if price <= 0.0 {
            return Ok(None);
        }
        let zones = find_zones(ctx, liquidity_threshold(ctx, instance_cfg));
        let Some(zone) = nearest_zone(&zones, price, zone_proximity_pct(ctx, instance_cfg)) else {
            return Ok(None);
        };
        if zone.is_support {
            return Ok(None);
        }

        let mut sig = Signal::new(
            Direction::BearPutSpread,
            zone.strength.clamp(0.1, 0.95),
            Some(Pattern::TestingResistance),
        );
        sig.price_level = Some(zone.price);
        sig.metadata
            .insert("legs".into(), leg_metadata(0.30, 0.15, "bear_put_spread"));
        Ok(Some(sig))
    }
}

/// long_put_straight: directional bearish conviction trade in bear_trend or
/// high_chaos, gated on confidence > 0.75.
pub struct LongPutStraight;

impl LongPutStraight {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LongPutStraight {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for LongPutStraight {
    fn strategy_type(&self) -> &'static str {
        "long_put_straight"
    }

    fn description(&self) -> &'static str {
        "Outright long put for high-conviction bearish signals in bear_trend or high_chaos"
    }

    fn analyze(&self, ctx: &StrategyContext, instance_cfg: &StrategyInstanceConfig) -> Result<Option<Signal>, StrategyError> {
        if !matches!(ctx.regime, Regime::BearTrend | Regime::HighChaos) {
            return Ok(None);
        }
        let price = ctx.quote.mid().unwrap_or(ctx.quote.last);
        if price <= 0.0 {
            return Ok(None);
        }
        let zones = find_zones(ctx, liquidity_threshold(ctx, instance_cfg));
        let Some(zone) = nearest_zone(&zones, price, zone_proximity_pct(ctx, instance_cfg)) else {
            return Ok(None);
        };
        if zone.is_support || zone.strength <= 0.75 {
            return Ok(None);
        }

        let mut sig = Signal::new(
            Direction::LongPutStraight,
            zone.strength,
            Some(Pattern::RejectionAtResistance),
        );
        sig.price_level = Some(zone.price);
        sig.metadata
            .insert("legs".into(), leg_metadata(0.0, 0.0, "long_put_straight"));
        Ok(Some(sig))
    }
}

/// iron_condor: only in range_bound, when price sits near the midpoint of
/// the nearest support/resistance zone pair.
pub struct IronCondorStrategy;

impl IronCondorStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for IronCondorStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for IronCondorStrategy {
    fn strategy_type(&self) -> &'static str {
        "iron_condor"
    }

    fn description(&self) -> &'static str {
        "Range-bound iron condor centered between the nearest zone pair"
    }

    fn analyze(&self, ctx: &StrategyContext, instance_cfg: &StrategyInstanceConfig) -> Result<Option<Signal>, StrategyError> {
        if ctx.regime != Regime::RangeBound {
            return Ok(None);
        }
        let price = ctx.quote.mid().unwrap_or(ctx.quote.last);
        if price <= 0.0 {
            return Ok(None);
        }
        let zones = find_zones(ctx, liquidity_threshold(ctx, instance_cfg));
        let support = zones.iter().filter(|z| z.is_support && z.price < price).max_by(|a, b| {
            a.price.partial_cmp(&b.price).unwrap()
        });
        let resistance = zones
            .iter()
            .filter(|z| !z.is_support && z.price > price)
            .min_by(|a, b| a.price.partial_cmp(&b.price).unwrap());

        let (Some(support), Some(resistance)) = (support, resistance) else {
            return Ok(None);
        };
        let midpoint = (support.price + resistance.price) / 2.0;
        if ((price - midpoint).abs() / price) > 0.003 {
            return Ok(None);
        }

        let confidence = (support.strength + resistance.strength) / 2.0;
        let mut sig = Signal::new(Direction::IronCondor, confidence.clamp(0.1, 0.95), Some(Pattern::Consolidation));
        sig.price_level = Some(midpoint);
        sig.metadata
            .insert("legs".into(), leg_metadata(0.20, 0.10, "iron_condor"));
        Ok(Some(sig))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime_config::LiquidityAnalysis;
    use crate::types::{DepthLevel, DepthSnapshot, Quote};
    use chrono::Utc;

    fn ctx<'a>(regime: Regime, price: f64, depth: &'a DepthSnapshot, liquidity: &'a LiquidityAnalysis) -> StrategyContext<'a> {
        StrategyContext {
            symbol: "AAPL",
            quote: Quote { bid: price, ask: price, last: price, close: price },
            depth,
            regime,
            sector_rs_slope: None,
            timestamp: Utc::now(),
            vix_slope: None,
            liquidity,
        }
    }

    #[test]
    fn bull_put_spread_only_fires_in_bull_trend() {
        let strategy = BullPutSpread::new();
        let instance_cfg = StrategyInstanceConfig::default();
        let liquidity = LiquidityAnalysis::default();
        let depth = DepthSnapshot {
            bids: vec![DepthLevel { price: 99.8, size: 700.0 }],
            asks: vec![DepthLevel { price: 100.2, size: 10.0 }],
        };
        assert!(strategy
            .analyze(&ctx(Regime::RangeBound, 100.0, &depth, &liquidity), &instance_cfg)
            .unwrap()
            .is_none());
        let sig = strategy
            .analyze(&ctx(Regime::BullTrend, 100.0, &depth, &liquidity), &instance_cfg)
            .unwrap()
            .unwrap();
        assert_eq!(sig.direction, Direction::BullPutSpread);
        assert!(sig.metadata.contains_key("legs"));
    }

    #[test]
    fn iron_condor_requires_price_near_midpoint() {
        let strategy = IronCondorStrategy::new();
        let instance_cfg = StrategyInstanceConfig::default();
        let liquidity = LiquidityAnalysis::default();
        let depth = DepthSnapshot {
            bids: vec![DepthLevel { price: 95.0, size: 700.0 }],
            asks: vec![DepthLevel { price: 105.0, size: 700.0 }],
        };
        let sig = strategy
            .analyze(&ctx(Regime::RangeBound, 100.0, &depth, &liquidity), &instance_cfg)
            .unwrap()
            .unwrap();
        assert_eq!(sig.direction, Direction::IronCondor);

        let far = strategy
            .analyze(&ctx(Regime::RangeBound, 103.0, &depth, &liquidity), &instance_cfg)
            .unwrap();
        assert!(far.is_none());
    }
}
