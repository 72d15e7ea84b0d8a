// =============================================================================
// VIX-momentum opening range breakout
// =============================================================================

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;

use crate::runtime_config::StrategyInstanceConfig;
use crate::types::{Direction, Pattern, Signal};

use super::{Strategy, StrategyContext, StrategyError};

const OPENING_RANGE_MINUTES: i64 = 15;
const TRADING_WINDOW_MINUTES: i64 = 30;

#[derive(Clone)]
struct DayState {
    date: NaiveDate,
    range_high: f64,
    range_low: f64,
    range_closed: bool,
    range_valid: bool,
    session_start: DateTime<Utc>,
    traded: bool,
}

impl DayState {
    fn new(symbol_session_start: DateTime<Utc>) -> Self {
        Self {
            date: symbol_session_start.date_naive(),
            range_high: f64::MIN,
            range_low: f64::MAX,
            range_closed: false,
            range_valid: false,
            session_start: symbol_session_start,
            traded: false,
        }
    }
}

/// Opening-range breakout filtered by VIX momentum. Keyed per symbol by the
/// local calendar date; one signal is emitted per symbol per day.
pub struct VixMomentumOrb {
    state: RwLock<std::collections::HashMap<String, DayState>>,
}

impl VixMomentumOrb {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(std::collections::HashMap::new()),
        }
    }
}

impl Default for VixMomentumOrb {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for VixMomentumOrb {
    fn strategy_type(&self) -> &'static str {
        "vix_momentum_orb"
    }

    fn description(&self) -> &'static str {
        "Opening-range breakout gated by VIX slope, one trade per symbol per day"
    }

    fn analyze(&self, ctx: &StrategyContext, _instance_cfg: &StrategyInstanceConfig) -> Result<Option<Signal>, StrategyError> {
        let price = ctx.quote.mid().unwrap_or(ctx.quote.last);
        if price <= 0.0 {
            return Ok(None);
        }

        let today = ctx.timestamp.date_naive();
        let mut states = self.state.write();
        let day = states
            .entry(ctx.symbol.to_string())
            .and_modify(|d| {
                if d.date != today {
                    *d = DayState::new(ctx.timestamp);
                }
            })
            .or_insert_with(|| DayState::new(ctx.timestamp));

        if day.traded {
            return Ok(None);
        }

        let minutes_since_open = (ctx.timestamp - day.session_start).num_minutes();

        if minutes_since_open < OPENING_RANGE_MINUTES {
            day.range_high = day.range_high.max(price);
            day.range_low = day.range_low.min(price);
            day.range_valid = true;
            return Ok(None);
        }

        if !day.range_closed {
            day.range_closed = true;
            if !day.range_valid {
                // No opening range observed for today (late start) — sit out.
                day.traded = true;
                return Ok(None);
            }
        }

        if minutes_since_open > OPENING_RANGE_MINUTES + TRADING_WINDOW_MINUTES {
            day.traded = true;
            return Ok(None);
        }

        let Some(slope) = ctx.vix_slope else {
            return Ok(None);
        };

        let confidence = (0.8 + 10.0 * slope.abs()).clamp(0.1, 0.95);

        if price > day.range_high && slope < 0.0 {
            day.traded = true;
            let mut sig = Signal::new(Direction::LongCall, confidence, Some(Pattern::PotentialBreakoutUp));
            sig.price_level = Some(day.range_high);
            return Ok(Some(sig));
        }
        if price < day.range_low && slope > 0.0 {
            day.traded = true;
            let mut sig = Signal::new(Direction::LongPut, confidence, Some(Pattern::PotentialBreakoutDown));
            sig.price_level = Some(day.range_low);
            return Ok(Some(sig));
        }

        Ok(None)
    }

    fn on_position_opened(&self, symbol: &str) {
        if let Some(day) = self.state.write().get_mut(symbol) {
            day.traded = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime_config::LiquidityAnalysis;
    use crate::types::{DepthSnapshot, Quote, Regime};
    use chrono::Duration;

    fn ctx<'a>(
        symbol: &'a str,
        price: f64,
        timestamp: DateTime<Utc>,
        vix_slope: Option<f64>,
        depth: &'a DepthSnapshot,
        liquidity: &'a LiquidityAnalysis,
    ) -> StrategyContext<'a> {
        StrategyContext {
            symbol,
            quote: Quote { bid: price, ask: price, last: price, close: price },
            depth,
            regime: Regime::Unknown,
            sector_rs_slope: None,
            timestamp,
            vix_slope,
            liquidity,
        }
    }

    #[test]
    fn breaks_out_upward_with_negative_vix_slope() {
        let strategy = VixMomentumOrb::new();
        let instance_cfg = StrategyInstanceConfig::default();
        let liquidity = LiquidityAnalysis::default();
        let depth = DepthSnapshot::default();
        let open = Utc::now();

        strategy
            .analyze(&ctx("SPY", 400.0, open, None, &depth, &liquidity), &instance_cfg)
            .unwrap();
        strategy
            .analyze(&ctx("SPY", 402.0, open + Duration::minutes(5), None, &depth, &liquidity), &instance_cfg)
            .unwrap();

        let breakout_time = open + Duration::minutes(OPENING_RANGE_MINUTES + 1);
        let sig = strategy
            .analyze(&ctx("SPY", 403.0, breakout_time, Some(-0.01), &depth, &liquidity), &instance_cfg)
            .unwrap()
            .unwrap();
        assert_eq!(sig.direction, Direction::LongCall);
    }

    #[test]
    fn no_signal_without_vix_data() {
        let strategy = VixMomentumOrb::new();
        let instance_cfg = StrategyInstanceConfig::default();
        let liquidity = LiquidityAnalysis::default();
        let depth = DepthSnapshot::default();
        let open = Utc::now();
        strategy
            .analyze(&ctx("SPY", 400.0, open, None, &depth, &liquidity), &instance_cfg)
            .unwrap();
        let breakout_time = open + Duration::minutes(OPENING_RANGE_MINUTES + 1);
        let sig = strategy
            .analyze(&ctx("SPY", 403.0, breakout_time, None, &depth, &liquidity), &instance_cfg)
            .unwrap();
        assert!(sig.is_none());
    }

    #[test]
    fn only_one_signal_per_day() {
        let strategy = VixMomentumOrb::new();
        let instance_cfg = StrategyInstanceConfig::default();
        let liquidity = LiquidityAnalysis::default();
        let depth = DepthSnapshot::default();
        let open = Utc::now();
        strategy
            .analyze(&ctx("SPY", 400.0, open, None, &depth, &liquidity), &instance_cfg)
            .unwrap();
        let t1 = open + Duration::minutes(OPENING_RANGE_MINUTES + 1);
        let first = strategy
            .analyze(&ctx("SPY", 403.0, t1, Some(-0.01), &depth, &liquidity), &instance_cfg)
            .unwrap();
        assert!(first.is_some());

        let t2 = t1 + Duration::minutes(2);
        let second = strategy
            .analyze(&ctx("SPY", 405.0, t2, Some(-0.02), &depth, &liquidity), &instance_cfg)
            .unwrap();
        assert!(second.is_none());
    }
}
