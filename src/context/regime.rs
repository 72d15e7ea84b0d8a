// =============================================================================
// Regime detector — SPY/VIX-driven four-way market classification
// =============================================================================
//
// Priority-ordered: the first matching clause wins. Structurally mirrors a
// classic multi-indicator regime classifier (evaluate branches top-down,
// fall through to a conservative default) but the indicators and thresholds
// here are SPY/VIX, not the crypto microstructure measures this pattern was
// originally written against.
// =============================================================================

use parking_lot::RwLock;
use std::time::Instant;
use tracing::{debug, info};

use crate::runtime_config::MarketRegime as MarketRegimeConfig;
use crate::types::{Bar, Regime};

#[derive(Debug, Clone, Copy)]
pub struct RegimeState {
    pub regime: Regime,
    pub confidence: f64,
    pub spy_above_sma200: bool,
    pub vix_last: f64,
}

pub struct RegimeDetector {
    state: RwLock<Option<RegimeState>>,
    last_change: RwLock<Instant>,
}

impl RegimeDetector {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(None),
            last_change: RwLock::new(Instant::now()),
        }
    }

    pub fn current(&self) -> Regime {
        self.state.read().map(|s| s.regime).unwrap_or(Regime::Unknown)
    }

    pub fn current_state(&self) -> Option<RegimeState> {
        *self.state.read()
    }

    /// Recompute the regime from SPY daily bars (~1y) and VIX daily bars
    /// (~30d). Retains the last known regime if either series is too short
    /// (treated by the caller as a transient feed failure).
    pub fn update(&self, spy_bars: &[Bar], vix_bars: &[Bar], cfg: &MarketRegimeConfig) {
        if spy_bars.len() < 200 || vix_bars.len() < 6 {
            debug!(
                spy_len = spy_bars.len(),
                vix_len = vix_bars.len(),
                "insufficient bars for regime classification — retaining last known regime"
            );
            return;
        }

        let classified = classify(spy_bars, vix_bars, cfg);

        let mut state = self.state.write();
        let changed = state.map(|s| s.regime) != Some(classified.regime);
        *state = Some(classified);
        drop(state);

        if changed {
            *self.last_change.write() = Instant::now();
            info!(regime = %classified.regime, confidence = classified.confidence, "market regime changed");
        }
    }

    pub fn age_secs(&self) -> u64 {
        self.last_change.read().elapsed().as_secs()
    }
}

impl Default for RegimeDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn sma(values: &[f64], window: usize) -> Option<f64> {
    if values.len() < window {
        return None;
    }
    let slice = &values[values.len() - window..];
    Some(slice.iter().sum::<f64>() / window as f64)
}

fn stdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

fn remap(value: f64, lo: f64, hi: f64) -> f64 {
    if (hi - lo).abs() < f64::EPSILON {
        return 0.5;
    }
    ((value - lo) / (hi - lo)).clamp(0.0, 1.0)
}

/// Priority-ordered classification: high_chaos > bear_trend > range_bound >
/// bull_trend > range_bound (default).
fn classify(spy_bars: &[Bar], vix_bars: &[Bar], cfg: &MarketRegimeConfig) -> RegimeState {
    let spy_closes: Vec<f64> = spy_bars.iter().map(|b| b.close).collect();
    let vix_closes: Vec<f64> = vix_bars.iter().map(|b| b.close).collect();

    let spy_last = *spy_closes.last().unwrap();
    let vix_last = *vix_closes.last().unwrap();
    let vix_5d_ago = vix_closes[vix_closes.len().saturating_sub(6)];
    let vix_change = if vix_5d_ago > 0.0 {
        (vix_last - vix_5d_ago) / vix_5d_ago
    } else {
        0.0
    };

    let spy_returns: Vec<f64> = spy_closes
        .windows(2)
        .rev()
        .take(5)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();
    let spy_vol_5d = stdev(&spy_returns);

    let sma200 = sma(&spy_closes, 200).unwrap_or(spy_last);
    let spy_above_sma200 = spy_last > sma200;

    let window10 = &spy_closes[spy_closes.len().saturating_sub(10)..];
    let spy_10d_max = window10.iter().cloned().fold(f64::MIN, f64::max);
    let spy_10d_min = window10.iter().cloned().fold(f64::MAX, f64::min);
    let spy_10d_range_pct = if spy_10d_min > 0.0 {
        (spy_10d_max - spy_10d_min) / spy_10d_min
    } else {
        0.0
    };

    // 1. high_chaos
    if vix_change > cfg.high_chaos_vix_change
        || spy_vol_5d > cfg.high_chaos_spy_vol
        || vix_last > cfg.high_chaos_vix
    {
        let conf = remap(vix_change.max(spy_vol_5d * 10.0).max(vix_last / 50.0), 0.2, 1.0);
        return RegimeState {
            regime: Regime::HighChaos,
            confidence: 0.5 + conf * 0.5,
            spy_above_sma200,
            vix_last,
        };
    }

    // 2. bear_trend
    if !spy_above_sma200 || vix_last > cfg.high_chaos_vix {
        let conf = remap(sma200 - spy_last, 0.0, sma200 * 0.1);
        return RegimeState {
            regime: Regime::BearTrend,
            confidence: 0.5 + conf * 0.5,
            spy_above_sma200,
            vix_last,
        };
    }

    // 3. range_bound
    if spy_10d_range_pct < 0.02 && (cfg.range_min..=cfg.range_max).contains(&vix_last) {
        let conf = 1.0 - remap(spy_10d_range_pct, 0.0, 0.02);
        return RegimeState {
            regime: Regime::RangeBound,
            confidence: 0.5 + conf * 0.5,
            spy_above_sma200,
            vix_last,
        };
    }

    // 4. bull_trend
    if spy_above_sma200 && vix_last < cfg.bull_vix {
        let conf = remap(spy_last - sma200, 0.0, sma200 * 0.1);
        return RegimeState {
            regime: Regime::BullTrend,
            confidence: 0.5 + conf * 0.5,
            spy_above_sma200,
            vix_last,
        };
    }

    // 5. default
    RegimeState {
        regime: Regime::RangeBound,
        confidence: 0.5,
        spy_above_sma200,
        vix_last,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn bars(closes: &[f64]) -> Vec<Bar> {
        let now = Utc::now();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                timestamp: now - Duration::days((closes.len() - i) as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 0.0,
            })
            .collect()
    }

    fn flat_spy(n: usize, level: f64) -> Vec<Bar> {
        bars(&vec![level; n])
    }

    #[test]
    fn high_chaos_wins_on_vix_spike() {
        let cfg = MarketRegimeConfig::default();
        let spy = flat_spy(210, 450.0);
        let mut vix_vals = vec![18.0; 29];
        vix_vals.push(40.0);
        let vix = bars(&vix_vals);
        let state = classify(&spy, &vix, &cfg);
        assert_eq!(state.regime, Regime::HighChaos);
    }

    #[test]
    fn high_chaos_priority_over_bear_trend() {
        let cfg = MarketRegimeConfig::default();
        // SPY trending down (below SMA200) AND VIX spiking -> still high_chaos.
        let mut spy_vals: Vec<f64> = (0..210).map(|i| 500.0 - i as f64 * 0.5).collect();
        spy_vals[209] = spy_vals[208] * 0.90; // trigger 5d vol spike too
        let spy = bars(&spy_vals);
        let vix = bars(&vec![18.0; 30]);
        let state = classify(&spy, &vix, &cfg);
        assert_eq!(state.regime, Regime::HighChaos);
    }

    #[test]
    fn bear_trend_when_below_sma200() {
        let cfg = MarketRegimeConfig::default();
        let spy_vals: Vec<f64> = (0..210).map(|i| 500.0 - i as f64 * 0.3).collect();
        let spy = bars(&spy_vals);
        let vix = bars(&vec![18.0; 30]);
        let state = classify(&spy, &vix, &cfg);
        assert_eq!(state.regime, Regime::BearTrend);
    }

    #[test]
    fn bull_trend_when_above_sma200_and_low_vix() {
        let cfg = MarketRegimeConfig::default();
        let spy_vals: Vec<f64> = (0..210).map(|i| 400.0 + i as f64 * 0.3).collect();
        let spy = bars(&spy_vals);
        let vix = bars(&vec![15.0; 30]);
        let state = classify(&spy, &vix, &cfg);
        assert_eq!(state.regime, Regime::BullTrend);
    }

    #[test]
    fn range_bound_default_fallback() {
        let cfg = MarketRegimeConfig::default();
        // Above SMA200 but VIX too high for bull, range too wide for range_bound.
        let mut spy_vals: Vec<f64> = vec![450.0; 200];
        spy_vals.extend_from_slice(&[451.0, 452.0, 453.0, 454.0, 455.0, 456.0, 457.0, 458.0, 459.0, 465.0]);
        let spy = bars(&spy_vals);
        let vix = bars(&vec![22.0; 30]);
        let state = classify(&spy, &vix, &cfg);
        assert_eq!(state.regime, Regime::RangeBound);
    }

    #[test]
    fn insufficient_bars_retains_last_known_regime() {
        let detector = RegimeDetector::new();
        let cfg = MarketRegimeConfig::default();
        detector.update(&flat_spy(5, 400.0), &flat_spy(5, 15.0), &cfg);
        assert_eq!(detector.current(), Regime::Unknown);
    }
}
