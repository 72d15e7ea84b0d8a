// =============================================================================
// Market Context — regime detector + sector rotation, refreshed periodically
// =============================================================================

pub mod regime;
pub mod sector;
pub mod vix_slope;

use regime::RegimeDetector;
use sector::SectorRotation;
use vix_slope::VixSlopeTracker;

use crate::types::{Direction, Regime};

pub struct MarketContext {
    pub regime: RegimeDetector,
    pub sector_rotation: SectorRotation,
    pub vix_slope: VixSlopeTracker,
}

impl MarketContext {
    pub fn new() -> Self {
        Self {
            regime: RegimeDetector::new(),
            sector_rotation: SectorRotation::new(),
            vix_slope: VixSlopeTracker::new(),
        }
    }

    /// The global veto table from the signal-evaluation step: returns true
    /// when `direction` must be rejected given the current regime, for any
    /// strategy other than scalping (scalping is exempt from the
    /// high_chaos veto per its own risk model).
    pub fn vetoes(&self, direction: Direction, is_scalping: bool) -> bool {
        let regime = self.regime.current();

        if direction.is_bullish() && regime == Regime::BearTrend {
            return true;
        }
        if direction.is_bearish() && regime == Regime::BullTrend {
            return true;
        }
        if direction == Direction::IronCondor && regime != Regime::RangeBound {
            return true;
        }
        if !is_scalping && regime == Regime::HighChaos {
            return true;
        }
        false
    }
}

impl Default for MarketContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn veto_completeness_matches_table() {
        let ctx = MarketContext::new();
        // Default regime is Unknown — nothing is vetoed except condor.
        assert!(!ctx.vetoes(Direction::LongCall, false));
        assert!(ctx.vetoes(Direction::IronCondor, false));
    }
}
