// =============================================================================
// Sector rotation — relative-strength slope of 11 sector ETFs vs SPY
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::runtime_config::SectorRotation as SectorRotationConfig;
use crate::types::Bar;

pub const SECTOR_ETFS: [&str; 11] = [
    "XLK", "XLE", "XLF", "XLV", "XLI", "XLP", "XLY", "XLB", "XLU", "XLRE", "XLC",
];

const SECTOR_KEYWORDS: &[(&str, &str)] = &[
    ("technology", "XLK"),
    ("energy", "XLE"),
    ("financial", "XLF"),
    ("health", "XLV"),
    ("industrial", "XLI"),
    ("consumer staples", "XLP"),
    ("consumer discretionary", "XLY"),
    ("materials", "XLB"),
    ("utilities", "XLU"),
    ("real estate", "XLRE"),
    ("communication", "XLC"),
];

/// RS slope for each sector ETF relative to SPY, refreshed periodically.
pub struct SectorRotation {
    rs_slopes: RwLock<HashMap<String, f64>>,
}

impl SectorRotation {
    pub fn new() -> Self {
        Self {
            rs_slopes: RwLock::new(HashMap::new()),
        }
    }

    pub fn rs_slope(&self, sector_etf: &str) -> Option<f64> {
        self.rs_slopes.read().get(sector_etf).copied()
    }

    /// Recompute RS slope for one sector ETF against SPY, aligned by index
    /// (callers must pass timestamp-aligned series of equal length).
    pub fn update_sector(&self, etf: &str, etf_bars: &[Bar], spy_bars: &[Bar], cfg: &SectorRotationConfig) {
        let n = cfg.rs_window.min(etf_bars.len()).min(spy_bars.len());
        if n < 2 {
            return;
        }
        let etf_tail = &etf_bars[etf_bars.len() - n..];
        let spy_tail = &spy_bars[spy_bars.len() - n..];

        let ratios: Vec<f64> = etf_tail
            .iter()
            .zip(spy_tail.iter())
            .filter(|(_, s)| s.close > 0.0)
            .map(|(e, s)| e.close / s.close)
            .collect();

        if ratios.len() < 2 {
            return;
        }

        let first = ratios[0];
        let last = *ratios.last().unwrap();
        let slope = (last - first) / ratios.len() as f64;
        self.rs_slopes.write().insert(etf.to_string(), slope);
    }

    /// Resolve a symbol's sector ETF via the config override map, else a
    /// fixed keyword lookup over the broker's reported industry string.
    pub fn sector_for_symbol(
        symbol: &str,
        industry: Option<&str>,
        cfg: &SectorRotationConfig,
    ) -> Option<String> {
        if let Some(etf) = cfg.symbol_sector_overrides.get(symbol) {
            return Some(etf.clone());
        }
        let industry = industry?.to_lowercase();
        SECTOR_KEYWORDS
            .iter()
            .find(|(kw, _)| industry.contains(kw))
            .map(|(_, etf)| etf.to_string())
    }
}

impl Default for SectorRotation {
    fn default() -> Self {
        Self::new()
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

    #[test]
    fn positive_slope_when_sector_outperforms() {
        let rot = SectorRotation::new();
        let cfg = SectorRotationConfig {
            rs_window: 10,
            ..Default::default()
        };
        let etf = bars(&[100.0, 101.0, 102.0, 103.0, 104.0, 105.0, 106.0, 107.0, 108.0, 110.0]);
        let spy = bars(&[400.0; 10]);
        rot.update_sector("XLK", &etf, &spy, &cfg);
        assert!(rot.rs_slope("XLK").unwrap() > 0.0);
    }

    #[test]
    fn sector_override_takes_priority_over_keyword_map() {
        let mut cfg = SectorRotationConfig::default();
        cfg.symbol_sector_overrides.insert("ACME".into(), "XLB".into());
        let sector = SectorRotation::sector_for_symbol("ACME", Some("technology"), &cfg);
        assert_eq!(sector.as_deref(), Some("XLB"));
    }

    #[test]
    fn keyword_fallback_when_no_override() {
        let cfg = SectorRotationConfig::default();
        let sector = SectorRotation::sector_for_symbol("XYZ", Some("Health Care Providers"), &cfg);
        assert_eq!(sector.as_deref(), Some("XLV"));
    }
}
