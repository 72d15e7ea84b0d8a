// =============================================================================
// VIX slope tracker — trailing-window rate of change for the ORB strategy
// =============================================================================

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

/// Rolling `(timestamp, price)` window of live VIX quotes, pruned to a
/// configurable trailing span. Two-point slope, not a regression — matches
/// the momentum check the opening-range-breakout strategy gates on.
pub struct VixSlopeTracker {
    history: RwLock<Vec<(DateTime<Utc>, f64)>>,
}

impl VixSlopeTracker {
    pub fn new() -> Self {
        Self {
            history: RwLock::new(Vec::new()),
        }
    }

    /// Record a fresh VIX sample and drop anything older than `window_minutes`.
    pub fn record(&self, now: DateTime<Utc>, price: f64, window_minutes: i64) {
        let mut history = self.history.write();
        history.push((now, price));
        let cutoff = now - Duration::minutes(window_minutes);
        history.retain(|(t, _)| *t >= cutoff);
    }

    /// `(latest - earliest) / duration_minutes` over the current window.
    /// `None` with fewer than two samples or under a minute of span.
    pub fn slope(&self) -> Option<f64> {
        let history = self.history.read();
        let (start_time, start_price) = *history.first()?;
        let (end_time, end_price) = *history.last()?;
        if start_time == end_time {
            return None;
        }
        let duration_mins = (end_time - start_time).num_seconds() as f64 / 60.0;
        if duration_mins < 1.0 {
            return None;
        }
        Some((end_price - start_price) / duration_mins)
    }
}

impl Default for VixSlopeTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fewer_than_two_samples_has_no_slope() {
        let tracker = VixSlopeTracker::new();
        assert!(tracker.slope().is_none());
        tracker.record(Utc::now(), 18.0, 5);
        assert!(tracker.slope().is_none());
    }

    #[test]
    fn positive_slope_on_rising_vix() {
        let tracker = VixSlopeTracker::new();
        let t0 = Utc::now();
        tracker.record(t0, 16.0, 5);
        tracker.record(t0 + Duration::minutes(4), 20.0, 5);
        assert_eq!(tracker.slope(), Some(1.0));
    }

    #[test]
    fn prunes_samples_outside_window() {
        let tracker = VixSlopeTracker::new();
        let t0 = Utc::now();
        tracker.record(t0, 16.0, 5);
        tracker.record(t0 + Duration::minutes(10), 20.0, 5);
        // the first sample fell outside the 5-minute window on the second record.
        assert!(tracker.slope().is_none());
    }

    #[test]
    fn sub_minute_span_has_no_slope() {
        let tracker = VixSlopeTracker::new();
        let t0 = Utc::now();
        tracker.record(t0, 16.0, 5);
        tracker.record(t0 + Duration::seconds(30), 20.0, 5);
        assert!(tracker.slope().is_none());
    }
}
