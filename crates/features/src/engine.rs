//! Indicator computation engine.
//!
//! Tracks the two directional spreads of each synchronized snapshot and
//! their rolling z-scores.

use spread_core::{Config, SpreadIndicators, SynchronizedSnapshot};
use tracing::debug;

use crate::rolling::RollingStat;

/// Dual-direction spread indicator engine.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    /// Rolling stats over `ask_A - bid_B`.
    long: RollingStat,
    /// Rolling stats over `bid_A - ask_B`.
    short: RollingStat,
    /// Snapshots skipped for invalid quotes.
    skipped_invalid: u64,
}

impl IndicatorEngine {
    /// Create an engine with the given window (in snapshots).
    pub fn new(window: usize) -> Self {
        Self {
            long: RollingStat::new(window),
            short: RollingStat::new(window),
            skipped_invalid: 0,
        }
    }

    /// Create an engine from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.signal.zscore_window)
    }

    /// Process a snapshot and return its indicators.
    ///
    /// A snapshot with an invalid leg leaves the windows untouched and yields
    /// undefined z-scores. Otherwise both spreads enter their windows before
    /// the z-scores are taken, so the current observation is part of the
    /// statistics it is scored against.
    pub fn update(&mut self, snapshot: &SynchronizedSnapshot) -> SpreadIndicators {
        let spread_long = snapshot.spread_long();
        let spread_short = snapshot.spread_short();

        if !snapshot.is_valid() {
            self.skipped_invalid += 1;
            debug!(ts_ns = snapshot.ts_ns, "invalid quotes, indicators not updated");
            return SpreadIndicators::undefined(snapshot.ts_ns, spread_long, spread_short);
        }

        self.long.push(spread_long);
        self.short.push(spread_short);

        SpreadIndicators {
            ts_ns: snapshot.ts_ns,
            spread_long,
            spread_short,
            zscore_long: self.long.zscore(spread_long),
            zscore_short: self.short.zscore(spread_short),
        }
    }

    /// Check if both windows are full.
    pub fn is_ready(&self) -> bool {
        self.long.is_ready() && self.short.is_ready()
    }

    /// Get the rolling window size.
    pub fn window_size(&self) -> usize {
        self.long.window()
    }

    /// Rolling stats of the long-spread series.
    pub fn long_stat(&self) -> &RollingStat {
        &self.long
    }

    /// Rolling stats of the short-spread series.
    pub fn short_stat(&self) -> &RollingStat {
        &self.short
    }

    /// Snapshots skipped because a leg was invalid.
    pub fn skipped_invalid(&self) -> u64 {
        self.skipped_invalid
    }

    /// Clear all state.
    pub fn clear(&mut self) {
        self.long.clear();
        self.short.clear();
        self.skipped_invalid = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use spread_core::{Tick, Venue};
    use statrs::statistics::Statistics;

    fn make_snapshot(ts_ns: i64, bid_a: f64, bid_b: f64) -> SynchronizedSnapshot {
        SynchronizedSnapshot {
            ts_ns,
            updated: Venue::A,
            a: Tick {
                ts_ns,
                venue: Venue::A,
                bid_px: bid_a,
                bid_qty: 1.0,
                ask_px: bid_a + 1.0,
                ask_qty: 1.0,
            },
            b: Tick {
                ts_ns: 0,
                venue: Venue::B,
                bid_px: bid_b,
                bid_qty: 1.0,
                ask_px: bid_b + 1.0,
                ask_qty: 1.0,
            },
        }
    }

    #[test]
    fn test_engine_creation() {
        let engine = IndicatorEngine::from_config(&Config::default());
        assert!(!engine.is_ready());
        assert_eq!(engine.window_size(), 1000);
    }

    #[test]
    fn test_undefined_during_warmup() {
        let mut engine = IndicatorEngine::new(5);
        for i in 0..4 {
            let ind = engine.update(&make_snapshot(i, 1000.0 + i as f64, 990.0));
            assert!(ind.zscore_long.is_none());
            assert!(ind.zscore_short.is_none());
        }
        let ind = engine.update(&make_snapshot(4, 1004.0, 990.0));
        assert!(engine.is_ready());
        assert!(ind.zscore_long.is_some());
        assert!(ind.zscore_short.is_some());
    }

    #[test]
    fn test_spreads() {
        let mut engine = IndicatorEngine::new(3);
        let ind = engine.update(&make_snapshot(1, 1000.0, 990.0));
        // ask_A - bid_B = 1001 - 990, bid_A - ask_B = 1000 - 991
        assert_relative_eq!(ind.spread_long, 11.0);
        assert_relative_eq!(ind.spread_short, 9.0);
    }

    #[test]
    fn test_constant_spread_never_scores() {
        let mut engine = IndicatorEngine::new(10);
        for i in 0..50 {
            let ind = engine.update(&make_snapshot(i, 1000.0, 990.0));
            assert!(ind.zscore_long.is_none());
            assert!(ind.zscore_short.is_none());
        }
    }

    #[test]
    fn test_invalid_snapshot_skipped() {
        let mut engine = IndicatorEngine::new(3);
        engine.update(&make_snapshot(1, 1000.0, 990.0));

        let ind = engine.update(&make_snapshot(2, 0.0, 990.0));
        assert!(ind.zscore_short.is_none());
        assert_eq!(engine.long_stat().count(), 1);
        assert_eq!(engine.skipped_invalid(), 1);
    }

    #[test]
    fn test_zscore_matches_raw_window() {
        let window = 20;
        let mut engine = IndicatorEngine::new(window);
        let mut shorts = Vec::new();

        for i in 0..200_i64 {
            let bid_a = 1000.0 + ((i * 7) % 13) as f64 * 0.5;
            let snap = make_snapshot(i, bid_a, 990.0);
            shorts.push(snap.spread_short());
            let ind = engine.update(&snap);

            if shorts.len() >= window {
                let raw = &shorts[shorts.len() - window..];
                let mean = raw.iter().copied().mean();
                let std = raw.iter().copied().std_dev();
                let expected = (snap.spread_short() - mean) / std;
                assert_relative_eq!(ind.zscore_short.unwrap(), expected, epsilon = 1e-9);
            }
        }
    }
}
