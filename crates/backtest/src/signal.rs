//! Signal state machine.
//!
//! Maps the current position and the dual z-scores to one action. Rules are
//! checked in priority order: stop-loss, the position's own exit, short
//! entry, long entry.

use spread_core::{Action, CloseReason, SignalConfig, SpreadIndicators, SynchronizedSnapshot};
use tracing::debug;

use crate::position::Position;

/// Entry / exit / stop-loss rules over the spread z-scores.
#[derive(Debug, Clone)]
pub struct SignalStateMachine {
    entry_threshold: f64,
    exit_threshold: f64,
    stop_loss_threshold: f64,
    /// Minimum size on every quoted side for an entry.
    min_liquidity: f64,
    /// Maximum quoted spread on either venue for an entry.
    max_venue_spread: f64,
}

impl SignalStateMachine {
    pub fn new(config: &SignalConfig) -> Self {
        Self {
            entry_threshold: config.entry_threshold,
            exit_threshold: config.exit_threshold,
            stop_loss_threshold: config.stop_loss_threshold,
            min_liquidity: config.min_liquidity,
            max_venue_spread: config.max_venue_spread,
        }
    }

    /// Decide what to do on this snapshot.
    ///
    /// An undefined z-score never triggers anything. Exit rules only apply to
    /// snapshots strictly later than the position's open time.
    pub fn evaluate(
        &self,
        position: &Position,
        indicators: &SpreadIndicators,
        snapshot: &SynchronizedSnapshot,
    ) -> Action {
        match position {
            Position::LongSpread(entry) => {
                if indicators.ts_ns <= entry.open_ts {
                    return Action::Hold;
                }
                match indicators.zscore_long {
                    Some(z) if z < -self.stop_loss_threshold => Action::Exit(CloseReason::StopLoss),
                    Some(z) if z > -self.exit_threshold => Action::Exit(CloseReason::SignalExit),
                    _ => Action::Hold,
                }
            }
            Position::ShortSpread(entry) => {
                if indicators.ts_ns <= entry.open_ts {
                    return Action::Hold;
                }
                match indicators.zscore_short {
                    Some(z) if z > self.stop_loss_threshold => Action::Exit(CloseReason::StopLoss),
                    Some(z) if z < self.exit_threshold => Action::Exit(CloseReason::SignalExit),
                    _ => Action::Hold,
                }
            }
            Position::Flat => self.evaluate_entry(indicators, snapshot),
        }
    }

    fn evaluate_entry(&self, indicators: &SpreadIndicators, snapshot: &SynchronizedSnapshot) -> Action {
        let short = indicators.zscore_short.is_some_and(|z| z > self.entry_threshold);
        let long = indicators.zscore_long.is_some_and(|z| z < -self.entry_threshold);
        if !short && !long {
            return Action::Hold;
        }

        if !self.entry_allowed(snapshot) {
            debug!(
                ts_ns = indicators.ts_ns,
                zscore_short = ?indicators.zscore_short,
                zscore_long = ?indicators.zscore_long,
                "entry suppressed by liquidity / venue spread gate"
            );
            return Action::Hold;
        }

        if short {
            Action::EnterShortSpread
        } else {
            Action::EnterLongSpread
        }
    }

    /// Entry gate: enough size on every side and both venues tight enough.
    pub fn entry_allowed(&self, snapshot: &SynchronizedSnapshot) -> bool {
        [&snapshot.a, &snapshot.b].into_iter().all(|tick| {
            tick.bid_qty >= self.min_liquidity
                && tick.ask_qty >= self.min_liquidity
                && tick.spread() <= self.max_venue_spread
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::PositionEntry;
    use spread_core::{Fill, Side, Tick, Venue};

    fn machine() -> SignalStateMachine {
        SignalStateMachine::new(&SignalConfig::default())
    }

    fn make_snapshot(qty: f64, venue_spread: f64) -> SynchronizedSnapshot {
        let tick = |venue, bid: f64| Tick {
            ts_ns: 10,
            venue,
            bid_px: bid,
            bid_qty: qty,
            ask_px: bid + venue_spread,
            ask_qty: qty,
        };
        SynchronizedSnapshot {
            ts_ns: 10,
            updated: Venue::A,
            a: tick(Venue::A, 2000.0),
            b: tick(Venue::B, 1990.0),
        }
    }

    fn indicators(ts_ns: i64, zscore_long: Option<f64>, zscore_short: Option<f64>) -> SpreadIndicators {
        SpreadIndicators {
            ts_ns,
            spread_long: 0.0,
            spread_short: 0.0,
            zscore_long,
            zscore_short,
        }
    }

    fn open(direction_long: bool, open_ts: i64) -> Position {
        let fill = Fill {
            ts_ns: open_ts,
            venue: Venue::A,
            side: Side::Buy,
            price: 2000.0,
            qty: 1.0,
            commission: 0.1,
        };
        let entry = PositionEntry {
            open_ts,
            signal_ts: open_ts,
            fill_a: fill,
            fill_b: Fill { venue: Venue::B, side: Side::Sell, ..fill },
            zscore: None,
            fill_ms: 0.0,
        };
        if direction_long {
            Position::LongSpread(entry)
        } else {
            Position::ShortSpread(entry)
        }
    }

    #[test]
    fn test_flat_entries() {
        let m = machine();
        let snap = make_snapshot(5.0, 1.0);

        assert_eq!(m.evaluate(&Position::Flat, &indicators(10, None, Some(2.5)), &snap), Action::EnterShortSpread);
        assert_eq!(m.evaluate(&Position::Flat, &indicators(10, Some(-2.5), None), &snap), Action::EnterLongSpread);
        assert_eq!(m.evaluate(&Position::Flat, &indicators(10, Some(-1.0), Some(1.9)), &snap), Action::Hold);
    }

    #[test]
    fn test_short_entry_takes_priority() {
        let m = machine();
        let snap = make_snapshot(5.0, 1.0);
        let action = m.evaluate(&Position::Flat, &indicators(10, Some(-3.0), Some(3.0)), &snap);
        assert_eq!(action, Action::EnterShortSpread);
    }

    #[test]
    fn test_undefined_zscores_hold() {
        let m = machine();
        let snap = make_snapshot(5.0, 1.0);
        assert_eq!(m.evaluate(&Position::Flat, &indicators(10, None, None), &snap), Action::Hold);
        assert_eq!(m.evaluate(&open(true, 1), &indicators(10, None, None), &snap), Action::Hold);
        assert_eq!(m.evaluate(&open(false, 1), &indicators(10, None, None), &snap), Action::Hold);
    }

    #[test]
    fn test_entry_gating() {
        let m = machine();
        let ind = indicators(10, None, Some(3.0));

        // Thin book
        assert_eq!(m.evaluate(&Position::Flat, &ind, &make_snapshot(0.5, 1.0)), Action::Hold);
        // Wide venue spread
        assert_eq!(m.evaluate(&Position::Flat, &ind, &make_snapshot(5.0, 31.0)), Action::Hold);
        assert_eq!(m.evaluate(&Position::Flat, &ind, &make_snapshot(5.0, 30.0)), Action::EnterShortSpread);
    }

    #[test]
    fn test_short_exits() {
        let m = machine();
        let snap = make_snapshot(0.0, 50.0); // exits are not gated
        let pos = open(false, 1);

        assert_eq!(m.evaluate(&pos, &indicators(10, None, Some(4.1)), &snap), Action::Exit(CloseReason::StopLoss));
        assert_eq!(m.evaluate(&pos, &indicators(10, None, Some(0.4)), &snap), Action::Exit(CloseReason::SignalExit));
        assert_eq!(m.evaluate(&pos, &indicators(10, None, Some(2.0)), &snap), Action::Hold);
        // Long z-score is irrelevant to a short position
        assert_eq!(m.evaluate(&pos, &indicators(10, Some(-9.0), Some(2.0)), &snap), Action::Hold);
    }

    #[test]
    fn test_long_exits() {
        let m = machine();
        let snap = make_snapshot(5.0, 1.0);
        let pos = open(true, 1);

        assert_eq!(m.evaluate(&pos, &indicators(10, Some(-4.5), None), &snap), Action::Exit(CloseReason::StopLoss));
        assert_eq!(m.evaluate(&pos, &indicators(10, Some(-0.3), None), &snap), Action::Exit(CloseReason::SignalExit));
        assert_eq!(m.evaluate(&pos, &indicators(10, Some(-2.0), None), &snap), Action::Hold);
    }

    #[test]
    fn test_no_exit_on_open_tick() {
        let m = machine();
        let snap = make_snapshot(5.0, 1.0);
        let pos = open(false, 10);
        assert_eq!(m.evaluate(&pos, &indicators(10, None, Some(9.0)), &snap), Action::Hold);
        assert_eq!(m.evaluate(&pos, &indicators(11, None, Some(9.0)), &snap), Action::Exit(CloseReason::StopLoss));
    }
}
