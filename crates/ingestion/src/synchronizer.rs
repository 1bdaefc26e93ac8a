//! Two-venue stream synchronization.
//!
//! Turns the merged tick tape into paired snapshots, carrying forward the last
//! known tick of the venue that did not update.

use serde::{Deserialize, Serialize};
use spread_core::{SynchronizedSnapshot, Tick, TimestampNs, Venue};
use tracing::warn;

use crate::stream::merge_streams;

/// Result of pushing one tick through the synchronizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncOutcome {
    /// Both legs known: a snapshot was emitted.
    Snapshot(SynchronizedSnapshot),
    /// Tick accepted but the other venue has not been seen yet.
    WarmingUp,
    /// Tick older than the previous accepted tick; discarded.
    Dropped,
}

/// Synchronization statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Ticks pushed.
    pub ticks_seen: u64,
    /// Snapshots emitted.
    pub snapshots: u64,
    /// Ticks accepted before both venues were known.
    pub warmup_ticks: u64,
    /// Ticks dropped for arriving out of order.
    pub dropped_out_of_order: u64,
}

/// Merges per-venue ticks into synchronized snapshots.
#[derive(Debug, Default)]
pub struct StreamSynchronizer {
    /// Latest venue A tick.
    last_a: Option<Tick>,
    /// Latest venue B tick.
    last_b: Option<Tick>,
    /// Timestamp of the last accepted tick.
    last_ts: Option<TimestampNs>,
    stats: SyncStats,
}

impl StreamSynchronizer {
    /// Create a new synchronizer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push the next tick of the merged tape.
    pub fn push(&mut self, tick: Tick) -> SyncOutcome {
        self.stats.ticks_seen += 1;

        if let Some(last_ts) = self.last_ts {
            if tick.ts_ns < last_ts {
                self.stats.dropped_out_of_order += 1;
                warn!(
                    ts_ns = tick.ts_ns,
                    last_ts_ns = last_ts,
                    venue = tick.venue.as_str(),
                    "dropping out-of-order tick"
                );
                return SyncOutcome::Dropped;
            }
        }
        self.last_ts = Some(tick.ts_ns);

        match tick.venue {
            Venue::A => self.last_a = Some(tick),
            Venue::B => self.last_b = Some(tick),
        }

        match (self.last_a, self.last_b) {
            (Some(a), Some(b)) => {
                self.stats.snapshots += 1;
                SyncOutcome::Snapshot(SynchronizedSnapshot {
                    ts_ns: tick.ts_ns,
                    updated: tick.venue,
                    a,
                    b,
                })
            }
            _ => {
                self.stats.warmup_ticks += 1;
                SyncOutcome::WarmingUp
            }
        }
    }

    /// Latest tick seen for a venue.
    pub fn latest(&self, venue: Venue) -> Option<&Tick> {
        match venue {
            Venue::A => self.last_a.as_ref(),
            Venue::B => self.last_b.as_ref(),
        }
    }

    /// Both venues have been seen.
    pub fn is_warm(&self) -> bool {
        self.last_a.is_some() && self.last_b.is_some()
    }

    /// Get synchronization statistics.
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Clear all state.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Synchronize two venue streams in one pass.
pub fn synchronize(a: &[Tick], b: &[Tick]) -> (Vec<SynchronizedSnapshot>, SyncStats) {
    let mut sync = StreamSynchronizer::new();
    let snapshots = merge_streams(a, b)
        .into_iter()
        .filter_map(|tick| match sync.push(tick) {
            SyncOutcome::Snapshot(snapshot) => Some(snapshot),
            SyncOutcome::WarmingUp | SyncOutcome::Dropped => None,
        })
        .collect();
    (snapshots, sync.stats)
}
