//! Per-venue tick streams.
//!
//! Routes cleaned quote rows into one stream per venue and merges the two
//! streams back into a single causally-ordered tape.

use serde::{Deserialize, Serialize};
use spread_core::{Config, Error, Result, Tick, TimestampNs, Venue};

/// A quote row as handed over by the ingestion collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRecord {
    /// Timestamp in nanoseconds.
    pub ts_ns: TimestampNs,
    /// Venue symbol.
    pub symbol: String,
    pub bid_px: f64,
    pub bid_qty: f64,
    pub ask_px: f64,
    pub ask_qty: f64,
}

/// Statistics about quote routing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingStats {
    /// Total rows seen.
    pub total_rows: u64,
    /// Rows routed to venue A.
    pub routed_a: u64,
    /// Rows routed to venue B.
    pub routed_b: u64,
    /// Rows for symbols outside the pair.
    pub foreign_symbol: u64,
    /// Rows with a zero or negative price.
    pub non_positive_price: u64,
    /// Exact duplicate rows removed.
    pub duplicates: u64,
}

/// Time-ordered ticks of a single venue.
#[derive(Debug, Clone, PartialEq)]
pub struct TickStream {
    venue: Venue,
    ticks: Vec<Tick>,
}

impl TickStream {
    /// Create a stream. Every tick must belong to `venue`.
    pub fn new(venue: Venue, ticks: Vec<Tick>) -> Result<Self> {
        if let Some(bad) = ticks.iter().find(|t| t.venue != venue) {
            return Err(Error::data(format!(
                "tick at {} belongs to venue {} but stream is venue {}",
                bad.ts_ns,
                bad.venue.as_str(),
                venue.as_str()
            )));
        }
        Ok(Self { venue, ticks })
    }

    /// Venue of this stream.
    pub fn venue(&self) -> Venue {
        self.venue
    }

    /// All ticks.
    pub fn ticks(&self) -> &[Tick] {
        &self.ticks
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Timestamps never decrease.
    pub fn is_monotonic(&self) -> bool {
        self.ticks.windows(2).all(|w| w[0].ts_ns <= w[1].ts_ns)
    }

    /// Average quoted spread (ask - bid) over the stream.
    pub fn avg_spread(&self) -> Option<f64> {
        if self.ticks.is_empty() {
            return None;
        }
        let sum: f64 = self.ticks.iter().map(Tick::spread).sum();
        Some(sum / self.ticks.len() as f64)
    }

    /// Timestamp range covered by the stream.
    pub fn time_range(&self) -> Option<(TimestampNs, TimestampNs)> {
        Some((self.ticks.first()?.ts_ns, self.ticks.last()?.ts_ns))
    }
}

/// Split quote rows into the two venue streams of the configured pair.
///
/// Rows with non-positive prices and exact duplicates are dropped; each stream
/// is stably sorted by timestamp.
pub fn route_quotes(config: &Config, records: &[QuoteRecord]) -> (TickStream, TickStream, RoutingStats) {
    let mut stats = RoutingStats::default();
    let mut a = Vec::new();
    let mut b = Vec::new();

    for record in records {
        stats.total_rows += 1;

        let Some(venue) = config.venue_of(&record.symbol) else {
            stats.foreign_symbol += 1;
            continue;
        };
        if record.bid_px <= 0.0 || record.ask_px <= 0.0 {
            stats.non_positive_price += 1;
            continue;
        }

        let tick = Tick {
            ts_ns: record.ts_ns,
            venue,
            bid_px: record.bid_px,
            bid_qty: record.bid_qty,
            ask_px: record.ask_px,
            ask_qty: record.ask_qty,
        };
        match venue {
            Venue::A => a.push(tick),
            Venue::B => b.push(tick),
        }
    }

    for ticks in [&mut a, &mut b] {
        ticks.sort_by_key(|t| t.ts_ns);
        let before = ticks.len();
        ticks.dedup();
        stats.duplicates += (before - ticks.len()) as u64;
    }
    stats.routed_a = a.len() as u64;
    stats.routed_b = b.len() as u64;

    (
        TickStream { venue: Venue::A, ticks: a },
        TickStream { venue: Venue::B, ticks: b },
        stats,
    )
}

/// Merge two venue streams into one tape ordered by timestamp.
///
/// On equal timestamps the venue A tick comes first; within a stream the
/// input order is kept.
pub fn merge_streams(a: &[Tick], b: &[Tick]) -> Vec<Tick> {
    let mut merged = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        if b[j].ts_ns < a[i].ts_ns {
            merged.push(b[j]);
            j += 1;
        } else {
            merged.push(a[i]);
            i += 1;
        }
    }
    merged.extend_from_slice(&a[i..]);
    merged.extend_from_slice(&b[j..]);
    merged
}
