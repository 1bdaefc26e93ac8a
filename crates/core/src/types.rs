//! Core data types for the spread-arb system.

use serde::{Deserialize, Serialize};

/// Timestamp in nanoseconds since Unix epoch (UTC).
pub type TimestampNs = i64;

/// Nanoseconds per millisecond.
pub const NANOS_PER_MS: i64 = 1_000_000;

/// Convert a millisecond duration to nanoseconds, saturating at `i64::MAX`.
#[inline]
pub fn ms_to_ns(ms: u64) -> TimestampNs {
    i64::try_from(ms)
        .unwrap_or(i64::MAX)
        .saturating_mul(NANOS_PER_MS)
}

/// Convert a nanosecond duration to (fractional) milliseconds.
#[inline]
pub fn ns_to_ms(ns: TimestampNs) -> f64 {
    ns as f64 / NANOS_PER_MS as f64
}

/// One of the two venues composing the spread.
///
/// Venue A is the latent ("fast") venue whose orders pay the configured
/// latency; venue B executes instantly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    A,
    B,
}

impl Venue {
    pub fn as_str(self) -> &'static str {
        match self {
            Venue::A => "a",
            Venue::B => "b",
        }
    }
}

/// A top-of-book update for one venue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Timestamp in nanoseconds.
    pub ts_ns: TimestampNs,
    /// Venue that published the update.
    pub venue: Venue,
    /// Best bid price.
    pub bid_px: f64,
    /// Best bid quantity.
    pub bid_qty: f64,
    /// Best ask price.
    pub ask_px: f64,
    /// Best ask quantity.
    pub ask_qty: f64,
}

impl Tick {
    /// Calculate mid price.
    #[inline]
    pub fn mid(&self) -> f64 {
        (self.bid_px + self.ask_px) / 2.0
    }

    /// Calculate quoted spread (ask - bid).
    #[inline]
    pub fn spread(&self) -> f64 {
        self.ask_px - self.bid_px
    }

    /// Both prices positive and finite, book not crossed.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.bid_px.is_finite()
            && self.ask_px.is_finite()
            && self.bid_px > 0.0
            && self.ask_px > 0.0
            && self.bid_px <= self.ask_px
    }

    /// Price a market order on `side` would take (ask for a buy, bid for a sell).
    #[inline]
    pub fn touch_price(&self, side: Side) -> f64 {
        match side {
            Side::Buy => self.ask_px,
            Side::Sell => self.bid_px,
        }
    }

    /// Quantity resting on the side a `side` order would take.
    #[inline]
    pub fn touch_qty(&self, side: Side) -> f64 {
        match side {
            Side::Buy => self.ask_qty,
            Side::Sell => self.bid_qty,
        }
    }
}

/// Both venues' latest ticks at one instant of the merged stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SynchronizedSnapshot {
    /// Timestamp of the tick that produced this snapshot.
    pub ts_ns: TimestampNs,
    /// Venue whose tick produced this snapshot.
    pub updated: Venue,
    /// Latest venue A tick (possibly carried forward).
    pub a: Tick,
    /// Latest venue B tick (possibly carried forward).
    pub b: Tick,
}

impl SynchronizedSnapshot {
    /// Cost to go long the spread: buy A at ask, sell B at bid.
    #[inline]
    pub fn spread_long(&self) -> f64 {
        self.a.ask_px - self.b.bid_px
    }

    /// Proceeds to go short the spread: sell A at bid, buy B at ask.
    #[inline]
    pub fn spread_short(&self) -> f64 {
        self.a.bid_px - self.b.ask_px
    }

    /// Both legs carry valid quotes.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.a.is_valid() && self.b.is_valid()
    }
}

/// Directional spreads and their rolling z-scores for one snapshot.
///
/// A z-score is `None` until the rolling window is full, and whenever the
/// window's standard deviation is zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpreadIndicators {
    pub ts_ns: TimestampNs,
    pub spread_long: f64,
    pub spread_short: f64,
    pub zscore_long: Option<f64>,
    pub zscore_short: Option<f64>,
}

impl SpreadIndicators {
    /// Indicators that carry no signal.
    pub fn undefined(ts_ns: TimestampNs, spread_long: f64, spread_short: f64) -> Self {
        Self {
            ts_ns,
            spread_long,
            spread_short,
            zscore_long: None,
            zscore_short: None,
        }
    }

    /// Z-score of the spread that a position in `direction` trades.
    #[inline]
    pub fn zscore(&self, direction: SpreadDirection) -> Option<f64> {
        match direction {
            SpreadDirection::LongSpread => self.zscore_long,
            SpreadDirection::ShortSpread => self.zscore_short,
        }
    }
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for buy, -1 for sell.
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }

    #[inline]
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Direction of a spread position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpreadDirection {
    /// Buy A, sell B.
    LongSpread,
    /// Sell A, buy B.
    ShortSpread,
}

impl SpreadDirection {
    /// Side traded on `venue` when opening a position in this direction.
    #[inline]
    pub fn entry_side(self, venue: Venue) -> Side {
        match (self, venue) {
            (SpreadDirection::LongSpread, Venue::A) | (SpreadDirection::ShortSpread, Venue::B) => {
                Side::Buy
            }
            (SpreadDirection::LongSpread, Venue::B) | (SpreadDirection::ShortSpread, Venue::A) => {
                Side::Sell
            }
        }
    }

    /// Side traded on `venue` when closing a position in this direction.
    #[inline]
    pub fn exit_side(self, venue: Venue) -> Side {
        self.entry_side(venue).opposite()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SpreadDirection::LongSpread => "long_spread",
            SpreadDirection::ShortSpread => "short_spread",
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CloseReason {
    /// Z-score reverted inside the exit band.
    SignalExit,
    /// Z-score moved further adverse beyond the stop threshold.
    StopLoss,
    /// Unwind of a single filled leg, or end-of-data close.
    Forced,
}

impl CloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::SignalExit => "signal-exit",
            CloseReason::StopLoss => "stop-loss",
            CloseReason::Forced => "forced",
        }
    }
}

/// Action to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Open a long-spread position.
    EnterLongSpread,
    /// Open a short-spread position.
    EnterShortSpread,
    /// Close the current position.
    Exit(CloseReason),
    /// Hold / do nothing.
    Hold,
}

/// Fill information for one simulated leg execution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    /// Timestamp of fill.
    pub ts_ns: TimestampNs,
    /// Venue the leg executed on.
    pub venue: Venue,
    /// Side of the fill.
    pub side: Side,
    /// Fill price.
    pub price: f64,
    /// Fill quantity (contracts, positive).
    pub qty: f64,
    /// Commission paid (positive).
    pub commission: f64,
}

impl Fill {
    /// Signed cash flow of this fill before commission (negative when buying).
    #[inline]
    pub fn cash_flow(&self) -> f64 {
        -self.side.sign() * self.price * self.qty
    }
}
