//! Position tracking for backtesting.
//!
//! Holds the single open spread position and realizes a `Trade` each time it
//! goes flat.

use serde::{Deserialize, Serialize};
use spread_core::{CloseReason, Config, Error, Fill, Result, SpreadDirection, TimestampNs, Venue};

/// Entry state of an open spread position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionEntry {
    /// Time the position became open (venue A entry fill).
    pub open_ts: TimestampNs,
    /// Time of the entry signal.
    pub signal_ts: TimestampNs,
    /// Venue A entry fill.
    pub fill_a: Fill,
    /// Venue B entry fill.
    pub fill_b: Fill,
    /// Z-score that triggered the entry.
    pub zscore: Option<f64>,
    /// Signal to completion of both legs (ms).
    pub fill_ms: f64,
}

/// Current position state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Position {
    #[default]
    Flat,
    LongSpread(PositionEntry),
    ShortSpread(PositionEntry),
}

impl Position {
    pub fn is_flat(&self) -> bool {
        matches!(self, Position::Flat)
    }

    /// Direction of the open position.
    pub fn direction(&self) -> Option<SpreadDirection> {
        match self {
            Position::Flat => None,
            Position::LongSpread(_) => Some(SpreadDirection::LongSpread),
            Position::ShortSpread(_) => Some(SpreadDirection::ShortSpread),
        }
    }

    /// Entry details of the open position.
    pub fn entry(&self) -> Option<&PositionEntry> {
        match self {
            Position::Flat => None,
            Position::LongSpread(entry) | Position::ShortSpread(entry) => Some(entry),
        }
    }

    /// Open timestamp of the position.
    pub fn open_ts(&self) -> Option<TimestampNs> {
        self.entry().map(|e| e.open_ts)
    }
}

/// Per-leg prices of a trade; a leg that never traded is `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LegPrices {
    pub a: Option<f64>,
    pub b: Option<f64>,
}

/// Closed trade record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Open timestamp.
    pub open_ts: TimestampNs,
    /// Close timestamp (strictly after open).
    pub close_ts: TimestampNs,
    /// Spread direction.
    pub direction: SpreadDirection,
    /// Entry prices per leg.
    pub entry_prices: LegPrices,
    /// Exit prices per leg.
    pub exit_prices: LegPrices,
    /// Contracts per leg.
    pub qty: f64,
    /// Realized P&L before commission.
    pub gross_pnl: f64,
    /// Commission paid over all fills.
    pub commission: f64,
    /// Realized P&L after commission.
    pub net_pnl: f64,
    /// Margin posted for the trade.
    pub margin_used: f64,
    /// Close reason.
    pub close_reason: CloseReason,
    pub entry_zscore: Option<f64>,
    pub exit_zscore: Option<f64>,
    /// A leg price minus B leg price at entry.
    pub entry_spread: Option<f64>,
    /// A leg price minus B leg price at exit.
    pub exit_spread: Option<f64>,
    /// Entry signal to completion of both legs (ms).
    pub entry_fill_ms: f64,
    /// Exit signal to completion of both legs (ms); `None` for forced closes.
    pub exit_fill_ms: Option<f64>,
}

impl Trade {
    /// Holding time in nanoseconds.
    pub fn duration_ns(&self) -> TimestampNs {
        self.close_ts - self.open_ts
    }

    pub fn is_win(&self) -> bool {
        self.net_pnl > 0.0
    }
}

/// Exit fills handed to the tracker when a position closes.
#[derive(Debug, Clone)]
pub struct ExitFills {
    pub fill_a: Fill,
    pub fill_b: Fill,
    pub reason: CloseReason,
    pub zscore: Option<f64>,
    pub fill_ms: Option<f64>,
}

/// Position tracker and trade ledger.
#[derive(Debug, Clone)]
pub struct PositionTracker {
    /// Current position.
    position: Position,
    /// Closed trades, in close order.
    trades: Vec<Trade>,
    /// Margin per contract on venue A.
    margin_a: f64,
    /// Margin per contract on venue B.
    margin_b: f64,
}

impl PositionTracker {
    /// Create a new position tracker.
    pub fn new(margin_a: f64, margin_b: f64) -> Self {
        Self {
            position: Position::Flat,
            trades: Vec::new(),
            margin_a,
            margin_b,
        }
    }

    /// Create a tracker with the configured venue margins.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.margin_for(Venue::A), config.margin_for(Venue::B))
    }

    /// Current position.
    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Check if there's an open position.
    pub fn has_position(&self) -> bool {
        !self.position.is_flat()
    }

    /// Open a position. Fails if one is already open.
    pub fn open(&mut self, direction: SpreadDirection, entry: PositionEntry) -> Result<()> {
        if let Some(open) = self.position.direction() {
            return Err(Error::other(format!(
                "cannot open {} at {}: {} position already open",
                direction.as_str(),
                entry.open_ts,
                open.as_str()
            )));
        }
        self.position = match direction {
            SpreadDirection::LongSpread => Position::LongSpread(entry),
            SpreadDirection::ShortSpread => Position::ShortSpread(entry),
        };
        Ok(())
    }

    /// Close the open position, returning the realized trade.
    pub fn close(&mut self, exit: ExitFills) -> Option<Trade> {
        let direction = self.position.direction()?;
        let entry = match std::mem::take(&mut self.position) {
            Position::LongSpread(entry) | Position::ShortSpread(entry) => entry,
            Position::Flat => return None,
        };

        let fills = [entry.fill_a, entry.fill_b, exit.fill_a, exit.fill_b];
        let qty = entry.fill_a.qty;
        let trade = Trade {
            open_ts: entry.open_ts,
            close_ts: exit.fill_a.ts_ns.max(entry.open_ts + 1),
            direction,
            entry_prices: LegPrices {
                a: Some(entry.fill_a.price),
                b: Some(entry.fill_b.price),
            },
            exit_prices: LegPrices {
                a: Some(exit.fill_a.price),
                b: Some(exit.fill_b.price),
            },
            qty,
            gross_pnl: 0.0,
            commission: 0.0,
            net_pnl: 0.0,
            margin_used: (self.margin_a + self.margin_b) * qty,
            close_reason: exit.reason,
            entry_zscore: entry.zscore,
            exit_zscore: exit.zscore,
            entry_spread: Some(entry.fill_a.price - entry.fill_b.price),
            exit_spread: Some(exit.fill_a.price - exit.fill_b.price),
            entry_fill_ms: entry.fill_ms,
            exit_fill_ms: exit.fill_ms,
        };

        Some(self.book(trade, &fills))
    }

    /// Book the unwind of a venue B leg whose venue A counterpart never filled.
    pub fn record_unwind(&mut self, direction: SpreadDirection, hedge: Fill, unwind: Fill) -> Trade {
        let open_ts = hedge.ts_ns;
        let trade = Trade {
            open_ts,
            close_ts: unwind.ts_ns.max(open_ts + 1),
            direction,
            entry_prices: LegPrices {
                a: None,
                b: Some(hedge.price),
            },
            exit_prices: LegPrices {
                a: None,
                b: Some(unwind.price),
            },
            qty: hedge.qty,
            gross_pnl: 0.0,
            commission: 0.0,
            net_pnl: 0.0,
            margin_used: self.margin_b * hedge.qty,
            close_reason: CloseReason::Forced,
            entry_zscore: None,
            exit_zscore: None,
            entry_spread: None,
            exit_spread: None,
            entry_fill_ms: 0.0,
            exit_fill_ms: None,
        };

        self.book(trade, &[hedge, unwind])
    }

    /// Fill in P&L from the trade's fills and append it to the ledger.
    fn book(&mut self, mut trade: Trade, fills: &[Fill]) -> Trade {
        trade.gross_pnl = fills.iter().map(Fill::cash_flow).sum();
        trade.commission = fills.iter().map(|f| f.commission).sum();
        trade.net_pnl = trade.gross_pnl - trade.commission;

        self.trades.push(trade.clone());
        trade
    }

    /// All closed trades.
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Consume the tracker, returning the ledger.
    pub fn into_trades(self) -> Vec<Trade> {
        self.trades
    }
}

impl Default for PositionTracker {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
