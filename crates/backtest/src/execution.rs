//! Execution simulator.
//!
//! Turns signals into venue A orders that reach the venue after the
//! configured latency, and resolves them tick by tick: market orders fill on
//! the first usable venue A quote, limit orders wait for a price touch until
//! their deadline. The venue B leg executes without latency, either together
//! with venue A or, in limit mode with `at_signal` hedging, straight away.

use serde::{Deserialize, Serialize};
use spread_core::{
    ms_to_ns, ns_to_ms, CloseReason, Config, Fill, FillMode, HedgeTiming, Side, SpreadDirection,
    SynchronizedSnapshot, Tick, TimestampNs, Venue,
};
use tracing::debug;

use crate::fill_model::FillModel;

/// What an order is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderIntent {
    /// Open a position.
    Entry,
    /// Close the open position.
    Exit(CloseReason),
}

/// How the venue A order executes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderType {
    /// Take the touch on the first usable quote at or after submission.
    Market,
    /// Rest at `price` until `deadline_ns`.
    Limit { price: f64, deadline_ns: TimestampNs },
}

/// State of the venue B leg while venue A is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum HedgeLeg {
    /// Priced at the signal; booked only if venue A fills.
    Priced(Fill),
    /// Already traded at the signal; must be unwound if venue A expires.
    Executed(Fill),
    /// Trades at market when venue A fills.
    OnFill,
}

/// A venue A order in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub intent: OrderIntent,
    /// Direction of the position being opened or closed.
    pub direction: SpreadDirection,
    /// Venue A side.
    pub side: Side,
    pub qty: f64,
    pub order_type: OrderType,
    /// Time of the signal.
    pub signal_ts: TimestampNs,
    /// Time the order reaches venue A.
    pub submit_ts: TimestampNs,
    pub hedge: HedgeLeg,
    /// Z-score that triggered the order.
    pub zscore: Option<f64>,
}

impl PendingOrder {
    /// Venue B side for this order.
    pub fn hedge_side(&self) -> Side {
        self.side.opposite()
    }

    /// Deadline of a limit order.
    pub fn deadline(&self) -> Option<TimestampNs> {
        match self.order_type {
            OrderType::Market => None,
            OrderType::Limit { deadline_ns, .. } => Some(deadline_ns),
        }
    }
}

/// Both legs of a filled order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedOrder {
    pub intent: OrderIntent,
    pub direction: SpreadDirection,
    pub signal_ts: TimestampNs,
    pub fill_a: Fill,
    pub fill_b: Fill,
    pub zscore: Option<f64>,
}

impl CompletedOrder {
    /// Signal to venue A fill (ms).
    pub fn fill_ms(&self) -> f64 {
        ns_to_ms(self.fill_a.ts_ns - self.signal_ts)
    }
}

/// Resolution of an in-flight order.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    Filled(CompletedOrder),
    Expired(PendingOrder),
}

/// Order fill statistics over venue A orders.
///
/// `fill_rate` blends every order, including the market orders used for
/// stop-losses in limit mode. The `limit_*` fields cover resting limit
/// orders only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FillStats {
    /// Orders submitted.
    pub attempted: u64,
    /// Orders filled.
    pub filled: u64,
    /// Orders expired, cancelled or discarded.
    pub expired: u64,
    /// filled / attempted.
    pub fill_rate: f64,
    /// Mean signal to fill time over filled orders (ms).
    pub avg_time_to_fill_ms: f64,
    /// Limit orders submitted.
    pub limit_attempted: u64,
    /// Limit orders filled.
    pub limit_filled: u64,
    /// limit_filled / limit_attempted.
    pub limit_fill_rate: f64,
}

/// Pending-order execution simulator.
#[derive(Debug, Clone)]
pub struct ExecutionSimulator {
    fill_model: FillModel,
    fill_mode: FillMode,
    hedge_timing: HedgeTiming,
    latency_ns: TimestampNs,
    timeout_ns: TimestampNs,
    qty: f64,
    /// The single order in flight.
    pending: Option<PendingOrder>,
    attempted: u64,
    filled: u64,
    expired: u64,
    limit_attempted: u64,
    limit_filled: u64,
    total_fill_ms: f64,
}

impl ExecutionSimulator {
    /// Create an execution simulator from configuration.
    pub fn new(config: &Config) -> Self {
        Self {
            fill_model: FillModel::from_config(config),
            fill_mode: config.execution.fill_mode,
            hedge_timing: config.execution.hedge_timing,
            latency_ns: ms_to_ns(config.execution.latency_ms),
            timeout_ns: ms_to_ns(config.execution.limit_timeout_ms),
            qty: config.instrument.position_size,
            pending: None,
            attempted: 0,
            filled: 0,
            expired: 0,
            limit_attempted: 0,
            limit_filled: 0,
            total_fill_ms: 0.0,
        }
    }

    pub fn fill_model(&self) -> &FillModel {
        &self.fill_model
    }

    /// Check if an order is in flight.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&PendingOrder> {
        self.pending.as_ref()
    }

    /// Submit an order for a signal on `snapshot`.
    ///
    /// Returns false if an order is already in flight or the signal quotes are
    /// unusable. Stop-loss exits always use market discipline; other exits
    /// never hedge at signal time.
    pub fn submit(
        &mut self,
        intent: OrderIntent,
        direction: SpreadDirection,
        snapshot: &SynchronizedSnapshot,
        zscore: Option<f64>,
    ) -> bool {
        if self.pending.is_some() || !snapshot.is_valid() {
            return false;
        }

        let side = match intent {
            OrderIntent::Entry => direction.entry_side(Venue::A),
            OrderIntent::Exit(_) => direction.exit_side(Venue::A),
        };
        let signal_ts = snapshot.ts_ns;
        let submit_ts = signal_ts.saturating_add(self.latency_ns);

        let use_market = self.fill_mode == FillMode::Market
            || intent == OrderIntent::Exit(CloseReason::StopLoss);
        let order_type = if use_market {
            OrderType::Market
        } else {
            OrderType::Limit {
                price: self.fill_model.limit_price(&snapshot.a, side),
                deadline_ns: submit_ts.saturating_add(self.timeout_ns),
            }
        };

        let signal_hedge = || self.fill_model.market(signal_ts, &snapshot.b, side.opposite(), self.qty);
        let hedge = match (order_type, intent, self.hedge_timing) {
            (OrderType::Market, _, _) => signal_hedge().map(HedgeLeg::Priced),
            (OrderType::Limit { .. }, OrderIntent::Entry, HedgeTiming::AtSignal) => {
                signal_hedge().map(HedgeLeg::Executed)
            }
            (OrderType::Limit { .. }, _, _) => Some(HedgeLeg::OnFill),
        };
        let Some(hedge) = hedge else {
            return false;
        };

        debug!(
            signal_ts_ns = signal_ts,
            submit_ts_ns = submit_ts,
            direction = direction.as_str(),
            side = ?side,
            order_type = ?order_type,
            "order submitted"
        );

        self.attempted += 1;
        if !use_market {
            self.limit_attempted += 1;
        }
        self.pending = Some(PendingOrder {
            intent,
            direction,
            side,
            qty: self.qty,
            order_type,
            signal_ts,
            submit_ts,
            hedge,
            zscore,
        });
        true
    }

    /// Re-evaluate the pending order against the next tick.
    ///
    /// `latest_b` is the most recent venue B quote, used when the hedge trades
    /// on fill.
    pub fn on_tick(&mut self, tick: &Tick, latest_b: &Tick) -> Option<ExecutionEvent> {
        let order = self.pending.as_ref()?;

        if order.deadline().is_some_and(|deadline| tick.ts_ns > deadline) {
            return self.expire().map(ExecutionEvent::Expired);
        }
        if tick.venue != Venue::A || tick.ts_ns < order.submit_ts {
            return None;
        }

        let fill_a = match order.order_type {
            OrderType::Market => self.fill_model.market(tick.ts_ns, tick, order.side, order.qty),
            OrderType::Limit { price, .. } => {
                self.fill_model.limit(tick.ts_ns, order.side, price, tick, order.qty)
            }
        }?;
        let fill_b = match order.hedge {
            HedgeLeg::Priced(fill) | HedgeLeg::Executed(fill) => fill,
            HedgeLeg::OnFill => {
                self.fill_model.market(tick.ts_ns, latest_b, order.hedge_side(), order.qty)?
            }
        };

        let order = self.pending.take()?;
        if matches!(order.order_type, OrderType::Limit { .. }) {
            self.limit_filled += 1;
        }
        let done = CompletedOrder {
            intent: order.intent,
            direction: order.direction,
            signal_ts: order.signal_ts,
            fill_a,
            fill_b,
            zscore: order.zscore,
        };
        self.filled += 1;
        self.total_fill_ms += done.fill_ms();
        debug!(
            ts_ns = fill_a.ts_ns,
            price_a = fill_a.price,
            price_b = fill_b.price,
            fill_ms = done.fill_ms(),
            "order filled"
        );
        Some(ExecutionEvent::Filled(done))
    }

    /// Drop the pending order unfilled (deadline passed or stream ended).
    pub fn expire(&mut self) -> Option<PendingOrder> {
        let order = self.pending.take()?;
        self.expired += 1;
        debug!(
            signal_ts_ns = order.signal_ts,
            submit_ts_ns = order.submit_ts,
            deadline_ns = ?order.deadline(),
            "order expired unfilled"
        );
        Some(order)
    }

    /// Withdraw the pending order before it resolves.
    pub fn cancel(&mut self) -> Option<PendingOrder> {
        let order = self.pending.take()?;
        self.expired += 1;
        debug!(
            signal_ts_ns = order.signal_ts,
            intent = ?order.intent,
            "order cancelled"
        );
        Some(order)
    }

    /// Fill statistics so far.
    pub fn fill_stats(&self) -> FillStats {
        FillStats {
            attempted: self.attempted,
            filled: self.filled,
            expired: self.expired,
            fill_rate: if self.attempted > 0 {
                self.filled as f64 / self.attempted as f64
            } else {
                0.0
            },
            avg_time_to_fill_ms: if self.filled > 0 {
                self.total_fill_ms / self.filled as f64
            } else {
                0.0
            },
            limit_attempted: self.limit_attempted,
            limit_filled: self.limit_filled,
            limit_fill_rate: if self.limit_attempted > 0 {
                self.limit_filled as f64 / self.limit_attempted as f64
            } else {
                0.0
            },
        }
    }
}
