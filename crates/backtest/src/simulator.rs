//! Backtest simulator.
//!
//! Replays the merged two-venue tick stream through synchronization,
//! indicators, signals and execution, one tick at a time.

use serde::{Deserialize, Serialize};
use spread_core::{
    Action, CloseReason, Config, Fill, Result, SpreadDirection, SpreadIndicators,
    SynchronizedSnapshot, Tick, TimestampNs, Venue,
};
use spread_features::IndicatorEngine;
use spread_ingestion::{merge_streams, StreamSynchronizer, SyncOutcome, SyncStats};
use tracing::{debug, info, warn};

use crate::execution::{
    CompletedOrder, ExecutionEvent, ExecutionSimulator, FillStats, HedgeLeg, OrderIntent,
    OrderType, PendingOrder,
};
use crate::metrics::{BacktestMetrics, EquityPoint, MetricsCalculator};
use crate::position::{ExitFills, Position, PositionEntry, PositionTracker, Trade};
use crate::signal::SignalStateMachine;

/// Outcome of one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Closed trades in close order.
    pub trades: Vec<Trade>,
    /// Realized equity curve.
    pub equity_curve: Vec<EquityPoint>,
    /// Summary metrics.
    pub metrics: BacktestMetrics,
    /// Venue A order statistics.
    pub fill_stats: FillStats,
    /// Orders submitted on a signal.
    pub signals_generated: u64,
    /// Orders that expired or were discarded unfilled.
    pub signals_failed: u64,
    /// Executed venue B legs unwound after venue A failed.
    pub forced_unwinds: u64,
    /// Stream synchronization counters.
    pub sync: SyncStats,
    /// First and last snapshot timestamps.
    pub time_range: Option<(TimestampNs, TimestampNs)>,
}

impl BacktestResult {
    /// Ticks dropped for arriving out of order.
    pub fn dropped_ticks(&self) -> u64 {
        self.sync.dropped_out_of_order
    }
}

/// Backtest simulator state.
pub struct BacktestSimulator {
    config: Config,
    sync: StreamSynchronizer,
    indicators: IndicatorEngine,
    signal: SignalStateMachine,
    execution: ExecutionSimulator,
    position_tracker: PositionTracker,
    metrics_calculator: MetricsCalculator,
    /// Latest snapshot with both legs valid.
    last_valid: Option<SynchronizedSnapshot>,
    /// Indicators of the latest snapshot.
    last_indicators: Option<SpreadIndicators>,
    first_ts: Option<TimestampNs>,
    last_ts: Option<TimestampNs>,
    signals_generated: u64,
    signals_failed: u64,
    forced_unwinds: u64,
}

impl BacktestSimulator {
    /// Create a new backtest simulator. The configuration is validated first.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            sync: StreamSynchronizer::new(),
            indicators: IndicatorEngine::from_config(&config),
            signal: SignalStateMachine::new(&config.signal),
            execution: ExecutionSimulator::new(&config),
            position_tracker: PositionTracker::from_config(&config),
            metrics_calculator: MetricsCalculator::from_config(&config),
            last_valid: None,
            last_indicators: None,
            first_ts: None,
            last_ts: None,
            signals_generated: 0,
            signals_failed: 0,
            forced_unwinds: 0,
            config,
        })
    }

    /// Run over two venue streams and return the result.
    pub fn run(mut self, ticks_a: &[Tick], ticks_b: &[Tick]) -> Result<BacktestResult> {
        for tick in merge_streams(ticks_a, ticks_b) {
            self.process_tick(tick)?;
        }
        self.finish()
    }

    /// Process the next tick of the merged stream.
    ///
    /// While an order is in flight the tick only serves to resolve it; a tick
    /// that resolves an order never produces a new signal. The one exception
    /// is a resting limit exit, which a stop-loss breach cancels and replaces.
    pub fn process_tick(&mut self, tick: Tick) -> Result<()> {
        let snapshot = match self.sync.push(tick) {
            SyncOutcome::Snapshot(snapshot) => snapshot,
            SyncOutcome::WarmingUp | SyncOutcome::Dropped => return Ok(()),
        };
        self.first_ts.get_or_insert(snapshot.ts_ns);
        self.last_ts = Some(snapshot.ts_ns);

        let indicators = self.indicators.update(&snapshot);
        self.last_indicators = Some(indicators);
        if snapshot.is_valid() {
            self.last_valid = Some(snapshot);
        }

        if self.execution.has_pending() {
            if let Some(event) = self.execution.on_tick(&tick, &snapshot.b) {
                return self.apply_event(event, &snapshot);
            }
            if !self.preempt_resting_exit(&indicators, &snapshot) {
                return Ok(());
            }
        }

        if !snapshot.is_valid() {
            return Ok(());
        }

        let position = self.position_tracker.position();
        let action = self.signal.evaluate(position, &indicators, &snapshot);
        let (intent, direction) = match (action, position.direction()) {
            (Action::Hold, _) => return Ok(()),
            (Action::EnterLongSpread, None) => (OrderIntent::Entry, SpreadDirection::LongSpread),
            (Action::EnterShortSpread, None) => (OrderIntent::Entry, SpreadDirection::ShortSpread),
            (Action::Exit(reason), Some(open)) => (OrderIntent::Exit(reason), open),
            _ => return Ok(()),
        };
        let zscore = indicators.zscore(direction);

        debug!(
            ts_ns = snapshot.ts_ns,
            action = ?action,
            zscore = ?zscore,
            spread_long = indicators.spread_long,
            spread_short = indicators.spread_short,
            "signal"
        );

        if self.execution.submit(intent, direction, &snapshot, zscore) {
            self.signals_generated += 1;
            // Zero latency can fill on the signal tick itself
            if let Some(event) = self.execution.on_tick(&tick, &snapshot.b) {
                self.apply_event(event, &snapshot)?;
            }
        }
        Ok(())
    }

    /// Cancel a resting limit exit when the stop-loss rule fires on this
    /// snapshot. Returns true if the order was cancelled.
    fn preempt_resting_exit(
        &mut self,
        indicators: &SpreadIndicators,
        snapshot: &SynchronizedSnapshot,
    ) -> bool {
        let resting_exit = self.execution.pending().is_some_and(|order| {
            matches!(order.intent, OrderIntent::Exit(CloseReason::SignalExit))
                && matches!(order.order_type, OrderType::Limit { .. })
        });
        if !resting_exit || !snapshot.is_valid() {
            return false;
        }
        let action = self.signal.evaluate(self.position_tracker.position(), indicators, snapshot);
        if action != Action::Exit(CloseReason::StopLoss) {
            return false;
        }
        let Some(order) = self.execution.cancel() else {
            return false;
        };
        self.signals_failed += 1;
        debug!(
            ts_ns = snapshot.ts_ns,
            exit_signal_ts_ns = order.signal_ts,
            zscore = ?indicators.zscore(order.direction),
            "resting exit cancelled for stop-loss"
        );
        true
    }

    fn apply_event(&mut self, event: ExecutionEvent, snapshot: &SynchronizedSnapshot) -> Result<()> {
        match event {
            ExecutionEvent::Filled(done) => self.apply_fill(done),
            ExecutionEvent::Expired(order) => {
                self.apply_expiry(order, snapshot.ts_ns, &snapshot.b);
                Ok(())
            }
        }
    }

    fn apply_fill(&mut self, done: CompletedOrder) -> Result<()> {
        let fill_ms = done.fill_ms();
        match done.intent {
            OrderIntent::Entry => {
                let entry = PositionEntry {
                    open_ts: done.fill_a.ts_ns,
                    signal_ts: done.signal_ts,
                    fill_a: done.fill_a,
                    fill_b: done.fill_b,
                    zscore: done.zscore,
                    fill_ms,
                };
                self.position_tracker.open(done.direction, entry)?;
                info!(
                    ts_ns = done.fill_a.ts_ns,
                    direction = done.direction.as_str(),
                    price_a = done.fill_a.price,
                    price_b = done.fill_b.price,
                    zscore = ?done.zscore,
                    "position opened"
                );
            }
            OrderIntent::Exit(reason) => {
                let exit = ExitFills {
                    fill_a: done.fill_a,
                    fill_b: done.fill_b,
                    reason,
                    zscore: done.zscore,
                    fill_ms: Some(fill_ms),
                };
                if let Some(trade) = self.position_tracker.close(exit) {
                    log_close(&trade);
                }
            }
        }
        Ok(())
    }

    fn apply_expiry(&mut self, order: PendingOrder, ts_ns: TimestampNs, latest_b: &Tick) {
        self.signals_failed += 1;
        if let HedgeLeg::Executed(hedge) = order.hedge {
            self.unwind_hedge(order.direction, hedge, ts_ns, latest_b);
        }
    }

    /// Close out a venue B leg at market after its venue A leg failed.
    fn unwind_hedge(&mut self, direction: SpreadDirection, hedge: Fill, ts_ns: TimestampNs, latest_b: &Tick) {
        let quote = if latest_b.is_valid() {
            Some(*latest_b)
        } else {
            self.last_valid.map(|s| s.b)
        };
        let side = hedge.side.opposite();
        let fill_model = self.execution.fill_model();
        let unwind = quote
            .and_then(|q| fill_model.market(ts_ns, &q, side, hedge.qty))
            .unwrap_or_else(|| fill_model.fill_at(ts_ns, Venue::B, side, hedge.price, hedge.qty));

        let trade = self.position_tracker.record_unwind(direction, hedge, unwind);
        self.forced_unwinds += 1;
        warn!(
            ts_ns,
            direction = direction.as_str(),
            hedge_price = hedge.price,
            unwind_price = unwind.price,
            net_pnl = trade.net_pnl,
            "venue A leg expired, venue B leg force-unwound"
        );
    }

    /// End the run: drop any in-flight order, optionally close the open
    /// position at the last valid quotes, and compute the result.
    pub fn finish(mut self) -> Result<BacktestResult> {
        let end_ts = self.last_ts.unwrap_or(0);

        if let Some(order) = self.execution.expire() {
            debug!(signal_ts_ns = order.signal_ts, "stream ended with order in flight");
            let latest_b = self.sync.latest(Venue::B).copied();
            match latest_b {
                Some(b) => self.apply_expiry(order, end_ts, &b),
                None => self.signals_failed += 1,
            }
        }

        if self.config.backtest.close_open_position_at_end {
            self.close_at_end(end_ts);
        }

        let trades = self.position_tracker.into_trades();
        let (start_ts, span_ns) = match (self.first_ts, self.last_ts) {
            (Some(first), Some(last)) => (first, last - first),
            _ => (0, 0),
        };
        let metrics = self.metrics_calculator.calculate(&trades, span_ns);
        let equity_curve = self.metrics_calculator.build_equity_curve(&trades, start_ts);

        let result = BacktestResult {
            equity_curve,
            metrics,
            fill_stats: self.execution.fill_stats(),
            signals_generated: self.signals_generated,
            signals_failed: self.signals_failed,
            forced_unwinds: self.forced_unwinds,
            sync: self.sync.stats().clone(),
            time_range: self.first_ts.zip(self.last_ts),
            trades,
        };

        info!(
            trades = result.metrics.total_trades,
            net_pnl = result.metrics.net_pnl,
            win_rate = result.metrics.win_rate,
            sharpe = result.metrics.sharpe_ratio,
            max_drawdown = result.metrics.max_drawdown,
            signals = result.signals_generated,
            failed = result.signals_failed,
            dropped_ticks = result.dropped_ticks(),
            "backtest complete"
        );
        Ok(result)
    }

    /// Close the open position at the last valid quotes with reason `forced`.
    fn close_at_end(&mut self, end_ts: TimestampNs) {
        let Some(direction) = self.position_tracker.position().direction() else {
            return;
        };
        let Some(snapshot) = self.last_valid else {
            warn!("no valid quotes to close the open position at end of data");
            return;
        };

        let fill_model = self.execution.fill_model();
        let qty = self.config.instrument.position_size;
        let fills = fill_model
            .market(end_ts, &snapshot.a, direction.exit_side(Venue::A), qty)
            .zip(fill_model.market(end_ts, &snapshot.b, direction.exit_side(Venue::B), qty));
        let Some((fill_a, fill_b)) = fills else {
            return;
        };

        let exit = ExitFills {
            fill_a,
            fill_b,
            reason: CloseReason::Forced,
            zscore: self.last_indicators.and_then(|i| i.zscore(direction)),
            fill_ms: None,
        };
        if let Some(trade) = self.position_tracker.close(exit) {
            log_close(&trade);
        }
    }

    /// Get current position.
    pub fn position(&self) -> &Position {
        self.position_tracker.position()
    }

    /// Get all closed trades.
    pub fn trades(&self) -> &[Trade] {
        self.position_tracker.trades()
    }

    /// Check if an order is in flight.
    pub fn has_pending_order(&self) -> bool {
        self.execution.has_pending()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

fn log_close(trade: &Trade) {
    info!(
        open_ts_ns = trade.open_ts,
        close_ts_ns = trade.close_ts,
        direction = trade.direction.as_str(),
        reason = trade.close_reason.as_str(),
        net_pnl = trade.net_pnl,
        "position closed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: i64 = 1_000_000;

    fn make_tick(ts_ns: i64, venue: Venue, bid: f64) -> Tick {
        Tick {
            ts_ns,
            venue,
            bid_px: bid,
            bid_qty: 5.0,
            ask_px: bid + 1.0,
            ask_qty: 5.0,
        }
    }

    fn small_config() -> Config {
        let mut config = Config::default();
        config.signal.zscore_window = 10;
        config.execution.latency_ms = 0;
        config
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = Config::default();
        config.signal.entry_threshold = -1.0;
        assert!(BacktestSimulator::new(config).is_err());
    }

    #[test]
    fn test_no_trades_before_warmup() {
        let mut sim = BacktestSimulator::new(small_config()).unwrap();
        sim.process_tick(make_tick(0, Venue::B, 990.0)).unwrap();
        for i in 1..10 {
            // Wild moves, but the window is not full yet
            sim.process_tick(make_tick(i * MS, Venue::A, 1000.0 + (i * i) as f64)).unwrap();
        }
        assert!(sim.position().is_flat());
        assert!(!sim.has_pending_order());
    }

    #[test]
    fn test_open_and_close_at_end() {
        let mut sim = BacktestSimulator::new(small_config()).unwrap();
        sim.process_tick(make_tick(0, Venue::B, 990.0)).unwrap();
        for i in 1..=10 {
            let bid = if i % 2 == 0 { 1000.0 } else { 1002.0 };
            sim.process_tick(make_tick(i * MS, Venue::A, bid)).unwrap();
        }
        // Short spread jumps: sell A into the spike
        sim.process_tick(make_tick(11 * MS, Venue::A, 1006.0)).unwrap();
        assert_eq!(sim.position().direction(), Some(SpreadDirection::ShortSpread));
        assert_eq!(sim.position().open_ts(), Some(11 * MS));

        let result = sim.finish().unwrap();
        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.close_reason, CloseReason::Forced);
        assert!(trade.close_ts > trade.open_ts);
        assert_eq!(result.signals_generated, 1);
        assert_eq!(result.fill_stats.filled, 1);
    }

    #[test]
    fn test_finish_without_data() {
        let sim = BacktestSimulator::new(Config::default()).unwrap();
        let result = sim.finish().unwrap();
        assert!(result.trades.is_empty());
        assert_eq!(result.equity_curve.len(), 1);
        assert_eq!(result.time_range, None);
    }
}
