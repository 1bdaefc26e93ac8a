//! Backtest performance metrics.
//!
//! Calculates performance and risk metrics from the trade ledger.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use spread_core::{ns_to_ms, Config, TimestampNs};
use statrs::statistics::Statistics;

use crate::position::Trade;

/// Nanoseconds in a (365-day) year.
const NANOS_PER_YEAR: f64 = 365.0 * 24.0 * 3600.0 * 1e9;

/// Backtest performance metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestMetrics {
    /// Total number of trades.
    pub total_trades: u32,
    /// Number of winning trades.
    pub winning_trades: u32,
    /// Number of losing trades.
    pub losing_trades: u32,
    /// Win rate (0-1).
    pub win_rate: f64,
    /// Gross P&L (before commission).
    pub gross_pnl: f64,
    /// Net P&L (after commission).
    pub net_pnl: f64,
    /// Total commission paid.
    pub total_commission: f64,
    /// Average net P&L per trade.
    pub avg_trade_pnl: f64,
    /// Average winning trade P&L.
    pub avg_win: f64,
    /// Average losing trade P&L.
    pub avg_loss: f64,
    /// Largest winning trade.
    pub largest_win: f64,
    /// Largest losing trade.
    pub largest_loss: f64,
    /// Consecutive wins (max).
    pub max_consecutive_wins: u32,
    /// Consecutive losses (max).
    pub max_consecutive_losses: u32,
    /// Average trade duration in milliseconds.
    pub avg_trade_duration_ms: f64,
    /// Profit factor (winning net / |losing net|).
    pub profit_factor: f64,
    /// Maximum drawdown of realized equity (absolute).
    pub max_drawdown: f64,
    /// Sharpe ratio of per-trade net P&L, annualized.
    pub sharpe_ratio: f64,
    /// Annualized net P&L over max drawdown.
    pub calmar_ratio: f64,
    /// 95% value-at-risk: 5th percentile of trade net P&L.
    pub var_95: f64,
    /// Margin posted per round trip.
    pub margin_per_trade: f64,
    /// Net P&L as a percentage of margin per trade.
    pub roi_pct: f64,
}

/// Equity curve point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub ts_ns: TimestampNs,
    /// Cumulative realized net P&L.
    pub equity: f64,
    /// Peak equity minus equity.
    pub drawdown: f64,
}

/// Metrics calculator.
#[derive(Debug, Clone)]
pub struct MetricsCalculator {
    sharpe_annualization: f64,
    margin_per_trade: f64,
}

impl MetricsCalculator {
    /// Create a new metrics calculator.
    pub fn new(sharpe_annualization: f64, margin_per_trade: f64) -> Self {
        Self {
            sharpe_annualization,
            margin_per_trade,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.backtest.sharpe_annualization, config.margin_per_trade())
    }

    /// Calculate metrics from closed trades.
    ///
    /// `span_ns` is the length of the replayed period, used to annualize the
    /// Calmar ratio.
    pub fn calculate(&self, trades: &[Trade], span_ns: TimestampNs) -> BacktestMetrics {
        let mut metrics = BacktestMetrics {
            margin_per_trade: self.margin_per_trade,
            ..Default::default()
        };
        if trades.is_empty() {
            return metrics;
        }

        // Basic counts
        metrics.total_trades = trades.len() as u32;

        let mut gross_wins = 0.0;
        let mut gross_losses = 0.0;
        let mut total_duration: TimestampNs = 0;

        // Consecutive tracking
        let mut current_wins = 0u32;
        let mut current_losses = 0u32;

        for trade in trades {
            metrics.net_pnl += trade.net_pnl;
            metrics.gross_pnl += trade.gross_pnl;
            metrics.total_commission += trade.commission;
            total_duration += trade.duration_ns();

            if trade.is_win() {
                metrics.winning_trades += 1;
                gross_wins += trade.net_pnl;
                metrics.largest_win = metrics.largest_win.max(trade.net_pnl);

                current_wins += 1;
                current_losses = 0;
                metrics.max_consecutive_wins = metrics.max_consecutive_wins.max(current_wins);
            } else {
                metrics.losing_trades += 1;
                gross_losses += trade.net_pnl.abs();
                metrics.largest_loss = metrics.largest_loss.min(trade.net_pnl);

                current_losses += 1;
                current_wins = 0;
                metrics.max_consecutive_losses = metrics.max_consecutive_losses.max(current_losses);
            }
        }

        // Averages
        let n = metrics.total_trades as f64;
        metrics.win_rate = metrics.winning_trades as f64 / n;
        metrics.avg_trade_pnl = metrics.net_pnl / n;
        metrics.avg_trade_duration_ms = ns_to_ms(total_duration) / n;

        metrics.avg_win = if metrics.winning_trades > 0 {
            gross_wins / metrics.winning_trades as f64
        } else {
            0.0
        };

        metrics.avg_loss = if metrics.losing_trades > 0 {
            -gross_losses / metrics.losing_trades as f64
        } else {
            0.0
        };

        metrics.profit_factor = if gross_losses > 0.0 {
            gross_wins / gross_losses
        } else if gross_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        // Drawdown from the realized equity curve
        let start_ts = trades.first().map(|t| t.open_ts).unwrap_or(0);
        metrics.max_drawdown = self
            .build_equity_curve(trades, start_ts)
            .iter()
            .map(|p| p.drawdown)
            .fold(0.0, f64::max);

        let pnls: Vec<f64> = trades.iter().map(|t| t.net_pnl).collect();
        metrics.sharpe_ratio = self.calculate_sharpe(&pnls);
        metrics.var_95 = value_at_risk(&pnls, 0.95);

        metrics.calmar_ratio = if metrics.max_drawdown > 0.0 && span_ns > 0 {
            let annualized = metrics.net_pnl * (NANOS_PER_YEAR / span_ns as f64);
            annualized / metrics.max_drawdown
        } else {
            0.0
        };

        metrics.roi_pct = if self.margin_per_trade > 0.0 {
            metrics.net_pnl / self.margin_per_trade * 100.0
        } else {
            0.0
        };

        metrics
    }

    /// Build the realized equity curve: a start point, then one point per close.
    pub fn build_equity_curve(&self, trades: &[Trade], start_ts: TimestampNs) -> Vec<EquityPoint> {
        let mut curve = Vec::with_capacity(trades.len() + 1);

        // Starting point
        curve.push(EquityPoint {
            ts_ns: start_ts,
            equity: 0.0,
            drawdown: 0.0,
        });

        let mut equity = 0.0;
        let mut peak = 0.0_f64;

        for trade in trades {
            equity += trade.net_pnl;
            peak = peak.max(equity);

            curve.push(EquityPoint {
                ts_ns: trade.close_ts,
                equity,
                drawdown: peak - equity,
            });
        }

        curve
    }

    /// Sharpe ratio of per-trade P&L: mean over population standard deviation,
    /// scaled by the square root of the annualization factor.
    fn calculate_sharpe(&self, pnls: &[f64]) -> f64 {
        if pnls.len() < 2 {
            return 0.0;
        }

        let mean = pnls.mean();
        let std_dev = pnls.population_std_dev();

        if std_dev > 0.0 && std_dev.is_finite() {
            (mean / std_dev) * self.sharpe_annualization.sqrt()
        } else {
            0.0
        }
    }
}

/// Lower-tail value-at-risk of `pnls` at `confidence`, as a signed P&L.
///
/// The `1 - confidence` quantile with linear interpolation between order
/// statistics.
pub fn value_at_risk(pnls: &[f64], confidence: f64) -> f64 {
    if pnls.is_empty() {
        return 0.0;
    }

    let mut sorted: Vec<OrderedFloat<f64>> = pnls.iter().copied().map(OrderedFloat).collect();
    sorted.sort();

    let rank = (1.0 - confidence).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo].0 + (sorted[hi].0 - sorted[lo].0) * frac
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::LegPrices;
    use approx::assert_relative_eq;
    use spread_core::{CloseReason, SpreadDirection};

    const MS: i64 = 1_000_000;

    fn make_trade(net_pnl: f64, open_ts: i64, close_ts: i64) -> Trade {
        Trade {
            open_ts,
            close_ts,
            direction: SpreadDirection::ShortSpread,
            entry_prices: LegPrices::default(),
            exit_prices: LegPrices::default(),
            qty: 1.0,
            gross_pnl: net_pnl + 0.4,
            commission: 0.4,
            net_pnl,
            margin_used: 517.0,
            close_reason: CloseReason::SignalExit,
            entry_zscore: None,
            exit_zscore: None,
            entry_spread: None,
            exit_spread: None,
            entry_fill_ms: 0.0,
            exit_fill_ms: None,
        }
    }

    fn calculator() -> MetricsCalculator {
        MetricsCalculator::from_config(&Config::default())
    }

    #[test]
    fn test_basic_metrics() {
        let trades = vec![
            make_trade(100.0, 0, 60 * MS),         // Win
            make_trade(-50.0, 60 * MS, 180 * MS),  // Loss
            make_trade(75.0, 180 * MS, 270 * MS),  // Win
        ];

        let metrics = calculator().calculate(&trades, 270 * MS);

        assert_eq!(metrics.total_trades, 3);
        assert_eq!(metrics.winning_trades, 2);
        assert_eq!(metrics.losing_trades, 1);
        assert_relative_eq!(metrics.win_rate, 2.0 / 3.0);
        assert_relative_eq!(metrics.net_pnl, 125.0);
        assert_relative_eq!(metrics.gross_pnl, 126.2, epsilon = 1e-9);
        assert_relative_eq!(metrics.total_commission, 1.2, epsilon = 1e-9);
        assert_relative_eq!(metrics.avg_win, 87.5);
        assert_relative_eq!(metrics.avg_loss, -50.0);
        assert_relative_eq!(metrics.largest_win, 100.0);
        assert_relative_eq!(metrics.largest_loss, -50.0);
        assert_relative_eq!(metrics.profit_factor, 3.5);
        assert_relative_eq!(metrics.avg_trade_duration_ms, 90.0);
        assert_relative_eq!(metrics.max_drawdown, 50.0);
        assert_relative_eq!(metrics.roi_pct, 125.0 / 517.0 * 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_empty_trades() {
        let metrics = calculator().calculate(&[], 0);

        assert_eq!(metrics.total_trades, 0);
        assert_eq!(metrics.net_pnl, 0.0);
        assert_eq!(metrics.sharpe_ratio, 0.0);
        assert_eq!(metrics.profit_factor, 0.0);
        assert_relative_eq!(metrics.margin_per_trade, 517.0);
    }

    #[test]
    fn test_profit_factor_without_losses() {
        let trades = vec![make_trade(10.0, 0, MS), make_trade(5.0, MS, 2 * MS)];
        let metrics = calculator().calculate(&trades, 2 * MS);
        assert!(metrics.profit_factor.is_infinite());
        // No drawdown, no Calmar
        assert_eq!(metrics.calmar_ratio, 0.0);
    }

    #[test]
    fn test_equity_curve() {
        let trades = vec![
            make_trade(100.0, 0, 60 * MS),
            make_trade(-150.0, 60 * MS, 120 * MS), // Creates drawdown
            make_trade(200.0, 120 * MS, 180 * MS),
        ];

        let curve = calculator().build_equity_curve(&trades, 0);

        assert_eq!(curve.len(), 4); // Initial + 3 trades
        assert_relative_eq!(curve[0].equity, 0.0);
        assert_relative_eq!(curve[1].equity, 100.0);
        assert_relative_eq!(curve[2].equity, -50.0);
        assert_relative_eq!(curve[2].drawdown, 150.0);
        assert_relative_eq!(curve[3].drawdown, 0.0);
        assert_eq!(curve[3].ts_ns, 180 * MS);
    }

    #[test]
    fn test_sharpe_matches_reference() {
        let pnls = [10.0, -5.0, 7.5, 3.0, -2.0];
        let trades: Vec<Trade> = pnls
            .iter()
            .enumerate()
            .map(|(i, p)| make_trade(*p, i as i64 * MS, (i as i64 + 1) * MS))
            .collect();

        let metrics = calculator().calculate(&trades, 5 * MS);

        let mean = pnls.iter().sum::<f64>() / 5.0;
        let var = pnls.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / 5.0;
        assert_relative_eq!(metrics.sharpe_ratio, mean / var.sqrt() * 252.0_f64.sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn test_calmar() {
        let trades = vec![make_trade(-10.0, 0, MS), make_trade(30.0, MS, 2 * MS)];
        let year = 365 * 24 * 3600 * 1_000_000_000_i64;

        // One-year span: annualized P&L equals net P&L
        let metrics = calculator().calculate(&trades, year);
        assert_relative_eq!(metrics.max_drawdown, 10.0);
        assert_relative_eq!(metrics.calmar_ratio, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_value_at_risk() {
        // 21 values 0..=20: 5th percentile sits exactly on the value 1
        let pnls: Vec<f64> = (0..=20).rev().map(|v| v as f64).collect();
        assert_relative_eq!(value_at_risk(&pnls, 0.95), 1.0, epsilon = 1e-12);

        // Interpolated: rank 0.05 * 3 = 0.15 between -10 and 0
        assert_relative_eq!(value_at_risk(&[5.0, 0.0, -10.0, 20.0], 0.95), -8.5, epsilon = 1e-12);
        assert_eq!(value_at_risk(&[], 0.95), 0.0);
    }

    #[test]
    fn test_consecutive_wins_losses() {
        let trades = vec![
            make_trade(10.0, 0, 1),
            make_trade(10.0, 1, 2),
            make_trade(10.0, 2, 3), // 3 consecutive wins
            make_trade(-5.0, 3, 4),
            make_trade(-5.0, 4, 5), // 2 consecutive losses
        ];

        let metrics = calculator().calculate(&trades, 5);

        assert_eq!(metrics.max_consecutive_wins, 3);
        assert_eq!(metrics.max_consecutive_losses, 2);
    }
}
