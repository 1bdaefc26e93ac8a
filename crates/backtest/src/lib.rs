//! Backtesting engine for the spread-arb system.
//!
//! This crate provides:
//! - Entry / exit / stop-loss signal state machine over dual z-scores
//! - Latency-aware market and timeout-bounded limit fill simulation
//! - Single-position ledger with commission and margin accounting
//! - Performance and risk metrics
//! - SQLite export of trades and run summaries

pub mod execution;
pub mod export;
pub mod fill_model;
pub mod metrics;
pub mod position;
pub mod signal;
pub mod simulator;

pub use execution::{ExecutionSimulator, FillStats};
pub use export::TradeStore;
pub use fill_model::FillModel;
pub use metrics::{BacktestMetrics, EquityPoint, MetricsCalculator};
pub use position::{Position, PositionTracker, Trade};
pub use signal::SignalStateMachine;
pub use simulator::{BacktestResult, BacktestSimulator};
