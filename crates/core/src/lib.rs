//! Core types and configuration for the spread-arb system.
//!
//! This crate provides shared types used across all other crates:
//! - Market data types (ticks, synchronized snapshots, spread indicators)
//! - Order and position vocabulary (sides, directions, fills, actions)
//! - Configuration structures
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    BacktestConfig, Config, ExecutionConfig, FillMode, HedgeTiming, InstrumentConfig,
    LimitPriceMode, MarginConfig, SignalConfig,
};
pub use error::{Error, Result};
pub use types::*;
