//! Indicator computation for the spread-arb system.
//!
//! This crate handles:
//! - Sliding-window mean / variance accumulation
//! - Directional spreads (long and short) per synchronized snapshot
//! - Rolling z-scores of both spreads

pub mod engine;
pub mod rolling;

pub use engine::IndicatorEngine;
pub use rolling::RollingStat;
