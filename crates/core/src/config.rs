//! Configuration structures for the spread-arb system.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Venue;

/// Main configuration for a backtest run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Instrument configuration.
    pub instrument: InstrumentConfig,
    /// Signal configuration.
    pub signal: SignalConfig,
    /// Execution configuration.
    pub execution: ExecutionConfig,
    /// Margin configuration.
    pub margin: MarginConfig,
    /// Backtest configuration.
    pub backtest: BacktestConfig,
}

impl Config {
    /// Parse a JSON document. Missing sections and fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to pretty JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Symbol traded on a venue.
    pub fn symbol(&self, venue: Venue) -> &str {
        match venue {
            Venue::A => &self.instrument.symbol_a,
            Venue::B => &self.instrument.symbol_b,
        }
    }

    /// Venue a symbol is routed to, if it is one of the pair.
    pub fn venue_of(&self, symbol: &str) -> Option<Venue> {
        if symbol == self.instrument.symbol_a {
            Some(Venue::A)
        } else if symbol == self.instrument.symbol_b {
            Some(Venue::B)
        } else {
            None
        }
    }

    /// Margin posted per contract on a venue.
    pub fn margin_for(&self, venue: Venue) -> f64 {
        self.margin
            .margin_per_venue
            .get(self.symbol(venue))
            .copied()
            .unwrap_or(0.0)
    }

    /// Margin used by a full two-leg position.
    pub fn margin_per_trade(&self) -> f64 {
        (self.margin_for(Venue::A) + self.margin_for(Venue::B)) * self.instrument.position_size
    }

    /// Check every parameter, returning a descriptive error for the first violation.
    pub fn validate(&self) -> Result<()> {
        let inst = &self.instrument;
        if inst.symbol_a.trim().is_empty() || inst.symbol_b.trim().is_empty() {
            return Err(Error::config("symbol_a and symbol_b must be non-empty"));
        }
        if inst.symbol_a == inst.symbol_b {
            return Err(Error::config(format!(
                "symbol_a and symbol_b must differ (both are {:?})",
                inst.symbol_a
            )));
        }
        require_positive("position_size", inst.position_size)?;

        let sig = &self.signal;
        if sig.zscore_window < 2 {
            return Err(Error::config(format!(
                "zscore_window must be at least 2, got {}",
                sig.zscore_window
            )));
        }
        require_positive("entry_threshold", sig.entry_threshold)?;
        require_positive("exit_threshold", sig.exit_threshold)?;
        require_positive("stop_loss_threshold", sig.stop_loss_threshold)?;
        if sig.exit_threshold >= sig.entry_threshold {
            return Err(Error::config(format!(
                "exit_threshold ({}) must be below entry_threshold ({})",
                sig.exit_threshold, sig.entry_threshold
            )));
        }
        if sig.entry_threshold >= sig.stop_loss_threshold {
            return Err(Error::config(format!(
                "entry_threshold ({}) must be below stop_loss_threshold ({})",
                sig.entry_threshold, sig.stop_loss_threshold
            )));
        }
        require_positive("min_liquidity", sig.min_liquidity)?;
        require_positive("max_venue_spread", sig.max_venue_spread)?;

        let exec = &self.execution;
        require_non_negative("commission_per_contract", exec.commission_per_contract)?;
        require_non_negative("limit_price_offset", exec.limit_price_offset)?;
        if exec.fill_mode == FillMode::Limit && exec.limit_timeout_ms == 0 {
            return Err(Error::config("limit_timeout_ms must be positive in limit mode"));
        }

        for venue in [Venue::A, Venue::B] {
            let symbol = self.symbol(venue);
            match self.margin.margin_per_venue.get(symbol) {
                Some(m) => require_non_negative(&format!("margin for {symbol}"), *m)?,
                None => {
                    return Err(Error::config(format!(
                        "margin_per_venue has no entry for {symbol}"
                    )))
                }
            }
        }

        require_positive("sharpe_annualization", self.backtest.sharpe_annualization)?;
        Ok(())
    }
}

fn require_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::config(format!("{name} must be positive and finite, got {value}")))
    }
}

fn require_non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(Error::config(format!("{name} must be non-negative and finite, got {value}")))
    }
}

/// Instrument pair configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Symbol on venue A (latent leg).
    pub symbol_a: String,
    /// Symbol on venue B (instant leg).
    pub symbol_b: String,
    /// Contracts per leg.
    pub position_size: f64,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            symbol_a: "GLDG26".to_string(),
            symbol_b: "GOLD-3.26".to_string(),
            position_size: 1.0,
        }
    }
}

/// Signal configuration. Thresholds are in standard deviations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Rolling window for mean/std (snapshots).
    pub zscore_window: usize,
    /// Enter when the directional z-score passes this level.
    pub entry_threshold: f64,
    /// Exit when the z-score reverts inside this level.
    pub exit_threshold: f64,
    /// Stop out when the z-score moves further adverse beyond this level.
    pub stop_loss_threshold: f64,
    /// Minimum quoted quantity on every side for entry.
    pub min_liquidity: f64,
    /// Maximum quoted spread (ask - bid) on either venue for entry.
    pub max_venue_spread: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            zscore_window: 1000,
            entry_threshold: 2.0,
            exit_threshold: 0.5,
            stop_loss_threshold: 4.0,
            min_liquidity: 1.0,
            max_venue_spread: 30.0,
        }
    }
}

/// How venue A orders are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMode {
    /// Cross the spread after the latency delay.
    Market,
    /// Rest a limit order and wait for a price touch until timeout.
    Limit,
}

/// Reference price for venue A limit orders, taken at signal time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitPriceMode {
    Mid,
    Bid,
    Ask,
}

/// When the venue B leg executes in limit mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HedgeTiming {
    /// Venue B trades at market the moment venue A fills.
    OnLatentFill,
    /// Venue B trades at market at signal time; unwound if venue A expires.
    AtSignal,
}

/// Execution configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Fill discipline for venue A.
    pub fill_mode: FillMode,
    /// Order latency to venue A (ms).
    pub latency_ms: u64,
    /// Commission per contract per leg.
    pub commission_per_contract: f64,
    /// Limit order lifetime after reaching the venue (ms).
    pub limit_timeout_ms: u64,
    /// Limit price reference.
    pub limit_price_mode: LimitPriceMode,
    /// Shift of the limit price toward the crossing side.
    pub limit_price_offset: f64,
    /// Venue B timing in limit mode.
    pub hedge_timing: HedgeTiming,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            fill_mode: FillMode::Market,
            latency_ms: 250,
            commission_per_contract: 0.10,
            limit_timeout_ms: 5000,
            limit_price_mode: LimitPriceMode::Mid,
            limit_price_offset: 0.0,
            hedge_timing: HedgeTiming::OnLatentFill,
        }
    }
}

/// Margin configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarginConfig {
    /// Margin per contract, keyed by symbol.
    pub margin_per_venue: BTreeMap<String, f64>,
}

impl Default for MarginConfig {
    fn default() -> Self {
        let mut margin_per_venue = BTreeMap::new();
        margin_per_venue.insert("GLDG26".to_string(), 217.0);
        margin_per_venue.insert("GOLD-3.26".to_string(), 300.0);
        Self { margin_per_venue }
    }
}

/// Backtest configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Periods per year used to annualize the per-trade Sharpe ratio.
    pub sharpe_annualization: f64,
    /// Close any open position at the last quotes when the stream ends.
    pub close_open_position_at_end: bool,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            sharpe_annualization: 252.0,
            close_open_position_at_end: true,
        }
    }
}
