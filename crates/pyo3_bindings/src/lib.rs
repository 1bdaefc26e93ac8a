//! PyO3 bindings for the spread-arb backtest engine.
//!
//! Exposes to Python:
//! - Tick input records for the two venues
//! - The backtest runner with JSON configuration
//! - Closed trades and run summaries
//! - Logging setup for the Rust side

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use spread_backtest::{BacktestResult as RustBacktestResult, BacktestSimulator, Trade as RustTrade};
use spread_core::{Config, Tick as RustTick, Venue};
use spread_ingestion::TickStream;

fn to_py_err(err: impl std::fmt::Display) -> PyErr {
    PyValueError::new_err(err.to_string())
}

// ============================================================================
// Python-exposed Types
// ============================================================================

/// Top of book quote for one venue. The venue is given by the list it is passed in.
#[pyclass]
#[derive(Clone)]
pub struct Tick {
    #[pyo3(get, set)]
    pub ts_ns: i64,
    #[pyo3(get, set)]
    pub bid_px: f64,
    #[pyo3(get, set)]
    pub bid_qty: f64,
    #[pyo3(get, set)]
    pub ask_px: f64,
    #[pyo3(get, set)]
    pub ask_qty: f64,
}

#[pymethods]
impl Tick {
    #[new]
    fn new(ts_ns: i64, bid_px: f64, bid_qty: f64, ask_px: f64, ask_qty: f64) -> Self {
        Tick { ts_ns, bid_px, bid_qty, ask_px, ask_qty }
    }

    #[getter]
    fn mid(&self) -> f64 {
        (self.bid_px + self.ask_px) / 2.0
    }

    fn __repr__(&self) -> String {
        format!(
            "Tick(ts_ns={}, bid={:.4}x{}, ask={:.4}x{})",
            self.ts_ns, self.bid_px, self.bid_qty, self.ask_px, self.ask_qty
        )
    }
}

impl Tick {
    fn on_venue(&self, venue: Venue) -> RustTick {
        RustTick {
            ts_ns: self.ts_ns,
            venue,
            bid_px: self.bid_px,
            bid_qty: self.bid_qty,
            ask_px: self.ask_px,
            ask_qty: self.ask_qty,
        }
    }
}

/// A closed round trip.
#[pyclass]
#[derive(Clone)]
pub struct Trade {
    #[pyo3(get)]
    pub open_ts: i64,
    #[pyo3(get)]
    pub close_ts: i64,
    #[pyo3(get)]
    pub direction: String,
    #[pyo3(get)]
    pub entry_price_a: Option<f64>,
    #[pyo3(get)]
    pub entry_price_b: Option<f64>,
    #[pyo3(get)]
    pub exit_price_a: Option<f64>,
    #[pyo3(get)]
    pub exit_price_b: Option<f64>,
    #[pyo3(get)]
    pub qty: f64,
    #[pyo3(get)]
    pub gross_pnl: f64,
    #[pyo3(get)]
    pub commission: f64,
    #[pyo3(get)]
    pub net_pnl: f64,
    #[pyo3(get)]
    pub margin_used: f64,
    #[pyo3(get)]
    pub close_reason: String,
    #[pyo3(get)]
    pub entry_zscore: Option<f64>,
    #[pyo3(get)]
    pub exit_zscore: Option<f64>,
    #[pyo3(get)]
    pub entry_fill_ms: f64,
    #[pyo3(get)]
    pub exit_fill_ms: Option<f64>,
}

#[pymethods]
impl Trade {
    #[getter]
    fn duration_ns(&self) -> i64 {
        self.close_ts - self.open_ts
    }

    fn __repr__(&self) -> String {
        format!(
            "Trade({} {} -> {}, net_pnl={:.4}, reason={})",
            self.direction, self.open_ts, self.close_ts, self.net_pnl, self.close_reason
        )
    }
}

impl From<&RustTrade> for Trade {
    fn from(t: &RustTrade) -> Self {
        Trade {
            open_ts: t.open_ts,
            close_ts: t.close_ts,
            direction: t.direction.as_str().to_string(),
            entry_price_a: t.entry_prices.a,
            entry_price_b: t.entry_prices.b,
            exit_price_a: t.exit_prices.a,
            exit_price_b: t.exit_prices.b,
            qty: t.qty,
            gross_pnl: t.gross_pnl,
            commission: t.commission,
            net_pnl: t.net_pnl,
            margin_used: t.margin_used,
            close_reason: t.close_reason.as_str().to_string(),
            entry_zscore: t.entry_zscore,
            exit_zscore: t.exit_zscore,
            entry_fill_ms: t.entry_fill_ms,
            exit_fill_ms: t.exit_fill_ms,
        }
    }
}

/// Trades and summary of one run.
#[pyclass]
pub struct BacktestResult {
    inner: RustBacktestResult,
}

#[pymethods]
impl BacktestResult {
    #[getter]
    fn trades(&self) -> Vec<Trade> {
        self.inner.trades.iter().map(Trade::from).collect()
    }

    #[getter]
    fn net_pnl(&self) -> f64 {
        self.inner.metrics.net_pnl
    }

    #[getter]
    fn sharpe_ratio(&self) -> f64 {
        self.inner.metrics.sharpe_ratio
    }

    #[getter]
    fn max_drawdown(&self) -> f64 {
        self.inner.metrics.max_drawdown
    }

    #[getter]
    fn fill_rate(&self) -> f64 {
        self.inner.fill_stats.fill_rate
    }

    #[getter]
    fn limit_fill_rate(&self) -> f64 {
        self.inner.fill_stats.limit_fill_rate
    }

    #[getter]
    fn signals_generated(&self) -> u64 {
        self.inner.signals_generated
    }

    #[getter]
    fn signals_failed(&self) -> u64 {
        self.inner.signals_failed
    }

    #[getter]
    fn forced_unwinds(&self) -> u64 {
        self.inner.forced_unwinds
    }

    #[getter]
    fn dropped_ticks(&self) -> u64 {
        self.inner.dropped_ticks()
    }

    /// Summary metrics as a JSON object.
    fn metrics_json(&self) -> PyResult<String> {
        serde_json::to_string(&self.inner.metrics).map_err(to_py_err)
    }

    /// The whole result, trades and equity curve included, as JSON.
    fn to_json(&self) -> PyResult<String> {
        serde_json::to_string(&self.inner).map_err(to_py_err)
    }

    fn __repr__(&self) -> String {
        format!(
            "BacktestResult(trades={}, net_pnl={:.4}, fill_rate={:.3})",
            self.inner.trades.len(),
            self.inner.metrics.net_pnl,
            self.inner.fill_stats.fill_rate
        )
    }
}

// ============================================================================
// Module Functions
// ============================================================================

/// Run a backtest over the two venue streams.
///
/// `config_json` may omit any section; missing fields take their defaults.
#[pyfunction]
#[pyo3(signature = (ticks_a, ticks_b, config_json=None))]
fn run_backtest(
    py: Python<'_>,
    ticks_a: Vec<Tick>,
    ticks_b: Vec<Tick>,
    config_json: Option<&str>,
) -> PyResult<BacktestResult> {
    let config = match config_json {
        Some(json) => Config::from_json_str(json).map_err(to_py_err)?,
        None => Config::default(),
    };
    let stream_a = TickStream::new(Venue::A, ticks_a.iter().map(|t| t.on_venue(Venue::A)).collect())
        .map_err(to_py_err)?;
    let stream_b = TickStream::new(Venue::B, ticks_b.iter().map(|t| t.on_venue(Venue::B)).collect())
        .map_err(to_py_err)?;

    let inner = py
        .allow_threads(|| {
            BacktestSimulator::new(config)?.run(stream_a.ticks(), stream_b.ticks())
        })
        .map_err(to_py_err)?;
    Ok(BacktestResult { inner })
}

/// Default configuration as pretty JSON.
#[pyfunction]
fn default_config_json() -> PyResult<String> {
    Config::default().to_json_string().map_err(to_py_err)
}

/// Install a tracing subscriber. `RUST_LOG` takes precedence over `level`.
#[pyfunction]
#[pyo3(signature = (level="info"))]
fn init_logging(level: &str) -> PyResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init()
        .map_err(|e| to_py_err(format!("failed to init logging: {e}")))
}

// ============================================================================
// Module Definition
// ============================================================================

/// Spread Arb - cross-venue spread backtesting from Python.
#[pymodule]
fn spread_arb(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<Tick>()?;
    m.add_class::<Trade>()?;
    m.add_class::<BacktestResult>()?;

    m.add_function(wrap_pyfunction!(run_backtest, m)?)?;
    m.add_function(wrap_pyfunction!(default_config_json, m)?)?;
    m.add_function(wrap_pyfunction!(init_logging, m)?)?;
    Ok(())
}
