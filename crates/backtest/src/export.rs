//! SQLite persistence for backtest trades and run summaries.
//!
//! Each stored run gets a label; trades are written as tabular rows with
//! ISO-8601 timestamps next to the raw nanosecond values.

use std::path::Path;

use anyhow::Context;
use chrono::{SecondsFormat, TimeZone, Utc};
use rusqlite::{params, Connection};
use spread_core::TimestampNs;
use tracing::info;

use crate::simulator::BacktestResult;

/// A stored trade row.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRow {
    pub run_label: String,
    pub seq: i64,
    pub open_time: String,
    pub close_time: String,
    pub direction: String,
    pub entry_price_a: Option<f64>,
    pub entry_price_b: Option<f64>,
    pub exit_price_a: Option<f64>,
    pub exit_price_b: Option<f64>,
    pub gross_pnl: f64,
    pub commission: f64,
    pub net_pnl: f64,
    pub close_reason: String,
}

/// SQLite-backed trade store.
pub struct TradeStore {
    conn: Connection,
}

impl TradeStore {
    /// Open (or create) a store at `path`.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening trade store {}", path.display()))?;
        let store = Self::with_connection(conn)?;
        info!(path = %path.display(), "trade store opened");
        Ok(store)
    }

    /// In-memory store.
    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory trade store")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                run_label TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                total_trades INTEGER NOT NULL,
                win_rate REAL NOT NULL,
                gross_pnl REAL NOT NULL,
                net_pnl REAL NOT NULL,
                total_commission REAL NOT NULL,
                max_drawdown REAL NOT NULL,
                sharpe_ratio REAL NOT NULL,
                calmar_ratio REAL NOT NULL,
                var_95 REAL NOT NULL,
                profit_factor REAL,
                roi_pct REAL NOT NULL,
                fill_rate REAL NOT NULL,
                avg_time_to_fill_ms REAL NOT NULL,
                signals_generated INTEGER NOT NULL,
                signals_failed INTEGER NOT NULL,
                forced_unwinds INTEGER NOT NULL,
                dropped_ticks INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS trades (
                run_label TEXT NOT NULL,
                seq INTEGER NOT NULL,
                open_ts_ns INTEGER NOT NULL,
                close_ts_ns INTEGER NOT NULL,
                open_time TEXT NOT NULL,
                close_time TEXT NOT NULL,
                direction TEXT NOT NULL,
                entry_price_a REAL,
                entry_price_b REAL,
                exit_price_a REAL,
                exit_price_b REAL,
                qty REAL NOT NULL,
                gross_pnl REAL NOT NULL,
                commission REAL NOT NULL,
                net_pnl REAL NOT NULL,
                margin_used REAL NOT NULL,
                close_reason TEXT NOT NULL,
                entry_zscore REAL,
                exit_zscore REAL,
                PRIMARY KEY (run_label, seq)
            );

            CREATE INDEX IF NOT EXISTS idx_trades_open ON trades(open_ts_ns);
            "#,
        )
        .context("creating trade store tables")?;

        Ok(Self { conn })
    }

    /// Store a run's summary and trades under `run_label`, replacing any
    /// previous run with the same label.
    pub fn save_run(&mut self, run_label: &str, result: &BacktestResult) -> anyhow::Result<()> {
        let tx = self.conn.transaction().context("starting transaction")?;

        tx.execute("DELETE FROM trades WHERE run_label = ?1", params![run_label])
            .context("clearing previous trades")?;

        let m = &result.metrics;
        let profit_factor = m.profit_factor.is_finite().then_some(m.profit_factor);
        tx.execute(
            r#"
            INSERT OR REPLACE INTO runs
            (run_label, created_at, total_trades, win_rate, gross_pnl, net_pnl, total_commission,
             max_drawdown, sharpe_ratio, calmar_ratio, var_95, profit_factor, roi_pct, fill_rate,
             avg_time_to_fill_ms, signals_generated, signals_failed, forced_unwinds, dropped_ticks)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
            "#,
            params![
                run_label,
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                m.total_trades,
                m.win_rate,
                m.gross_pnl,
                m.net_pnl,
                m.total_commission,
                m.max_drawdown,
                m.sharpe_ratio,
                m.calmar_ratio,
                m.var_95,
                profit_factor,
                m.roi_pct,
                result.fill_stats.fill_rate,
                result.fill_stats.avg_time_to_fill_ms,
                result.signals_generated as i64,
                result.signals_failed as i64,
                result.forced_unwinds as i64,
                result.dropped_ticks() as i64,
            ],
        )
        .context("inserting run summary")?;

        {
            let mut stmt = tx
                .prepare(
                    r#"
                    INSERT INTO trades
                    (run_label, seq, open_ts_ns, close_ts_ns, open_time, close_time, direction,
                     entry_price_a, entry_price_b, exit_price_a, exit_price_b, qty, gross_pnl,
                     commission, net_pnl, margin_used, close_reason, entry_zscore, exit_zscore)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
                    "#,
                )
                .context("preparing trade insert")?;

            for (seq, trade) in result.trades.iter().enumerate() {
                stmt.execute(params![
                    run_label,
                    seq as i64,
                    trade.open_ts,
                    trade.close_ts,
                    iso_time(trade.open_ts),
                    iso_time(trade.close_ts),
                    trade.direction.as_str(),
                    trade.entry_prices.a,
                    trade.entry_prices.b,
                    trade.exit_prices.a,
                    trade.exit_prices.b,
                    trade.qty,
                    trade.gross_pnl,
                    trade.commission,
                    trade.net_pnl,
                    trade.margin_used,
                    trade.close_reason.as_str(),
                    trade.entry_zscore,
                    trade.exit_zscore,
                ])
                .with_context(|| format!("inserting trade {seq}"))?;
            }
        }

        tx.commit().context("committing run")?;
        info!(run_label, trades = result.trades.len(), "run stored");
        Ok(())
    }

    /// Trades stored for a run, in ledger order.
    pub fn load_trades(&self, run_label: &str) -> anyhow::Result<Vec<TradeRow>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT run_label, seq, open_time, close_time, direction, entry_price_a,
                       entry_price_b, exit_price_a, exit_price_b, gross_pnl, commission,
                       net_pnl, close_reason
                FROM trades WHERE run_label = ?1 ORDER BY seq
                "#,
            )
            .context("preparing trade query")?;

        let rows = stmt
            .query_map(params![run_label], |row| {
                Ok(TradeRow {
                    run_label: row.get(0)?,
                    seq: row.get(1)?,
                    open_time: row.get(2)?,
                    close_time: row.get(3)?,
                    direction: row.get(4)?,
                    entry_price_a: row.get(5)?,
                    entry_price_b: row.get(6)?,
                    exit_price_a: row.get(7)?,
                    exit_price_b: row.get(8)?,
                    gross_pnl: row.get(9)?,
                    commission: row.get(10)?,
                    net_pnl: row.get(11)?,
                    close_reason: row.get(12)?,
                })
            })
            .context("querying trades")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("reading trade rows")?;

        Ok(rows)
    }

    /// Labels of all stored runs.
    pub fn run_labels(&self) -> anyhow::Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT run_label FROM runs ORDER BY run_label")
            .context("preparing run query")?;
        let labels = stmt
            .query_map([], |row| row.get(0))
            .context("querying runs")?
            .collect::<rusqlite::Result<Vec<String>>>()
            .context("reading run labels")?;
        Ok(labels)
    }
}

/// Nanosecond timestamp as RFC 3339 UTC with nanosecond precision.
pub fn iso_time(ts_ns: TimestampNs) -> String {
    Utc.timestamp_nanos(ts_ns)
        .to_rfc3339_opts(SecondsFormat::Nanos, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::FillStats;
    use crate::metrics::BacktestMetrics;
    use crate::position::{LegPrices, Trade};
    use spread_core::{CloseReason, SpreadDirection};
    use spread_ingestion::SyncStats;

    fn make_result(n: usize) -> BacktestResult {
        let trades = (0..n)
            .map(|i| Trade {
                open_ts: 1_700_000_000_000_000_000 + i as i64 * 1_000_000_000,
                close_ts: 1_700_000_000_500_000_000 + i as i64 * 1_000_000_000,
                direction: SpreadDirection::LongSpread,
                entry_prices: LegPrices { a: Some(2001.0), b: Some(1990.0) },
                exit_prices: LegPrices { a: Some(2003.0), b: Some(1991.0) },
                qty: 1.0,
                gross_pnl: 1.0,
                commission: 0.4,
                net_pnl: 0.6,
                margin_used: 517.0,
                close_reason: CloseReason::SignalExit,
                entry_zscore: Some(-2.3),
                exit_zscore: Some(-0.2),
                entry_spread: Some(11.0),
                exit_spread: Some(12.0),
                entry_fill_ms: 250.0,
                exit_fill_ms: Some(250.0),
            })
            .collect();

        BacktestResult {
            trades,
            equity_curve: Vec::new(),
            metrics: BacktestMetrics {
                profit_factor: f64::INFINITY,
                ..Default::default()
            },
            fill_stats: FillStats::default(),
            signals_generated: 2 * n as u64,
            signals_failed: 0,
            forced_unwinds: 0,
            sync: SyncStats::default(),
            time_range: None,
        }
    }

    #[test]
    fn test_iso_time() {
        assert_eq!(iso_time(0), "1970-01-01T00:00:00.000000000Z");
        assert_eq!(iso_time(1_500_000_000), "1970-01-01T00:00:01.500000000Z");
    }

    #[test]
    fn test_save_and_load_run() {
        let mut store = TradeStore::in_memory().unwrap();
        store.save_run("baseline", &make_result(3)).unwrap();

        let rows = store.load_trades("baseline").unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].seq, 0);
        assert_eq!(rows[0].direction, "long_spread");
        assert_eq!(rows[0].close_reason, "signal-exit");
        assert_eq!(rows[0].open_time, "2023-11-14T22:13:20.000000000Z");
        assert_eq!(rows[2].entry_price_a, Some(2001.0));
        assert_eq!(store.run_labels().unwrap(), vec!["baseline".to_string()]);
    }

    #[test]
    fn test_save_run_replaces_label() {
        let mut store = TradeStore::in_memory().unwrap();
        store.save_run("r1", &make_result(3)).unwrap();
        store.save_run("r1", &make_result(1)).unwrap();
        store.save_run("r2", &make_result(2)).unwrap();

        assert_eq!(store.load_trades("r1").unwrap().len(), 1);
        assert_eq!(store.load_trades("r2").unwrap().len(), 2);
        assert_eq!(store.run_labels().unwrap().len(), 2);
    }
}
