//! Local valuation event store using SQLite.
//!
//! Provides persistent storage for:
//! - Daily price bars
//! - Raw financial statement rows (vendor line items kept as JSON)
//! - Share capital changes, recorded in the unit they were published in
//! - Ex-dividend events
//! - Daily valuation output and per-symbol checkpoints
//!
//! All writes are `INSERT OR REPLACE` on the natural key, so re-ingesting
//! the same data is harmless.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::provider::{
    CheckpointRepository, DividendRepository, PriceRepository, ShareCapitalRepository,
    StatementRepository, StoreError, ValuationRepository,
};
use super::{
    DividendEvent, PriceBar, ShareCapitalEvent, ShareUnit, StatementKind, StatementRow,
    ValuationRecord,
};

/// Storage format for every date column.
const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// Database Schema
// ============================================================================

const CREATE_TABLES_SQL: &str = r#"
-- Daily price bars
CREATE TABLE IF NOT EXISTS price_bars (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol TEXT NOT NULL,
    trade_date TEXT NOT NULL,
    close_price REAL NOT NULL,
    float_shares_hint REAL,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(symbol, trade_date)
);

CREATE INDEX IF NOT EXISTS idx_price_bars_symbol_date
ON price_bars(symbol, trade_date);

-- Raw statement rows, one per disclosure
CREATE TABLE IF NOT EXISTS financial_statements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol TEXT NOT NULL,
    kind TEXT NOT NULL,
    report_date TEXT NOT NULL,
    publish_date TEXT NOT NULL,
    items_json TEXT NOT NULL,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(symbol, kind, report_date, publish_date)
);

CREATE INDEX IF NOT EXISTS idx_fs_symbol_report
ON financial_statements(symbol, report_date);

-- Share capital changes
CREATE TABLE IF NOT EXISTS share_capital (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol TEXT NOT NULL,
    effective_date TEXT NOT NULL,
    total_shares REAL NOT NULL,
    float_shares REAL,
    unit TEXT NOT NULL DEFAULT 'shares',
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(symbol, effective_date)
);

CREATE INDEX IF NOT EXISTS idx_share_capital_symbol_date
ON share_capital(symbol, effective_date);

-- Cash dividends by ex-date
CREATE TABLE IF NOT EXISTS dividends (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol TEXT NOT NULL,
    ex_date TEXT NOT NULL,
    cash_dividend_per_share REAL NOT NULL,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(symbol, ex_date)
);

CREATE INDEX IF NOT EXISTS idx_dividends_symbol_date
ON dividends(symbol, ex_date);

-- Daily point-in-time valuation output
CREATE TABLE IF NOT EXISTS valuation_daily (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol TEXT NOT NULL,
    date TEXT NOT NULL,
    close_price REAL NOT NULL,
    total_shares REAL NOT NULL,
    float_shares REAL NOT NULL,
    total_mv REAL NOT NULL,
    circ_mv REAL NOT NULL,
    pe_ttm REAL,
    pe_lf REAL,
    pb_lf REAL,
    ps_ttm REAL,
    roe_ttm REAL,
    eps_ttm REAL,
    bps REAL,
    dv_ratio REAL NOT NULL,
    net_profit_ttm REAL,
    net_profit_lf REAL,
    revenue_ttm REAL,
    equity_adjusted REAL,
    report_date_basis TEXT,
    publish_date_basis TEXT,
    computed_at TEXT DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(symbol, date)
);

CREATE INDEX IF NOT EXISTS idx_valuation_daily_symbol_date
ON valuation_daily(symbol, date DESC);

CREATE INDEX IF NOT EXISTS idx_valuation_daily_pe_ttm
ON valuation_daily(pe_ttm);

CREATE INDEX IF NOT EXISTS idx_valuation_daily_pb_lf
ON valuation_daily(pb_lf);

-- Last computed trading day per symbol
CREATE TABLE IF NOT EXISTS valuation_checkpoints (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol TEXT NOT NULL,
    last_date TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(symbol)
);
"#;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for local storage
#[derive(Debug, Clone)]
pub struct LocalStorageConfig {
    /// Path to SQLite database
    pub db_path: PathBuf,
    /// How long a writer waits on a locked database before giving up
    pub busy_timeout_ms: u64,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            db_path: zero_common::config::config_dir().join("valuation.db"),
            busy_timeout_ms: 5_000,
        }
    }
}

impl From<&zero_common::ValuationConfig> for LocalStorageConfig {
    fn from(config: &zero_common::ValuationConfig) -> Self {
        Self {
            db_path: config.resolved_db_path(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Local Storage
// ============================================================================

/// Local SQLite storage for valuation inputs and outputs
pub struct LocalStorage {
    /// rusqlite::Connection is Send but not Sync, so it sits behind a Mutex
    db: Arc<Mutex<Connection>>,
    config: LocalStorageConfig,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    pub fn new(config: LocalStorageConfig) -> Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&config.db_path)
            .context("Failed to open valuation database")?;

        // WAL lets readers proceed while a batch upsert holds the write lock
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .context("Failed to set database pragmas")?;
        conn.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
            .context("Failed to set busy timeout")?;

        conn.execute_batch(CREATE_TABLES_SQL)
            .context("Failed to create database tables")?;

        info!(db_path = %config.db_path.display(), "Initialized valuation storage");

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            config,
        })
    }

    /// Get the database path
    pub fn db_path(&self) -> &PathBuf {
        &self.config.db_path
    }

    // ========================================================================
    // Ingestion (used by the acquisition layer and fixtures)
    // ========================================================================

    /// Save price bars
    pub async fn save_price_bars(&self, bars: &[PriceBar]) -> Result<usize, StoreError> {
        if bars.is_empty() {
            return Ok(0);
        }

        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO price_bars (symbol, trade_date, close_price, float_shares_hint)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for bar in bars {
                stmt.execute(params![
                    bar.symbol,
                    bar.trade_date.format(DATE_FORMAT).to_string(),
                    bar.close_price,
                    bar.float_shares_hint,
                ])?;
            }
        }
        tx.commit()?;

        debug!(symbol = %bars[0].symbol, count = bars.len(), "Saved price bars");
        Ok(bars.len())
    }

    /// Save raw statement rows
    pub async fn save_statement_rows(&self, rows: &[StatementRow]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO financial_statements
                 (symbol, kind, report_date, publish_date, items_json)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for row in rows {
                stmt.execute(params![
                    row.symbol,
                    row.kind.to_string(),
                    row.report_date.format(DATE_FORMAT).to_string(),
                    row.publish_date.format(DATE_FORMAT).to_string(),
                    serde_json::to_string(&row.items)?,
                ])?;
            }
        }
        tx.commit()?;

        debug!(symbol = %rows[0].symbol, count = rows.len(), "Saved statement rows");
        Ok(rows.len())
    }

    /// Save share capital events whose counts are expressed in `unit`.
    ///
    /// Counts are stored as published and converted to shares on read.
    pub async fn save_share_events(
        &self,
        events: &[ShareCapitalEvent],
        unit: ShareUnit,
    ) -> Result<usize, StoreError> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO share_capital
                 (symbol, effective_date, total_shares, float_shares, unit)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for event in events {
                stmt.execute(params![
                    event.symbol,
                    event.effective_date.format(DATE_FORMAT).to_string(),
                    event.total_shares,
                    event.float_shares,
                    unit.to_string(),
                ])?;
            }
        }
        tx.commit()?;

        debug!(symbol = %events[0].symbol, count = events.len(), %unit, "Saved share capital events");
        Ok(events.len())
    }

    /// Save ex-dividend events
    pub async fn save_dividend_events(&self, events: &[DividendEvent]) -> Result<usize, StoreError> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO dividends (symbol, ex_date, cash_dividend_per_share)
                 VALUES (?1, ?2, ?3)",
            )?;
            for event in events {
                stmt.execute(params![
                    event.symbol,
                    event.ex_date.format(DATE_FORMAT).to_string(),
                    event.cash_dividend_per_share,
                ])?;
            }
        }
        tx.commit()?;

        debug!(symbol = %events[0].symbol, count = events.len(), "Saved dividend events");
        Ok(events.len())
    }

    // ========================================================================
    // Maintenance Operations
    // ========================================================================

    /// Delete every valuation row and checkpoint of a symbol
    pub async fn purge_valuations(&self, symbol: &str) -> Result<usize, StoreError> {
        let db = self.db.lock().await;
        let deleted = db.execute("DELETE FROM valuation_daily WHERE symbol = ?1", params![symbol])?;
        db.execute("DELETE FROM valuation_checkpoints WHERE symbol = ?1", params![symbol])?;
        info!(symbol, deleted, "Purged valuations");
        Ok(deleted)
    }

    /// Get database statistics
    pub async fn get_stats(&self) -> Result<LocalStorageStats> {
        let db = self.db.lock().await;

        let count = |table: &str| -> Result<u64> {
            let n: i64 = db.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
            Ok(n as u64)
        };

        let price_bar_count = count("price_bars")?;
        let statement_count = count("financial_statements")?;
        let share_event_count = count("share_capital")?;
        let dividend_count = count("dividends")?;
        let valuation_count = count("valuation_daily")?;
        let checkpoint_count = count("valuation_checkpoints")?;

        let unique_symbols: i64 = db.query_row(
            "SELECT COUNT(DISTINCT symbol) FROM price_bars",
            [],
            |row| row.get(0),
        )?;

        let file_size = std::fs::metadata(&self.config.db_path)
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(LocalStorageStats {
            price_bar_count,
            statement_count,
            share_event_count,
            dividend_count,
            valuation_count,
            checkpoint_count,
            unique_symbols: unique_symbols as u64,
            db_size_bytes: file_size,
        })
    }

    fn row_to_valuation(row: &rusqlite::Row) -> rusqlite::Result<ValuationRecord> {
        Ok(ValuationRecord {
            symbol: row.get(0)?,
            date: date_column(row, 1)?,
            close_price: row.get(2)?,
            total_shares: row.get(3)?,
            float_shares: row.get(4)?,
            total_mv: row.get(5)?,
            circ_mv: row.get(6)?,
            pe_ttm: row.get(7)?,
            pe_lf: row.get(8)?,
            pb_lf: row.get(9)?,
            ps_ttm: row.get(10)?,
            roe_ttm: row.get(11)?,
            eps_ttm: row.get(12)?,
            bps: row.get(13)?,
            dv_ratio: row.get(14)?,
            net_profit_ttm: row.get(15)?,
            net_profit_lf: row.get(16)?,
            revenue_ttm: row.get(17)?,
            equity_adjusted: row.get(18)?,
            report_date_basis: optional_date_column(row, 19)?,
            publish_date_basis: optional_date_column(row, 20)?,
        })
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}

fn date_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn optional_date_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| {
        NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
    })
    .transpose()
}

// ============================================================================
// Repository Implementations
// ============================================================================

#[async_trait]
impl PriceRepository for LocalStorage {
    async fn symbols(&self) -> Result<Vec<String>, StoreError> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare("SELECT DISTINCT symbol FROM price_bars ORDER BY symbol")?;
        let symbols = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(symbols)
    }

    async fn price_bars(
        &self,
        symbol: &str,
        after: Option<NaiveDate>,
    ) -> Result<Vec<PriceBar>, StoreError> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT symbol, trade_date, close_price, float_shares_hint
             FROM price_bars
             WHERE symbol = ?1 AND (?2 IS NULL OR trade_date > ?2)
             ORDER BY trade_date ASC",
        )?;

        let raw = stmt
            .query_map(
                params![symbol, after.map(|d| d.format(DATE_FORMAT).to_string())],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, Option<f64>>(3)?,
                    ))
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raw.into_iter()
            .map(|(symbol, date, close_price, float_shares_hint)| {
                let trade_date = parse_date(&date).ok_or_else(|| {
                    StoreError::Corrupt(format!("{} price bar has trade_date '{}'", symbol, date))
                })?;
                Ok(PriceBar {
                    symbol,
                    trade_date,
                    close_price,
                    float_shares_hint,
                })
            })
            .collect()
    }
}

#[async_trait]
impl StatementRepository for LocalStorage {
    async fn statement_rows(&self, symbol: &str) -> Result<Vec<StatementRow>, StoreError> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT kind, report_date, publish_date, items_json
             FROM financial_statements
             WHERE symbol = ?1
             ORDER BY report_date ASC, publish_date ASC",
        )?;

        let raw = stmt
            .query_map(params![symbol], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut rows = Vec::with_capacity(raw.len());
        for (kind, report, publish, items_json) in raw {
            let kind = StatementKind::from_str(&kind)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown statement kind '{}'", kind)))?;

            let (Some(report_date), Some(publish_date)) = (parse_date(&report), parse_date(&publish))
            else {
                debug!(symbol, report = %report, publish = %publish, "Dropping statement row with unparsable date");
                continue;
            };

            rows.push(StatementRow {
                symbol: symbol.to_string(),
                kind,
                report_date,
                publish_date,
                items: serde_json::from_str(&items_json)?,
            });
        }

        Ok(rows)
    }
}

#[async_trait]
impl ShareCapitalRepository for LocalStorage {
    async fn share_events(&self, symbol: &str) -> Result<Vec<ShareCapitalEvent>, StoreError> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT effective_date, total_shares, float_shares, unit
             FROM share_capital
             WHERE symbol = ?1
             ORDER BY effective_date ASC",
        )?;

        let raw = stmt
            .query_map(params![symbol], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut events = Vec::with_capacity(raw.len());
        for (date, total, float, unit) in raw {
            let unit = ShareUnit::from_str(&unit)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown share unit '{}'", unit)))?;

            let Some(effective_date) = parse_date(&date) else {
                debug!(symbol, effective_date = %date, "Dropping share event with unparsable date");
                continue;
            };

            events.push(ShareCapitalEvent {
                symbol: symbol.to_string(),
                effective_date,
                total_shares: unit.to_shares(total),
                float_shares: float.map(|f| unit.to_shares(f)),
            });
        }

        Ok(events)
    }
}

#[async_trait]
impl DividendRepository for LocalStorage {
    async fn dividend_events(&self, symbol: &str) -> Result<Vec<DividendEvent>, StoreError> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT ex_date, cash_dividend_per_share
             FROM dividends
             WHERE symbol = ?1
             ORDER BY ex_date ASC",
        )?;

        let raw = stmt
            .query_map(params![symbol], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(raw
            .into_iter()
            .filter_map(|(date, cash)| match parse_date(&date) {
                Some(ex_date) => Some(DividendEvent {
                    symbol: symbol.to_string(),
                    ex_date,
                    cash_dividend_per_share: cash,
                }),
                None => {
                    debug!(symbol, ex_date = %date, "Dropping dividend with unparsable date");
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl ValuationRepository for LocalStorage {
    async fn upsert_valuations(&self, records: &[ValuationRecord]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                r#"
                INSERT OR REPLACE INTO valuation_daily
                (symbol, date, close_price, total_shares, float_shares, total_mv, circ_mv,
                 pe_ttm, pe_lf, pb_lf, ps_ttm, roe_ttm, eps_ttm, bps, dv_ratio,
                 net_profit_ttm, net_profit_lf, revenue_ttm, equity_adjusted,
                 report_date_basis, publish_date_basis, computed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                        ?16, ?17, ?18, ?19, ?20, ?21, ?22)
                "#,
            )?;
            let computed_at = Utc::now().to_rfc3339();
            for r in records {
                stmt.execute(params![
                    r.symbol,
                    r.date.format(DATE_FORMAT).to_string(),
                    r.close_price,
                    r.total_shares,
                    r.float_shares,
                    r.total_mv,
                    r.circ_mv,
                    r.pe_ttm,
                    r.pe_lf,
                    r.pb_lf,
                    r.ps_ttm,
                    r.roe_ttm,
                    r.eps_ttm,
                    r.bps,
                    r.dv_ratio,
                    r.net_profit_ttm,
                    r.net_profit_lf,
                    r.revenue_ttm,
                    r.equity_adjusted,
                    r.report_date_basis.map(|d| d.format(DATE_FORMAT).to_string()),
                    r.publish_date_basis.map(|d| d.format(DATE_FORMAT).to_string()),
                    computed_at,
                ])?;
            }
        }
        tx.commit()?;

        debug!(symbol = %records[0].symbol, count = records.len(), "Upserted valuations");
        Ok(records.len())
    }

    async fn valuations(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<ValuationRecord>, StoreError> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT symbol, date, close_price, total_shares, float_shares, total_mv, circ_mv,
                    pe_ttm, pe_lf, pb_lf, ps_ttm, roe_ttm, eps_ttm, bps, dv_ratio,
                    net_profit_ttm, net_profit_lf, revenue_ttm, equity_adjusted,
                    report_date_basis, publish_date_basis
             FROM valuation_daily
             WHERE symbol = ?1
               AND (?2 IS NULL OR date >= ?2)
               AND (?3 IS NULL OR date <= ?3)
             ORDER BY date ASC",
        )?;

        let records = stmt
            .query_map(
                params![
                    symbol,
                    start.map(|d| d.format(DATE_FORMAT).to_string()),
                    end.map(|d| d.format(DATE_FORMAT).to_string()),
                ],
                Self::row_to_valuation,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }
}

#[async_trait]
impl CheckpointRepository for LocalStorage {
    async fn checkpoint(&self, symbol: &str) -> Result<Option<NaiveDate>, StoreError> {
        let db = self.db.lock().await;
        let result: rusqlite::Result<String> = db.query_row(
            "SELECT last_date FROM valuation_checkpoints WHERE symbol = ?1",
            params![symbol],
            |row| row.get(0),
        );

        match result {
            Ok(date) => parse_date(&date).map(Some).ok_or_else(|| {
                StoreError::Corrupt(format!("{} checkpoint has last_date '{}'", symbol, date))
            }),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_checkpoint(&self, symbol: &str, last_date: NaiveDate) -> Result<(), StoreError> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT OR REPLACE INTO valuation_checkpoints (symbol, last_date, updated_at)
             VALUES (?1, ?2, ?3)",
            params![
                symbol,
                last_date.format(DATE_FORMAT).to_string(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn clear_checkpoint(&self, symbol: &str) -> Result<(), StoreError> {
        let db = self.db.lock().await;
        db.execute(
            "DELETE FROM valuation_checkpoints WHERE symbol = ?1",
            params![symbol],
        )?;
        Ok(())
    }
}

/// Statistics about local storage
#[derive(Debug, Clone)]
pub struct LocalStorageStats {
    pub price_bar_count: u64,
    pub statement_count: u64,
    pub share_event_count: u64,
    pub dividend_count: u64,
    pub valuation_count: u64,
    pub checkpoint_count: u64,
    pub unique_symbols: u64,
    pub db_size_bytes: u64,
}

impl std::fmt::Display for LocalStorageStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "LocalStorage: {} price bars, {} statements, {} share events, {} dividends, {} valuations, {} checkpoints ({} symbols, {:.2} MB)",
            self.price_bar_count,
            self.statement_count,
            self.share_event_count,
            self.dividend_count,
            self.valuation_count,
            self.checkpoint_count,
            self.unique_symbols,
            self.db_size_bytes as f64 / 1_048_576.0
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::{tempdir, TempDir};

    fn create_test_storage() -> (TempDir, LocalStorage) {
        let dir = tempdir().unwrap();
        let config = LocalStorageConfig {
            db_path: dir.path().join("test_valuation.db"),
            ..Default::default()
        };
        let storage = LocalStorage::new(config).unwrap();
        (dir, storage)
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn bar(symbol: &str, day: &str, close: f64) -> PriceBar {
        PriceBar {
            symbol: symbol.to_string(),
            trade_date: date(day),
            close_price: close,
            float_shares_hint: None,
        }
    }

    fn record(symbol: &str, day: &str) -> ValuationRecord {
        ValuationRecord {
            symbol: symbol.to_string(),
            date: date(day),
            close_price: 10.0,
            total_shares: 1_000.0,
            float_shares: 800.0,
            total_mv: 10_000.0,
            circ_mv: 8_000.0,
            pe_ttm: Some(20.0),
            pe_lf: None,
            pb_lf: Some(2.0),
            ps_ttm: None,
            roe_ttm: Some(0.1),
            eps_ttm: Some(0.5),
            bps: Some(5.0),
            dv_ratio: 0.0,
            net_profit_ttm: Some(500.0),
            net_profit_lf: None,
            revenue_ttm: None,
            equity_adjusted: Some(5_000.0),
            report_date_basis: Some(date("2024-03-31")),
            publish_date_basis: Some(date("2024-04-28")),
        }
    }

    #[tokio::test]
    async fn test_storage_creation() {
        let (_dir, storage) = create_test_storage();
        assert!(storage.db_path().ends_with("test_valuation.db"));
        assert!(storage.symbols().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_price_bars_after_checkpoint() {
        let (_dir, storage) = create_test_storage();

        let bars = vec![
            bar("600519", "2024-05-06", 1700.0),
            bar("600519", "2024-05-07", 1710.0),
            bar("600519", "2024-05-08", 1690.0),
            bar("000001", "2024-05-06", 9.5),
        ];
        assert_eq!(storage.save_price_bars(&bars).await.unwrap(), 4);

        let all = storage.price_bars("600519", None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].trade_date < w[1].trade_date));

        let tail = storage.price_bars("600519", Some(date("2024-05-07"))).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].close_price, 1690.0);

        assert_eq!(storage.symbols().await.unwrap(), vec!["000001", "600519"]);
    }

    #[tokio::test]
    async fn test_price_bar_upsert_overwrites() {
        let (_dir, storage) = create_test_storage();

        storage.save_price_bars(&[bar("600519", "2024-05-06", 1700.0)]).await.unwrap();
        storage.save_price_bars(&[bar("600519", "2024-05-06", 1705.5)]).await.unwrap();

        let bars = storage.price_bars("600519", None).await.unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close_price, 1705.5);
    }

    #[tokio::test]
    async fn test_statement_rows_keep_every_disclosure() {
        let (_dir, storage) = create_test_storage();

        let mut items = serde_json::Map::new();
        items.insert("净利润".into(), json!("123.5"));
        let preliminary = StatementRow {
            symbol: "600519".into(),
            kind: StatementKind::Income,
            report_date: date("2023-12-31"),
            publish_date: date("2024-01-20"),
            items: items.clone(),
        };
        let final_report = StatementRow {
            publish_date: date("2024-03-30"),
            ..preliminary.clone()
        };

        storage.save_statement_rows(&[preliminary, final_report]).await.unwrap();

        let rows = storage.statement_rows("600519").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].publish_date, date("2024-03-30"));
        assert_eq!(rows[0].items.get("净利润"), Some(&json!("123.5")));
    }

    #[tokio::test]
    async fn test_share_events_normalized_on_read() {
        let (_dir, storage) = create_test_storage();

        let event = ShareCapitalEvent {
            symbol: "600519".into(),
            effective_date: date("2024-01-02"),
            total_shares: 125_619.78,
            float_shares: Some(125_619.78),
        };
        storage
            .save_share_events(&[event], ShareUnit::TenThousandShares)
            .await
            .unwrap();

        let events = storage.share_events("600519").await.unwrap();
        assert_eq!(events.len(), 1);
        assert!((events[0].total_shares - 1_256_197_800.0).abs() < 1e-3);
        assert!((events[0].float_shares.unwrap() - 1_256_197_800.0).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_unparsable_share_date_is_dropped() {
        let (_dir, storage) = create_test_storage();
        {
            let db = storage.db.lock().await;
            db.execute(
                "INSERT INTO share_capital (symbol, effective_date, total_shares, unit)
                 VALUES ('600519', 'not-a-date', 100.0, 'shares'),
                        ('600519', '2024-01-02', 200.0, 'shares')",
                [],
            )
            .unwrap();
        }

        let events = storage.share_events("600519").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].total_shares, 200.0);
    }

    #[tokio::test]
    async fn test_valuation_upsert_and_range_query() {
        let (_dir, storage) = create_test_storage();

        let records = vec![
            record("600519", "2024-05-06"),
            record("600519", "2024-05-07"),
            record("600519", "2024-05-08"),
        ];
        assert_eq!(storage.upsert_valuations(&records).await.unwrap(), 3);

        let all = storage.valuations("600519", None, None).await.unwrap();
        assert_eq!(all, records);

        let window = storage
            .valuations("600519", Some(date("2024-05-07")), Some(date("2024-05-07")))
            .await
            .unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].pe_lf, None);
        assert_eq!(window[0].publish_date_basis, Some(date("2024-04-28")));
    }

    #[tokio::test]
    async fn test_checkpoint_lifecycle() {
        let (_dir, storage) = create_test_storage();

        assert_eq!(storage.checkpoint("600519").await.unwrap(), None);

        storage.save_checkpoint("600519", date("2024-05-07")).await.unwrap();
        storage.save_checkpoint("600519", date("2024-05-08")).await.unwrap();
        assert_eq!(storage.checkpoint("600519").await.unwrap(), Some(date("2024-05-08")));

        storage.clear_checkpoint("600519").await.unwrap();
        assert_eq!(storage.checkpoint("600519").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_purge_valuations() {
        let (_dir, storage) = create_test_storage();

        storage.upsert_valuations(&[record("600519", "2024-05-06")]).await.unwrap();
        storage.save_checkpoint("600519", date("2024-05-06")).await.unwrap();

        assert_eq!(storage.purge_valuations("600519").await.unwrap(), 1);
        assert!(storage.valuations("600519", None, None).await.unwrap().is_empty());
        assert_eq!(storage.checkpoint("600519").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_stats() {
        let (_dir, storage) = create_test_storage();

        storage.save_price_bars(&[bar("600519", "2024-05-06", 1700.0)]).await.unwrap();
        storage.upsert_valuations(&[record("600519", "2024-05-06")]).await.unwrap();

        let stats = storage.get_stats().await.unwrap();
        assert_eq!(stats.price_bar_count, 1);
        assert_eq!(stats.valuation_count, 1);
        assert_eq!(stats.unique_symbols, 1);
        assert!(stats.to_string().contains("1 price bars"));
    }
}
