//! Valuation pipeline.
//!
//! Resolves the symbol universe, then for each symbol, in parallel across
//! symbols:
//!
//! 1. plan the checkpoint (a full rebuild resets it)
//! 2. read new price bars plus the full financial, share and dividend history
//! 3. compute the valuation series on the blocking pool
//! 4. upsert in batches, retrying transient store failures
//! 5. advance the checkpoint once every batch is written
//!
//! A symbol's failure never aborts the run; it is reported in [`RunReport`].

use chrono::{Local, NaiveDate};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};
use zero_common::ValuationConfig;

use crate::checkpoint::{CheckpointManager, CheckpointState, RunMode};
use crate::data::{Repositories, StoreError, ValuationRecord};
use crate::valuation::{compute_symbol, FinancialNormalizer, NormalizeStats, SymbolInputs};

// ============================================================================
// Universe
// ============================================================================

/// Which symbols a run covers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Universe {
    /// Every symbol with price history, minus excluded prefixes
    #[default]
    All,
    /// Exactly these symbols
    Subset(Vec<String>),
}

impl Universe {
    /// `All` for an empty list, otherwise a subset.
    pub fn from_symbols(symbols: &[String]) -> Self {
        if symbols.is_empty() {
            Self::All
        } else {
            Self::Subset(symbols.to_vec())
        }
    }
}

// ============================================================================
// Options
// ============================================================================

/// Pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub mode: RunMode,
    pub universe: Universe,
    /// Symbols processed concurrently
    pub concurrency: usize,
    pub upsert_batch_size: usize,
    pub max_write_retries: u32,
    /// Linear backoff step between write retries
    pub retry_backoff: Duration,
    pub dividend_window_days: u32,
    /// Skip symbols without any statement rows
    pub require_financials: bool,
    /// Prefixes removed from `Universe::All`
    pub exclude_prefixes: Vec<String>,
    /// Calendar day the dividend series is rolled to (defaults to the local date)
    pub today: Option<NaiveDate>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_config(&ValuationConfig::default())
    }
}

impl PipelineOptions {
    pub fn from_config(config: &ValuationConfig) -> Self {
        Self {
            mode: RunMode::from_full_rebuild(config.full_rebuild),
            universe: Universe::from_symbols(&config.symbols),
            concurrency: config.concurrency.max(1),
            upsert_batch_size: config.upsert_batch_size.max(1),
            max_write_retries: config.max_write_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            dividend_window_days: config.dividend_window_days,
            require_financials: config.require_financials,
            exclude_prefixes: config.exclude_prefixes.clone(),
            today: None,
        }
    }

    fn is_excluded(&self, symbol: &str) -> bool {
        self.exclude_prefixes
            .iter()
            .any(|p| !p.is_empty() && symbol.starts_with(p.as_str()))
    }
}

// ============================================================================
// Errors and Outcomes
// ============================================================================

/// Why a symbol was not (fully) valued.
#[derive(Debug, Error)]
pub enum SymbolError {
    #[error("{symbol}: no {what}")]
    MissingInputData { symbol: String, what: &'static str },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("{symbol}: batch upsert failed after {attempts} attempts: {source}")]
    WriteFailed {
        symbol: String,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("Computation failed: {0}")]
    Compute(String),
}

impl SymbolError {
    /// Missing input is a skip, not a failure.
    pub fn is_missing_input(&self) -> bool {
        matches!(self, Self::MissingInputData { .. })
    }
}

/// Summary of a symbol that produced new records.
#[derive(Debug, Clone, Default)]
pub struct SymbolSummary {
    pub rows_written: usize,
    /// New checkpoint
    pub last_date: Option<NaiveDate>,
    /// Bars without a usable close or share count
    pub dropped_days: usize,
    pub normalize_stats: NormalizeStats,
}

/// Result of processing one symbol.
#[derive(Debug)]
pub enum SymbolOutcome {
    Computed(SymbolSummary),
    /// Checkpoint already covers every price bar
    UpToDate,
    Skipped(SymbolError),
    Failed(SymbolError),
}

// ============================================================================
// Pipeline
// ============================================================================

/// Point-in-time valuation pipeline over injected repositories.
pub struct ValuationPipeline {
    repos: Repositories,
    checkpoints: CheckpointManager,
    normalizer: Arc<FinancialNormalizer>,
    options: PipelineOptions,
}

impl ValuationPipeline {
    pub fn new(repos: Repositories, normalizer: FinancialNormalizer, options: PipelineOptions) -> Self {
        Self {
            checkpoints: CheckpointManager::new(repos.checkpoints.clone()),
            repos,
            normalizer: Arc::new(normalizer),
            options,
        }
    }

    /// Build from the `valuation` config section.
    pub fn from_config(repos: Repositories, config: &ValuationConfig) -> Self {
        Self::new(
            repos,
            FinancialNormalizer::new(config.field_aliases.clone()),
            PipelineOptions::from_config(config),
        )
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Symbols covered by this run, in order.
    pub async fn resolve_universe(&self) -> Result<Vec<String>, StoreError> {
        match &self.options.universe {
            Universe::All => {
                let all = self.repos.prices.symbols().await?;
                let total = all.len();
                let kept: Vec<String> = all.into_iter().filter(|s| !self.options.is_excluded(s)).collect();
                debug!(total, kept = kept.len(), "Resolved full universe");
                Ok(kept)
            }
            Universe::Subset(symbols) => {
                let mut seen = std::collections::HashSet::new();
                Ok(symbols
                    .iter()
                    .filter(|s| seen.insert(s.as_str()))
                    .cloned()
                    .collect())
            }
        }
    }

    /// Run one pass over the universe.
    ///
    /// Only a failure to list the universe is returned as an error; per-symbol
    /// problems are collected in the report.
    pub async fn run(&self) -> Result<RunReport, StoreError> {
        let run_id = zero_common::logging::generate_run_id();
        let mode = self.options.mode;
        let span = info_span!("valuation_run", run_id = %run_id, mode = %mode);

        async {
            let start = Instant::now();
            let symbols = self.resolve_universe().await?;
            info!(symbols = symbols.len(), concurrency = self.options.concurrency, "Valuation run started");

            let outcomes: Vec<(String, SymbolOutcome)> = stream::iter(symbols)
                .map(|symbol| async move {
                    let outcome = self.run_symbol(&symbol).await;
                    (symbol, outcome)
                })
                .buffer_unordered(self.options.concurrency)
                .collect()
                .await;

            let mut report = RunReport::new(run_id.clone(), mode);
            for (symbol, outcome) in outcomes {
                report.record(symbol, outcome);
            }
            report.sort();
            report.elapsed = start.elapsed();

            info!(
                computed = report.computed,
                up_to_date = report.up_to_date,
                skipped = report.skipped.len(),
                failed = report.failed.len(),
                rows_written = report.rows_written,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Valuation run finished"
            );

            Ok::<_, StoreError>(report)
        }
        .instrument(span)
        .await
    }

    /// Process one symbol. Never fails; errors become `Skipped` or `Failed`.
    pub async fn run_symbol(&self, symbol: &str) -> SymbolOutcome {
        match self.try_run_symbol(symbol).await {
            Ok(Some(summary)) => {
                info!(
                    symbol,
                    rows = summary.rows_written,
                    last_date = ?summary.last_date,
                    dropped_days = summary.dropped_days,
                    "Symbol valued"
                );
                SymbolOutcome::Computed(summary)
            }
            Ok(None) => {
                debug!(symbol, "Symbol up to date");
                SymbolOutcome::UpToDate
            }
            Err(e) if e.is_missing_input() => {
                warn!(symbol, reason = %e, "Skipping symbol");
                SymbolOutcome::Skipped(e)
            }
            Err(e) => {
                warn!(symbol, error = %e, "Symbol valuation failed");
                SymbolOutcome::Failed(e)
            }
        }
    }

    async fn try_run_symbol(&self, symbol: &str) -> Result<Option<SymbolSummary>, SymbolError> {
        let state = self.checkpoints.plan(symbol, self.options.mode).await?;

        let bars = self.repos.prices.price_bars(symbol, state.resume_after()).await?;
        let Some(last_bar_date) = bars.iter().map(|b| b.trade_date).max() else {
            return match state {
                CheckpointState::Partial(_) => Ok(None),
                CheckpointState::NeverComputed => Err(missing(symbol, "price history")),
            };
        };

        // Full histories: TTM and the dividend window reach back past the checkpoint
        let statements = self.repos.statements.statement_rows(symbol).await?;
        if statements.is_empty() && self.options.require_financials {
            return Err(missing(symbol, "financial statements"));
        }

        let share_events = self.repos.share_capital.share_events(symbol).await?;
        if share_events.is_empty() {
            return Err(missing(symbol, "share capital history"));
        }

        let dividends = self.repos.dividends.dividend_events(symbol).await?;

        debug!(
            symbol,
            %state,
            bars = bars.len(),
            statements = statements.len(),
            share_events = share_events.len(),
            dividends = dividends.len(),
            "Inputs loaded"
        );

        let inputs = SymbolInputs {
            symbol: symbol.to_string(),
            bars,
            statements,
            share_events,
            dividends,
        };
        let normalizer = Arc::clone(&self.normalizer);
        let window = self.options.dividend_window_days;
        let today = self.options.today.unwrap_or_else(|| Local::now().date_naive());

        let valuation = tokio::task::spawn_blocking(move || {
            compute_symbol(inputs, &normalizer, window, today)
        })
        .await
        .map_err(|e| SymbolError::Compute(e.to_string()))?;

        let mut rows_written = 0;
        for batch in valuation.records.chunks(self.options.upsert_batch_size) {
            rows_written += self.write_with_retry(symbol, batch).await?;
        }

        let state = self.checkpoints.advance(symbol, state, last_bar_date).await?;

        Ok(Some(SymbolSummary {
            rows_written,
            last_date: state.resume_after(),
            dropped_days: valuation.dropped_days,
            normalize_stats: valuation.normalize_stats,
        }))
    }

    /// Upsert one batch, retrying recoverable errors with linear backoff.
    async fn write_with_retry(&self, symbol: &str, batch: &[ValuationRecord]) -> Result<usize, SymbolError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.repos.valuations.upsert_valuations(batch).await {
                Ok(written) => return Ok(written),
                Err(e) if e.is_recoverable() && attempt <= self.options.max_write_retries => {
                    let backoff = self.options.retry_backoff * attempt;
                    warn!(
                        symbol,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Batch upsert failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    return Err(SymbolError::WriteFailed {
                        symbol: symbol.to_string(),
                        attempts: attempt,
                        source: e,
                    })
                }
            }
        }
    }
}

fn missing(symbol: &str, what: &'static str) -> SymbolError {
    SymbolError::MissingInputData {
        symbol: symbol.to_string(),
        what,
    }
}

// ============================================================================
// Run Report
// ============================================================================

/// Outcome of one pipeline run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub mode: RunMode,
    pub symbols_total: usize,
    pub computed: usize,
    pub up_to_date: usize,
    /// (symbol, reason) for symbols without enough input
    pub skipped: Vec<(String, String)>,
    /// (symbol, error) for symbols that failed
    pub failed: Vec<(String, String)>,
    pub rows_written: usize,
    pub dropped_days: usize,
    pub data_quality: NormalizeStats,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn new(run_id: String, mode: RunMode) -> Self {
        Self {
            run_id,
            mode,
            symbols_total: 0,
            computed: 0,
            up_to_date: 0,
            skipped: Vec::new(),
            failed: Vec::new(),
            rows_written: 0,
            dropped_days: 0,
            data_quality: NormalizeStats::default(),
            elapsed: Duration::ZERO,
        }
    }

    /// Fold one symbol outcome into the report.
    pub fn record(&mut self, symbol: String, outcome: SymbolOutcome) {
        self.symbols_total += 1;
        match outcome {
            SymbolOutcome::Computed(summary) => {
                self.computed += 1;
                self.rows_written += summary.rows_written;
                self.dropped_days += summary.dropped_days;
                self.data_quality.merge(&summary.normalize_stats);
            }
            SymbolOutcome::UpToDate => self.up_to_date += 1,
            SymbolOutcome::Skipped(reason) => self.skipped.push((symbol, reason.to_string())),
            SymbolOutcome::Failed(error) => self.failed.push((symbol, error.to_string())),
        }
    }

    fn sort(&mut self) {
        self.skipped.sort();
        self.failed.sort();
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Valuation Run Report ===")?;
        writeln!(f, "Run: {} ({})", self.run_id, self.mode)?;
        writeln!(
            f,
            "Symbols: {} total, {} computed, {} up to date, {} skipped, {} failed",
            self.symbols_total,
            self.computed,
            self.up_to_date,
            self.skipped.len(),
            self.failed.len()
        )?;
        writeln!(f, "Rows written: {}", self.rows_written)?;
        if self.dropped_days > 0 {
            writeln!(f, "Days dropped (no close or share count): {}", self.dropped_days)?;
        }
        let q = &self.data_quality;
        if q.temporal_inversions > 0 || q.ambiguous_fields > 0 {
            writeln!(
                f,
                "Statement rows: {} read, {} inverted dates dropped, {} undefined fields",
                q.rows_in, q.temporal_inversions, q.ambiguous_fields
            )?;
        }
        for (symbol, reason) in &self.skipped {
            writeln!(f, "  skipped {}: {}", symbol, reason)?;
        }
        for (symbol, error) in &self.failed {
            writeln!(f, "  FAILED {}: {}", symbol, error)?;
        }
        write!(f, "Elapsed: {:.2}s", self.elapsed.as_secs_f64())
    }
}

// ============================================================================
// Tests
// ============================================================================
