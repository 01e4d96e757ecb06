//! Configuration management for Zero services.
//!
//! All Zero services share a unified configuration file at `~/.codecoder/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (ZERO_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `ZERO_LOG_LEVEL` → observability.log_level
//! - `ZERO_VALUATION_DB` → valuation.db_path
//! - `ZERO_VALUATION_CONCURRENCY` → valuation.concurrency
//! - `ZERO_VALUATION_FULL_REBUILD` → valuation.full_rebuild ("1"/"true")

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new()
        .map_or_else(
            || PathBuf::from(".codecoder"),
            |dirs| dirs.home_dir().join(".codecoder"),
        )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Root configuration structure for the valuation service.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// JSON Schema reference
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Point-in-time valuation engine configuration
    #[serde(default)]
    pub valuation: ValuationConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides applied.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup (environment, test fixtures).
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("ZERO_LOG_LEVEL") {
            self.observability.log_level = level;
        }

        if let Some(db) = lookup("ZERO_VALUATION_DB") {
            self.valuation.db_path = db;
        }

        if let Some(concurrency) = lookup("ZERO_VALUATION_CONCURRENCY") {
            match concurrency.parse() {
                Ok(n) => self.valuation.concurrency = n,
                Err(_) => tracing::warn!(value = %concurrency, "Ignoring invalid ZERO_VALUATION_CONCURRENCY"),
            }
        }

        if let Some(flag) = lookup("ZERO_VALUATION_FULL_REBUILD") {
            self.valuation.full_rebuild = matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes");
        }
    }
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    /// Aliases: "level" for backward compatibility with existing config files
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    /// Aliases: "format" for backward compatibility with existing config files
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to exclude from logging.
    ///
    /// These modules will be set to `warn` level to reduce noise.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Valuation Configuration
// ============================================================================

/// Configuration for the daily point-in-time valuation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationConfig {
    /// Path to the SQLite event store (`~` is expanded)
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Number of symbols computed in parallel
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Maximum records per upsert batch
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: usize,

    /// Retries for a failed batch upsert before the batch is reported as fatal
    #[serde(default = "default_max_write_retries")]
    pub max_write_retries: u32,

    /// Linear backoff step between write retries (milliseconds)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Trailing window of the cash-dividend sum, in calendar days
    #[serde(default = "default_dividend_window_days")]
    pub dividend_window_days: u32,

    /// Skip symbols without any financial statements
    #[serde(default = "default_true")]
    pub require_financials: bool,

    /// Symbol prefixes excluded from a full-universe run (Beijing exchange "8xxxxx")
    #[serde(default = "default_exclude_prefixes")]
    pub exclude_prefixes: Vec<String>,

    /// Recompute every symbol from its first trading day
    #[serde(default)]
    pub full_rebuild: bool,

    /// Restrict the run to these symbols (empty = whole universe)
    #[serde(default)]
    pub symbols: Vec<String>,

    /// Vendor line-item aliases for the canonical statement fields
    #[serde(default)]
    pub field_aliases: FieldAliasConfig,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            concurrency: default_concurrency(),
            upsert_batch_size: default_upsert_batch_size(),
            max_write_retries: default_max_write_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            dividend_window_days: default_dividend_window_days(),
            require_financials: true,
            exclude_prefixes: default_exclude_prefixes(),
            full_rebuild: false,
            symbols: Vec::new(),
            field_aliases: FieldAliasConfig::default(),
        }
    }
}

impl ValuationConfig {
    /// Database path with `~` and environment variables expanded.
    pub fn resolved_db_path(&self) -> PathBuf {
        let expanded = shellexpand::full(&self.db_path)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| self.db_path.clone());
        PathBuf::from(expanded)
    }
}

fn default_db_path() -> String {
    "~/.codecoder/valuation.db".into()
}
fn default_concurrency() -> usize {
    8
}
fn default_upsert_batch_size() -> usize {
    2000
}
fn default_max_write_retries() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    500
}
fn default_dividend_window_days() -> u32 {
    395
}
fn default_exclude_prefixes() -> Vec<String> {
    vec!["8".into()]
}
fn default_true() -> bool {
    true
}

/// Canonical statement field → ordered list of acceptable vendor labels.
///
/// The first label carrying a numeric value wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldAliasConfig {
    /// Net profit attributable to the parent company
    #[serde(default = "default_net_profit_aliases")]
    pub net_profit: Vec<String>,

    /// Operating revenue
    #[serde(default = "default_revenue_aliases")]
    pub revenue: Vec<String>,

    /// Shareholders' equity attributable to the parent company
    #[serde(default = "default_total_equity_aliases")]
    pub total_equity: Vec<String>,

    /// Perpetual bonds / preferred shares booked inside equity
    #[serde(default = "default_other_equity_alias")]
    pub other_equity: String,
}

impl Default for FieldAliasConfig {
    fn default() -> Self {
        Self {
            net_profit: default_net_profit_aliases(),
            revenue: default_revenue_aliases(),
            total_equity: default_total_equity_aliases(),
            other_equity: default_other_equity_alias(),
        }
    }
}

fn default_net_profit_aliases() -> Vec<String> {
    vec![
        "归属于母公司所有者的净利润".into(),
        "归属于母公司股东的净利润".into(),
        "归属于母公司的净利润".into(),
        "净利润".into(),
    ]
}
fn default_revenue_aliases() -> Vec<String> {
    vec!["营业总收入".into(), "营业收入".into()]
}
fn default_total_equity_aliases() -> Vec<String> {
    vec![
        "归属于母公司股东权益合计".into(),
        "归属于母公司股东的权益".into(),
        "归属于上市公司股东的权益".into(),
        "所有者权益合计".into(),
        "股东权益合计".into(),
    ]
}
fn default_other_equity_alias() -> String {
    "其他权益工具".into()
}
