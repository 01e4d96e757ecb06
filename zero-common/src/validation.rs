//! Configuration validation for Zero services.
//!
//! Provides validation logic for configuration fields to ensure
//! all required values are present and within valid ranges.

use thiserror::Error;

use crate::config::{Config, FieldAliasConfig, ObservabilityConfig, ValuationConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }

        if let Err(e) = self.valuation.validate() {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }

    /// Load (with environment overrides) and validate configuration.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load_with_env()?;
        config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(config)
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!(
                    "must be one of: {}",
                    valid_levels.join(", ")
                ),
            });
        }

        // Validate log format
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!(
                    "must be one of: {}",
                    valid_formats.join(", ")
                ),
            });
        }

        Ok(())
    }
}

impl Validate for ValuationConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.db_path.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "valuation.db_path".into(),
            });
        }

        if self.concurrency == 0 {
            return Err(ValidationError::InvalidValue {
                field: "valuation.concurrency".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.upsert_batch_size == 0 {
            return Err(ValidationError::InvalidValue {
                field: "valuation.upsert_batch_size".into(),
                reason: "must be greater than 0".into(),
            });
        }

        // Anything shorter than a year cannot be a trailing-twelve-month sum
        if self.dividend_window_days < 365 {
            return Err(ValidationError::InvalidValue {
                field: "valuation.dividend_window_days".into(),
                reason: format!("must be at least 365, got {}", self.dividend_window_days),
            });
        }

        // Exclusion only filters a full-universe run; explicit symbols are taken as given.
        // A blank prefix would exclude every symbol.
        if self.exclude_prefixes.iter().any(|p| p.trim().is_empty()) {
            return Err(ValidationError::InvalidValue {
                field: "valuation.exclude_prefixes".into(),
                reason: "must not contain an empty prefix".into(),
            });
        }

        self.field_aliases.validate()
    }
}

impl Validate for FieldAliasConfig {
    fn validate(&self) -> ValidationResult<()> {
        let lists = [
            ("valuation.field_aliases.net_profit", &self.net_profit),
            ("valuation.field_aliases.revenue", &self.revenue),
            ("valuation.field_aliases.total_equity", &self.total_equity),
        ];

        for (field, aliases) in lists {
            if aliases.iter().all(|a| a.trim().is_empty()) {
                return Err(ValidationError::MissingField { field: field.into() });
            }
        }

        if self.other_equity.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "valuation.field_aliases.other_equity".into(),
            });
        }

        Ok(())
    }
}
