//! Zero Common - Shared configuration and utilities for the Zero valuation services.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Configuration validation
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod logging;
pub mod validation;

pub use config::{Config, FieldAliasConfig, ObservabilityConfig, ValuationConfig};
pub use validation::{Validate, ValidationError, ValidationResult};
