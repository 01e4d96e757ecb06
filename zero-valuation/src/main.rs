//! Zero Valuation - daily point-in-time valuation batch for the Zero ecosystem.
//!
//! Runs one pass over the configured universe and prints the run report.

use anyhow::{Context, Result};
use std::sync::Arc;
use zero_common::config::Config;
use zero_common::logging::init_logging_with_exclusions;
use zero_valuation::{LocalStorage, LocalStorageConfig, Repositories, ValuationPipeline};

#[tokio::main]
async fn main() -> Result<()> {
    let startup_start = std::time::Instant::now();

    let config = Config::load_and_validate()?;

    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::info!("Zero Valuation v{}", env!("CARGO_PKG_VERSION"));

    let storage_config = LocalStorageConfig::from(&config.valuation);
    let storage = Arc::new(
        LocalStorage::new(storage_config)
            .context("Failed to open valuation store")?,
    );

    let pipeline = ValuationPipeline::from_config(Repositories::from_store(storage.clone()), &config.valuation);

    tracing::info!(
        duration_ms = startup_start.elapsed().as_millis() as u64,
        mode = %pipeline.options().mode,
        "Pipeline initialized"
    );

    let report = pipeline
        .run()
        .await
        .context("Failed to list the symbol universe")?;

    println!("{}", report);
    println!("{}", storage.get_stats().await?);

    if report.has_failures() {
        anyhow::bail!("{} symbol(s) failed", report.failed.len());
    }

    Ok(())
}
