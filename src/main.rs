//! Graph Database Backup Job
//!
//! One-shot backup, consistency check, upload and aggregation for a clustered graph
//! database, driven entirely by environment variables.

// graphdb-backup/src/main.rs
mod admin;
mod backup;
mod config;
mod errors;
mod storage;
mod utils;

use anyhow::{Context, Result};
use std::process::ExitCode;
use tracing::{error, info};

use backup::RunOutcome;
use config::AppConfig;

/// Main entry point for the backup job
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    utils::init_tracing();

    match run_app().await {
        Ok(_) => {
            info!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration from environment")?;
    info!(
        aggregate = config.aggregate.enabled,
        provider = %config.storage.provider,
        output_dir = %config.output_dir.display(),
        "Starting backup job"
    );

    let outcome = backup::run_backup_flow(&config)
        .await
        .context("Backup job failed")?;

    match outcome {
        RunOutcome::Backup(artifacts) => {
            info!(backups = ?artifacts.backups, reports = ?artifacts.reports, "Artifacts produced");
        }
        RunOutcome::Aggregated(chains) => {
            info!(chains = chains.len(), "Backup chains aggregated");
        }
    }
    Ok(())
}
