mod cleanup;
mod logic;

use serde::Serialize;

use crate::admin::{AdminTool, SystemRunner};
use crate::config::AppConfig;
use crate::errors::Result;
use crate::storage;
use crate::utils::address::generate_address;
use crate::utils::setting::check_database_connectivity;

pub use logic::{BackupLifecycle, RunOutcome};

/// Files one run produced in the output directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArtifactSet {
    pub backups: Vec<String>,
    pub reports: Vec<String>,
}

impl ArtifactSet {
    pub fn all(&self) -> impl Iterator<Item = &String> {
        self.backups.iter().chain(self.reports.iter())
    }
}

/// Public entry point for one scheduled invocation: probe the cluster, wire up the
/// admin tool and storage client, then run the lifecycle once.
pub async fn run_backup_flow(config: &AppConfig) -> Result<RunOutcome> {
    // Aggregation reads from a path, so there is no live endpoint to probe
    if !config.aggregate.enabled {
        let address = generate_address(&config.endpoints)?;
        check_database_connectivity(&address, config.probe_timeout).await?;
    }

    let admin = AdminTool::new(SystemRunner::locate()?, &config.output_dir);
    let storage = storage::create_client(&config.storage, &config.output_dir).await?;

    let mut lifecycle = BackupLifecycle::new(config, admin, storage);
    lifecycle.run().await
}
