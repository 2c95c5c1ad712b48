// graphdb-backup/src/backup/logic.rs
use chrono::Local;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{ArtifactSet, cleanup};
use crate::admin::{AdminTool, CommandRunner};
use crate::config::{AppConfig, CloudProvider};
use crate::errors::Result;
use crate::storage::StorageClient;
use crate::storage::credentials;
use crate::utils::address::generate_address;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CheckingAccess,
    CleaningStale,
    Resolving,
    BackingUp,
    CheckingConsistency,
    Uploading,
    CleaningUp,
    Aggregating,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::CheckingAccess => "checking-access",
            Stage::CleaningStale => "cleaning-stale",
            Stage::Resolving => "resolving",
            Stage::BackingUp => "backing-up",
            Stage::CheckingConsistency => "checking-consistency",
            Stage::Uploading => "uploading",
            Stage::CleaningUp => "cleaning-up",
            Stage::Aggregating => "aggregating",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Running(Stage),
    Done,
    Failed(Stage),
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Backup(ArtifactSet),
    /// `Successfully aggregated backup chain ...` statements from the admin tool.
    Aggregated(Vec<String>),
}

fn enter(state: &mut LifecycleState, stage: Stage) {
    *state = LifecycleState::Running(stage);
    info!(stage = %stage, "Entering stage");
}

/// Drives one backup run: aggregate-only, or access check → backup → optional
/// consistency check → optional upload → optional cleanup. Any stage failure ends the run.
pub struct BackupLifecycle<'a, R: CommandRunner> {
    config: &'a AppConfig,
    admin: AdminTool<R>,
    storage: Option<Arc<dyn StorageClient>>,
    stale_cleanup: fn(&Path) -> Result<Vec<String>>,
    state: LifecycleState,
}

impl<'a, R: CommandRunner> BackupLifecycle<'a, R> {
    pub fn new(
        config: &'a AppConfig,
        admin: AdminTool<R>,
        storage: Option<Arc<dyn StorageClient>>,
    ) -> Self {
        BackupLifecycle {
            config,
            admin,
            storage,
            stale_cleanup: cleanup::remove_stale_artifacts,
            state: LifecycleState::Idle,
        }
    }

    #[cfg(test)]
    pub fn with_stale_cleanup(mut self, stale_cleanup: fn(&Path) -> Result<Vec<String>>) -> Self {
        self.stale_cleanup = stale_cleanup;
        self
    }

    #[cfg(test)]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    #[cfg(test)]
    pub fn admin(&self) -> &AdminTool<R> {
        &self.admin
    }

    pub async fn run(&mut self) -> Result<RunOutcome> {
        let started = Local::now();
        let outcome = if self.config.aggregate.enabled {
            self.run_aggregate().map(RunOutcome::Aggregated)
        } else {
            self.run_backup().await.map(RunOutcome::Backup)
        };

        match &outcome {
            Ok(result) => {
                self.state = LifecycleState::Done;
                let elapsed = Local::now() - started;
                if let RunOutcome::Backup(artifacts) = result {
                    let summary = serde_json::to_string(artifacts).unwrap_or_default();
                    info!(artifacts = %summary, elapsed_ms = elapsed.num_milliseconds(), "🎉 Backup completed successfully");
                } else {
                    info!(elapsed_ms = elapsed.num_milliseconds(), "🎉 Aggregate backup completed successfully");
                }
            }
            Err(e) => {
                if let LifecycleState::Running(stage) = self.state {
                    self.state = LifecycleState::Failed(stage);
                    error!(stage = %stage, error = %e, "Backup run failed");
                }
            }
        }
        outcome
    }

    fn run_aggregate(&mut self) -> Result<Vec<String>> {
        let config = self.config;
        enter(&mut self.state, Stage::Aggregating);
        let target = &config.storage;

        // The aggregate path never runs the access check, so remote sources only see
        // credentials if they are handed to the subprocess here
        let envs = if target.provider != CloudProvider::None && !target.uses_ambient_identity() {
            info!(provider = %target.provider, "Passing credential file contents to aggregate backup");
            credentials::aggregate_env(target)?
        } else {
            Vec::new()
        };

        let from_path = &config.aggregate.from_path;
        info!(from_path = %from_path, source = %describe_source(from_path), "Aggregating backup chains");

        let chains = self.admin.perform_aggregate_backup(&config.aggregate, &envs)?;
        for chain in &chains {
            info!("{}", chain);
        }
        Ok(chains)
    }

    async fn run_backup(&mut self) -> Result<ArtifactSet> {
        let config = self.config;
        let bucket = &config.storage.bucket_name;

        if let Some(storage) = &self.storage {
            enter(&mut self.state, Stage::CheckingAccess);
            storage.check_access(bucket).await?;
        }

        let artifacts = self.local_sequence()?;

        if let Some(storage) = &self.storage {
            enter(&mut self.state, Stage::Uploading);
            storage.upload_file(&artifacts.backups, bucket).await?;
            if config.consistency_check.enabled {
                storage.upload_file(&artifacts.reports, bucket).await?;
            }
        }

        if !config.keep_backup_files {
            enter(&mut self.state, Stage::CleaningUp);
            cleanup::delete_backup_files(&config.output_dir, &artifacts)?;
        }
        Ok(artifacts)
    }

    /// Stale cleanup, address resolution, backup and the optional consistency checks.
    fn local_sequence(&mut self) -> Result<ArtifactSet> {
        let config = self.config;
        // Retained artifacts are the base for the next differential backup; only a
        // run that keeps nothing treats leftovers as stale
        if !config.keep_backup_files {
            enter(&mut self.state, Stage::CleaningStale);
            match (self.stale_cleanup)(&config.output_dir) {
                Ok(removed) if !removed.is_empty() => info!(files = ?removed, "Removed stale artifacts"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Failed to clean up existing backups"),
            }
        }

        enter(&mut self.state, Stage::Resolving);
        let address = generate_address(&config.endpoints)?;

        enter(&mut self.state, Stage::BackingUp);
        let backups = self.admin.perform_backup(&address, &config.backup)?;
        info!(files = ?backups, "Backup file name(s)");

        let mut reports = Vec::new();
        let check = &config.consistency_check;
        if check.enabled {
            enter(&mut self.state, Stage::CheckingConsistency);
            for database in &check.databases {
                if !config.backup.covers(database) {
                    debug!(database = %database, "Not part of this backup, skipping consistency check");
                    continue;
                }
                let report = self.admin.perform_consistency_check(database, check, &backups)?;
                if !report.is_empty() {
                    reports.push(report);
                }
            }
        }

        Ok(ArtifactSet { backups, reports })
    }
}

fn describe_source(from_path: &str) -> String {
    match Url::parse(from_path) {
        Ok(url) if url.scheme().len() > 1 => format!("remote ({})", url.scheme()),
        _ => "local path".to_string(),
    }
}
