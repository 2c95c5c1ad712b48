// graphdb-backup/src/admin/mod.rs
pub(crate) mod flags;
pub(crate) mod output;
pub(crate) mod report;

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, info};
use which::which;

use crate::config::{AggregateOptions, BackupOptions, ConsistencyCheckOptions};
use crate::errors::{BackupError, Result};

const ADMIN_EXECUTABLE: &str = "neo4j-admin";

/// What a finished admin-tool invocation left behind.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub status_code: i32,
    /// stdout followed by stderr, decoded lossily.
    pub output: String,
}

/// Seam between the adapter and the process table.
pub trait CommandRunner {
    fn run(&self, args: &[String], envs: &[(String, String)]) -> Result<CommandOutput>;
}

/// Runs the real `neo4j-admin` binary found on `PATH`.
pub struct SystemRunner {
    executable: PathBuf,
}

impl SystemRunner {
    pub fn locate() -> Result<Self> {
        let executable = which(ADMIN_EXECUTABLE).map_err(|e| {
            BackupError::Config(format!(
                "{} executable not found in PATH: {}",
                ADMIN_EXECUTABLE, e
            ))
        })?;
        debug!(executable = %executable.display(), "Found admin tool");
        Ok(SystemRunner { executable })
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, args: &[String], envs: &[(String, String)]) -> Result<CommandOutput> {
        let output = Command::new(&self.executable)
            .args(args)
            .envs(envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .output()?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(CommandOutput {
            status_code: output.status.code().unwrap_or(-1),
            output: combined,
        })
    }
}

/// Drives the three admin subcommands and recovers artifact names from their logs.
pub struct AdminTool<R: CommandRunner> {
    runner: R,
    output_dir: PathBuf,
}

impl<R: CommandRunner> AdminTool<R> {
    pub fn new(runner: R, output_dir: impl Into<PathBuf>) -> Self {
        AdminTool {
            runner,
            output_dir: output_dir.into(),
        }
    }

    #[cfg(test)]
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Backs up every configured database from `address` into the output directory and
    /// returns the produced `.backup` file names.
    pub fn perform_backup(&self, address: &str, opts: &BackupOptions) -> Result<Vec<String>> {
        let flags = flags::backup_flags(address, opts, &self.output_dir);
        info!(databases = ?opts.databases, "Starting backup");
        let output = self.execute(&flags, &[])?;
        output::retrieve_backup_file_names(&output)
    }

    /// Checks the newest backup of `database` and returns the report file name, or an
    /// empty string when the checker wrote no report.
    pub fn perform_consistency_check(
        &self,
        database: &str,
        opts: &ConsistencyCheckOptions,
        produced: &[String],
    ) -> Result<String> {
        let backup_file = self.latest_backup(database, produced)?;
        let flags = flags::consistency_check_flags(&backup_file, database, opts, &self.output_dir);
        info!(database = %database, backup = %backup_file, "Starting consistency check");
        self.execute(&flags, &[])?;
        report::collect_report(&self.output_dir, &flags::report_name(&backup_file))
    }

    /// Aggregates backup chains found under the configured source path. `envs` carries
    /// provider credentials for remote sources.
    pub fn perform_aggregate_backup(
        &self,
        opts: &AggregateOptions,
        envs: &[(String, String)],
    ) -> Result<Vec<String>> {
        let flags = flags::aggregate_backup_flags(opts);
        info!(from_path = %opts.from_path, databases = ?opts.databases, "Starting aggregate backup");
        let output = self.execute(&flags, envs)?;
        output::retrieve_aggregated_backup_chains(&output)
    }

    fn latest_backup(&self, database: &str, produced: &[String]) -> Result<String> {
        if let Some(name) = output::last_produced_backup(database, produced) {
            return Ok(name);
        }

        let on_disk: Vec<String> = match fs::read_dir(&self.output_dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter_map(|e| e.file_name().into_string().ok())
                .collect(),
            Err(_) => Vec::new(),
        };
        output::latest_backup_for(database, on_disk.iter().map(String::as_str)).ok_or_else(|| {
            BackupError::ArtifactParse(format!(
                "no backup file found for database '{}' in {}",
                database,
                self.output_dir.display()
            ))
        })
    }

    fn execute(&self, args: &[String], envs: &[(String, String)]) -> Result<String> {
        debug!(args = ?args, "Running {}", ADMIN_EXECUTABLE);
        let result = self.runner.run(args, envs)?;
        if result.status_code != 0 {
            return Err(BackupError::Subprocess {
                command: format!("{} {}", ADMIN_EXECUTABLE, args[..2.min(args.len())].join(" ")),
                status: result.status_code,
                output: result.output,
            });
        }
        Ok(result.output)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedRunner;
    use super::*;

    fn backup_opts(databases: &[&str]) -> BackupOptions {
        BackupOptions {
            databases: databases.iter().map(|d| d.to_string()).collect(),
            include_metadata: "all".into(),
            keep_failed: false,
            parallel_recovery: false,
            backup_type: "AUTO".into(),
            page_cache: None,
            verbose: true,
        }
    }

    fn check_opts() -> ConsistencyCheckOptions {
        ConsistencyCheckOptions {
            enabled: true,
            databases: vec!["neo4j".into()],
            check_indexes: true,
            check_graph: true,
            check_counts: true,
            check_property_owners: true,
            threads: None,
            max_off_heap_memory: None,
            verbose: true,
        }
    }

    #[test]
    fn test_backup_returns_reported_artifacts() -> anyhow::Result<()> {
        let runner = ScriptedRunner::default().respond(
            0,
            "Finished artifact creation 'neo4j-2023-05-04T17-21-27.backup' for database 'neo4j', took 121ms.\n",
        );
        let admin = AdminTool::new(runner, "/backups");

        let names = admin.perform_backup("db:6362", &backup_opts(&["neo4j"]))?;

        assert_eq!(names, vec!["neo4j-2023-05-04T17-21-27.backup"]);
        assert_eq!(admin.runner().subcommands(), vec!["backup"]);
        Ok(())
    }

    #[test]
    fn test_backup_non_zero_exit_is_subprocess_error() {
        let runner = ScriptedRunner::default().respond(1, "Connection refused");
        let admin = AdminTool::new(runner, "/backups");

        let result = admin.perform_backup("db:6362", &backup_opts(&["neo4j"]));
        match result {
            Err(BackupError::Subprocess { status, output, .. }) => {
                assert_eq!(status, 1);
                assert!(output.contains("Connection refused"));
            }
            other => panic!("expected subprocess error, got {:?}", other),
        }
    }

    #[test]
    fn test_backup_without_marker_is_parse_error() {
        let runner = ScriptedRunner::default().respond(0, "Backup command completed.\n");
        let admin = AdminTool::new(runner, "/backups");

        let result = admin.perform_backup("db:6362", &backup_opts(&["neo4j"]));
        assert!(matches!(result, Err(BackupError::ArtifactParse(_))));
    }

    #[test]
    fn test_consistency_check_uses_latest_produced_backup() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let report = dir.path().join("neo4j-2023-05-04T17-21-27.backup.report");
        let runner = ScriptedRunner::default().respond(0, "Consistency check completed").creates(0, &report);
        let admin = AdminTool::new(runner, dir.path());

        let produced = vec![
            "neo4j-2023-05-04T17-21-27.backup".to_string(),
            "system-2023-05-04T17-21-28.backup".to_string(),
        ];
        let report_name = admin.perform_consistency_check("neo4j", &check_opts(), &produced)?;

        assert_eq!(report_name, "neo4j-2023-05-04T17-21-27.backup.report");
        let calls = admin.runner().calls.borrow();
        let expected = format!("--report-path={}", report.display());
        assert!(calls[0].0.contains(&expected));
        Ok(())
    }

    #[test]
    fn test_consistency_check_targets_collision_suffixed_backup() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let admin = AdminTool::new(ScriptedRunner::default(), dir.path());
        let produced = vec![
            "neo4j-2023-05-04T17-21-27.backup".to_string(),
            "neo4j-2023-05-04T17-21-27-1.backup".to_string(),
        ];

        admin.perform_consistency_check("neo4j", &check_opts(), &produced)?;

        let calls = admin.runner().calls.borrow();
        let expected = format!(
            "--report-path={}",
            dir.path().join("neo4j-2023-05-04T17-21-27-1.backup.report").display()
        );
        assert!(calls[0].0.contains(&expected));
        Ok(())
    }

    #[test]
    fn test_consistency_check_falls_back_to_backups_on_disk() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("neo4j-2023-05-01T00-00-00.backup"), b"old")?;
        fs::write(dir.path().join("neo4j-2023-05-02T00-00-00.backup"), b"new")?;
        let admin = AdminTool::new(ScriptedRunner::default(), dir.path());

        let report_name = admin.perform_consistency_check("neo4j", &check_opts(), &[])?;

        assert_eq!(report_name, "");
        let calls = admin.runner().calls.borrow();
        assert!(calls[0].0.iter().any(|a| a.ends_with("neo4j-2023-05-02T00-00-00.backup.report")));
        Ok(())
    }

    #[test]
    fn test_consistency_check_without_any_backup_fails_before_running() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let admin = AdminTool::new(ScriptedRunner::default(), dir.path());

        let result = admin.perform_consistency_check("neo4j", &check_opts(), &[]);

        assert!(matches!(result, Err(BackupError::ArtifactParse(_))));
        assert!(admin.runner().calls.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn test_aggregate_passes_credentials_to_subprocess() -> anyhow::Result<()> {
        let runner = ScriptedRunner::default().respond(
            0,
            "Successfully aggregated backup chain of database 'neo4j', new artifact: '/backups/neo4j-2024-06-13T12-43-43.backup'.\n",
        );
        let admin = AdminTool::new(runner, "/backups");
        let opts = AggregateOptions {
            enabled: true,
            from_path: "s3://graph-backups/".into(),
            databases: vec!["neo4j".into()],
            keep_old_backup: false,
            parallel_recovery: false,
            verbose: true,
        };
        let envs = vec![("AWS_ACCESS_KEY_ID".to_string(), "AKIA".to_string())];

        let chains = admin.perform_aggregate_backup(&opts, &envs)?;

        assert_eq!(chains.len(), 1);
        assert_eq!(admin.runner().calls.borrow()[0].1, envs);
        Ok(())
    }
}
