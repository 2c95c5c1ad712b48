// graphdb-backup/src/backup/cleanup.rs
use std::fs;
use std::path::Path;
use tracing::info;
use walkdir::WalkDir;

use super::ArtifactSet;
use crate::errors::{BackupError, Result};

const ARTIFACT_SUFFIXES: &[&str] = &[".backup", ".report", ".report.tar.gz"];

/// Removes artifacts a previous run left at the top level of `output_dir` and returns
/// their names. Stops at the first entry that cannot be removed.
pub fn remove_stale_artifacts(output_dir: &Path) -> Result<Vec<String>> {
    let mut removed = Vec::new();
    if !output_dir.exists() {
        return Ok(removed);
    }

    for entry in WalkDir::new(output_dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(std::io::Error::from)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !ARTIFACT_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
            continue;
        }

        let path = entry.path();
        info!(file = %path.display(), "Deleting stale artifact");
        let outcome = if entry.file_type().is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        outcome.map_err(|source| BackupError::Cleanup {
            path: path.display().to_string(),
            source,
        })?;
        removed.push(name);
    }
    Ok(removed)
}

/// Deletes every backup and report of this run from `output_dir`; any failure is fatal.
pub fn delete_backup_files(output_dir: &Path, artifacts: &ArtifactSet) -> Result<()> {
    for name in artifacts.all() {
        let path = output_dir.join(name);
        info!(file = %path.display(), "Deleting file");
        fs::remove_file(&path).map_err(|source| BackupError::Cleanup {
            path: path.display().to_string(),
            source,
        })?;
    }
    Ok(())
}
