// graphdb-backup/src/admin/output.rs
//! The admin tool reports artifacts only in free-text log lines, so these parsers are
//! tied to its wording and fail loudly when the marker is missing.
use regex::Regex;
use std::sync::LazyLock;

use crate::errors::{BackupError, Result};

// Ex: Finished artifact creation 'neo4j-2023-05-04T17-21-27.backup' for database 'neo4j', took 121ms.
static ARTIFACT_CREATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Finished artifact creation '?([^'\s]+?)\.backup").expect("valid artifact regex")
});

// Ex: Successfully aggregated backup chain of database 'neo4j2', new artifact: '/backups/neo4j2-2024-06-13T12-43-43.backup'.
static CHAIN_AGGREGATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Successfully aggregated backup chain.*").expect("valid aggregate regex")
});

/// Backup file names in the order the tool reported them, each ending in `.backup`.
pub fn retrieve_backup_file_names(cmd_output: &str) -> Result<Vec<String>> {
    let names: Vec<String> = ARTIFACT_CREATED
        .captures_iter(cmd_output)
        .map(|caps| format!("{}.backup", &caps[1]))
        .collect();

    if names.is_empty() {
        return Err(BackupError::ArtifactParse(format!(
            "no 'Finished artifact creation' line in output:\n{}",
            cmd_output
        )));
    }
    Ok(names)
}

/// Full `Successfully aggregated backup chain ...` statements, one per aggregated database.
pub fn retrieve_aggregated_backup_chains(cmd_output: &str) -> Result<Vec<String>> {
    let chains: Vec<String> = CHAIN_AGGREGATED
        .find_iter(cmd_output)
        .map(|m| m.as_str().trim_end().to_string())
        .collect();

    if chains.is_empty() {
        return Err(BackupError::AggregateParse(format!(
            "no 'Successfully aggregated backup chain' line in output:\n{}",
            cmd_output
        )));
    }
    Ok(chains)
}

fn backup_name_pattern(database: &str) -> Option<Regex> {
    Regex::new(&format!(
        r"^{}-(\d{{4}}-\d{{2}}-\d{{2}}T\d{{2}}-\d{{2}}-\d{{2}})(?:-(\d+))?\.backup$",
        regex::escape(database)
    ))
    .ok()
}

/// Last backup of `database` in `produced`, which the tool lists in creation order.
pub fn last_produced_backup(database: &str, produced: &[String]) -> Option<String> {
    let re = backup_name_pattern(database)?;
    produced.iter().filter(|name| re.is_match(name)).last().cloned()
}

/// Newest backup of `database` among `candidates`, ordered by the embedded
/// `YYYY-MM-DDTHH-MM-SS` timestamp and then by the numeric `-N` collision suffix.
pub fn latest_backup_for<'a, I>(database: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let re = backup_name_pattern(database)?;
    candidates
        .into_iter()
        .filter_map(|name| {
            let caps = re.captures(name)?;
            let suffix = caps
                .get(2)
                .and_then(|n| n.as_str().parse::<u64>().ok())
                .unwrap_or(0);
            Some(((caps[1].to_string(), suffix), name))
        })
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, name)| name.to_string())
}
