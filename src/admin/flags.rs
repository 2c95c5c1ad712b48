// graphdb-backup/src/admin/flags.rs
//! Argument vectors for the `neo4j-admin database ...` subcommands.
use std::path::Path;

use crate::config::{AggregateOptions, BackupOptions, ConsistencyCheckOptions};
use crate::utils::address::split_endpoints;

/// `database backup` flags; one `--from` per endpoint so any cluster member can serve the backup.
pub fn backup_flags(address: &str, opts: &BackupOptions, output_dir: &Path) -> Vec<String> {
    let mut flags = vec!["database".to_string(), "backup".to_string()];

    for endpoint in split_endpoints(address) {
        flags.push(format!("--from={}", endpoint));
    }

    flags.push(format!("--include-metadata={}", opts.include_metadata));
    flags.push(format!("--keep-failed={}", opts.keep_failed));
    flags.push(format!("--parallel-recovery={}", opts.parallel_recovery));
    flags.push(format!("--type={}", opts.backup_type));
    flags.push(format!("--to-path={}", output_dir.display()));

    if let Some(page_cache) = &opts.page_cache {
        flags.push(format!("--pagecache={}", page_cache));
    }
    if opts.verbose {
        flags.push("--verbose".to_string());
    }

    flags.extend(opts.databases.iter().cloned());
    flags
}

/// `database check` flags. The report lands next to the backup as `<backup file>.report`.
pub fn consistency_check_flags(
    backup_file_name: &str,
    database: &str,
    opts: &ConsistencyCheckOptions,
    output_dir: &Path,
) -> Vec<String> {
    let mut flags = vec!["database".to_string(), "check".to_string()];

    flags.push(format!("--check-indexes={}", opts.check_indexes));
    flags.push(format!("--check-graph={}", opts.check_graph));
    flags.push(format!("--check-counts={}", opts.check_counts));
    flags.push(format!("--check-property-owners={}", opts.check_property_owners));
    flags.push(format!(
        "--report-path={}",
        output_dir.join(report_name(backup_file_name)).display()
    ));
    flags.push(format!("--from-path={}", output_dir.display()));

    if let Some(threads) = &opts.threads {
        flags.push(format!("--threads={}", threads));
    }
    if let Some(memory) = &opts.max_off_heap_memory {
        flags.push(format!("--max-off-heap-memory={}", memory));
    }
    if opts.verbose {
        flags.push("--verbose".to_string());
    }

    flags.push(database.to_string());
    flags
}

/// `database aggregate-backup` flags. Takes a source path, never a live endpoint.
pub fn aggregate_backup_flags(opts: &AggregateOptions) -> Vec<String> {
    let mut flags = vec!["database".to_string(), "aggregate-backup".to_string()];

    flags.push(format!("--from-path={}", opts.from_path));
    flags.push(format!("--keep-old-backup={}", opts.keep_old_backup));
    flags.push(format!("--parallel-recovery={}", opts.parallel_recovery));

    if opts.verbose {
        flags.push("--verbose".to_string());
    }

    flags.extend(opts.databases.iter().cloned());
    flags
}

pub fn report_name(backup_file_name: &str) -> String {
    format!("{}.report", backup_file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backup_opts() -> BackupOptions {
        BackupOptions {
            databases: vec!["neo4j".into(), "system".into()],
            include_metadata: "all".into(),
            keep_failed: false,
            parallel_recovery: true,
            backup_type: "FULL".into(),
            page_cache: None,
            verbose: false,
        }
    }

    fn check_opts() -> ConsistencyCheckOptions {
        ConsistencyCheckOptions {
            enabled: true,
            databases: vec!["neo4j".into()],
            check_indexes: true,
            check_graph: false,
            check_counts: true,
            check_property_owners: true,
            threads: None,
            max_off_heap_memory: None,
            verbose: false,
        }
    }

    #[test]
    fn test_backup_flags_single_endpoint() {
        let flags = backup_flags("db-admin.default.svc.cluster.local:6362", &backup_opts(), Path::new("/backups"));
        assert_eq!(
            flags,
            vec![
                "database",
                "backup",
                "--from=db-admin.default.svc.cluster.local:6362",
                "--include-metadata=all",
                "--keep-failed=false",
                "--parallel-recovery=true",
                "--type=FULL",
                "--to-path=/backups",
                "neo4j",
                "system",
            ]
        );
    }

    #[test]
    fn test_backup_flags_one_from_per_endpoint() {
        let flags = backup_flags("10.3.3.2:6362, 10.3.3.3:6362", &backup_opts(), Path::new("/backups"));
        let from: Vec<&String> = flags.iter().filter(|f| f.starts_with("--from=")).collect();
        assert_eq!(from, vec!["--from=10.3.3.2:6362", "--from=10.3.3.3:6362"]);
    }

    #[test]
    fn test_backup_flags_optional_page_cache_and_verbose() {
        let opts = BackupOptions {
            page_cache: Some("4G".into()),
            verbose: true,
            ..backup_opts()
        };
        let flags = backup_flags("db:6362", &opts, Path::new("/backups"));
        let page_cache = flags.iter().position(|f| f == "--pagecache=4G");
        let verbose = flags.iter().position(|f| f == "--verbose");
        let first_db = flags.iter().position(|f| f == "neo4j");
        assert!(page_cache.is_some() && verbose.is_some());
        assert!(verbose < first_db);
    }

    #[test]
    fn test_consistency_check_report_path_follows_backup_name() {
        let flags = consistency_check_flags(
            "neo4j-2023-05-04T17-21-27.backup",
            "neo4j",
            &check_opts(),
            Path::new("/backups"),
        );
        assert_eq!(
            flags,
            vec![
                "database",
                "check",
                "--check-indexes=true",
                "--check-graph=false",
                "--check-counts=true",
                "--check-property-owners=true",
                "--report-path=/backups/neo4j-2023-05-04T17-21-27.backup.report",
                "--from-path=/backups",
                "neo4j",
            ]
        );
    }

    #[test]
    fn test_consistency_check_resource_limits() {
        let opts = ConsistencyCheckOptions {
            threads: Some("4".into()),
            max_off_heap_memory: Some("2g".into()),
            verbose: true,
            ..check_opts()
        };
        let flags = consistency_check_flags("neo4j-x.backup", "neo4j", &opts, Path::new("/backups"));
        assert!(flags.contains(&"--threads=4".to_string()));
        assert!(flags.contains(&"--max-off-heap-memory=2g".to_string()));
        assert_eq!(flags.last().map(String::as_str), Some("neo4j"));
        assert_eq!(flags[flags.len() - 2], "--verbose");
    }

    #[test]
    fn test_aggregate_flags_have_no_from_endpoint() {
        let opts = AggregateOptions {
            enabled: true,
            from_path: "s3://graph-backups/".into(),
            databases: vec!["neo4j".into(), "orders".into()],
            keep_old_backup: true,
            parallel_recovery: false,
            verbose: true,
        };
        let flags = aggregate_backup_flags(&opts);
        assert_eq!(
            flags,
            vec![
                "database",
                "aggregate-backup",
                "--from-path=s3://graph-backups/",
                "--keep-old-backup=true",
                "--parallel-recovery=false",
                "--verbose",
                "neo4j",
                "orders",
            ]
        );
        assert!(!flags.iter().any(|f| f.starts_with("--from=")));
    }
}
