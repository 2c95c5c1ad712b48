// graphdb-backup/src/config/mod.rs
use serde::Deserialize;
use serde_json::{Map, Value};
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{BackupError, Result};

pub const DEFAULT_OUTPUT_DIR: &str = "/backups";
/// Credential path the chart mounts when no secret is configured, i.e. ambient identity.
pub const DEFAULT_CREDENTIAL_PATH: &str = "/credentials/";
pub const ALL_DATABASES: &str = "*";
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;

// Raw view of the process environment, one field per variable the job pod receives
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEnvConfig {
    #[serde(rename = "DATABASE_BACKUP_ENDPOINTS")]
    pub backup_endpoints: Option<String>,
    #[serde(rename = "DATABASE_SERVICE_IP")]
    pub service_ip: Option<String>,
    #[serde(rename = "DATABASE_SERVICE_NAME")]
    pub service_name: Option<String>,
    #[serde(rename = "DATABASE_NAMESPACE")]
    pub namespace: Option<String>,
    #[serde(rename = "DATABASE_BACKUP_PORT")]
    pub backup_port: Option<String>,
    #[serde(rename = "DATABASE_CLUSTER_DOMAIN")]
    pub cluster_domain: Option<String>,

    #[serde(rename = "DATABASE")]
    pub database: Option<String>,
    #[serde(rename = "INCLUDE_METADATA")]
    pub include_metadata: Option<String>,
    #[serde(rename = "KEEP_FAILED")]
    pub keep_failed: Option<String>,
    #[serde(rename = "PARALLEL_RECOVERY")]
    pub parallel_recovery: Option<String>,
    #[serde(rename = "TYPE")]
    pub backup_type: Option<String>,
    #[serde(rename = "PAGE_CACHE")]
    pub page_cache: Option<String>,
    #[serde(rename = "VERBOSE")]
    pub verbose: Option<String>,

    #[serde(rename = "CONSISTENCY_CHECK_ENABLE")]
    pub consistency_check_enable: Option<String>,
    #[serde(rename = "CONSISTENCY_CHECK_DATABASE")]
    pub consistency_check_database: Option<String>,
    #[serde(rename = "CONSISTENCY_CHECK_INDEXES")]
    pub consistency_check_indexes: Option<String>,
    #[serde(rename = "CONSISTENCY_CHECK_GRAPH")]
    pub consistency_check_graph: Option<String>,
    #[serde(rename = "CONSISTENCY_CHECK_COUNTS")]
    pub consistency_check_counts: Option<String>,
    #[serde(rename = "CONSISTENCY_CHECK_PROPERTYOWNERS")]
    pub consistency_check_property_owners: Option<String>,
    #[serde(rename = "CONSISTENCY_CHECK_THREADS")]
    pub consistency_check_threads: Option<String>,
    #[serde(rename = "CONSISTENCY_CHECK_MAXOFFHEAPMEMORY")]
    pub consistency_check_max_off_heap_memory: Option<String>,
    #[serde(rename = "CONSISTENCY_CHECK_VERBOSE")]
    pub consistency_check_verbose: Option<String>,

    #[serde(rename = "AGGREGATE_BACKUP_ENABLED")]
    pub aggregate_enabled: Option<String>,
    #[serde(rename = "AGGREGATE_BACKUP_FROM_PATH")]
    pub aggregate_from_path: Option<String>,
    #[serde(rename = "AGGREGATE_BACKUP_DATABASE")]
    pub aggregate_database: Option<String>,
    #[serde(rename = "AGGREGATE_BACKUP_KEEPOLDBACKUP")]
    pub aggregate_keep_old_backup: Option<String>,
    #[serde(rename = "AGGREGATE_BACKUP_PARALLEL_RECOVERY")]
    pub aggregate_parallel_recovery: Option<String>,

    #[serde(rename = "CLOUD_PROVIDER")]
    pub cloud_provider: Option<String>,
    #[serde(rename = "BUCKET_NAME")]
    pub bucket_name: Option<String>,
    #[serde(rename = "CREDENTIAL_PATH")]
    pub credential_path: Option<String>,
    #[serde(rename = "MINIO_ENDPOINT")]
    pub minio_endpoint: Option<String>,
    #[serde(rename = "AZURE_STORAGE_ACCOUNT_NAME")]
    pub azure_storage_account_name: Option<String>,

    #[serde(rename = "KEEP_BACKUP_FILES")]
    pub keep_backup_files: Option<String>,
    #[serde(rename = "BACKUP_OUTPUT_DIR")]
    pub output_dir: Option<String>,
    #[serde(rename = "STARTUP_PROBE_TIMEOUT_SECS")]
    pub probe_timeout_secs: Option<String>,
}

impl RawEnvConfig {
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: Map<String, Value> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), Value::String(v.into())))
            .collect();
        serde_json::from_value(Value::Object(map))
            .map_err(|e| BackupError::Config(format!("failed to read environment: {}", e)))
    }
}

/// Sources the address resolver picks from, in priority order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EndpointConfig {
    pub endpoints: String,
    pub service_ip: String,
    pub service_name: String,
    pub namespace: String,
    pub port: String,
    pub cluster_domain: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackupOptions {
    pub databases: Vec<String>,
    pub include_metadata: String,
    pub keep_failed: bool,
    pub parallel_recovery: bool,
    pub backup_type: String,
    pub page_cache: Option<String>,
    pub verbose: bool,
}

impl BackupOptions {
    /// True when `database` is part of this backup, either by name or through `*`.
    pub fn covers(&self, database: &str) -> bool {
        self.databases
            .iter()
            .any(|db| db == database || db == ALL_DATABASES)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsistencyCheckOptions {
    pub enabled: bool,
    pub databases: Vec<String>,
    pub check_indexes: bool,
    pub check_graph: bool,
    pub check_counts: bool,
    pub check_property_owners: bool,
    pub threads: Option<String>,
    pub max_off_heap_memory: Option<String>,
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateOptions {
    pub enabled: bool,
    pub from_path: String,
    pub databases: Vec<String>,
    pub keep_old_backup: bool,
    pub parallel_recovery: bool,
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudProvider {
    Aws,
    Gcp,
    Azure,
    None,
}

impl FromStr for CloudProvider {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" => Ok(CloudProvider::None),
            "aws" => Ok(CloudProvider::Aws),
            "gcp" => Ok(CloudProvider::Gcp),
            "azure" => Ok(CloudProvider::Azure),
            other => Err(BackupError::Config(format!(
                "unsupported CLOUD_PROVIDER '{}', expected one of aws, gcp, azure",
                other
            ))),
        }
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CloudProvider::Aws => "aws",
            CloudProvider::Gcp => "gcp",
            CloudProvider::Azure => "azure",
            CloudProvider::None => "none",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageTarget {
    pub provider: CloudProvider,
    pub bucket_name: String,
    pub credential_path: String,
    pub minio_endpoint: Option<String>,
    pub azure_account_name: Option<String>,
}

impl StorageTarget {
    /// No secret was mounted, so the pod's workload identity supplies credentials.
    pub fn uses_ambient_identity(&self) -> bool {
        self.credential_path == DEFAULT_CREDENTIAL_PATH
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub endpoints: EndpointConfig,
    pub backup: BackupOptions,
    pub consistency_check: ConsistencyCheckOptions,
    pub aggregate: AggregateOptions,
    pub storage: StorageTarget,
    pub keep_backup_files: bool,
    pub output_dir: PathBuf,
    pub probe_timeout: Duration,
}

impl AppConfig {
    /// Reads the process environment once, after loading an optional `.env` file.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_vars(unicode_vars(std::env::vars_os()))
    }

    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::from_raw(RawEnvConfig::from_vars(vars)?)
    }

    pub fn from_raw(raw: RawEnvConfig) -> Result<Self> {
        let verbose = parse_bool("VERBOSE", &raw.verbose, true)?;

        let endpoints = EndpointConfig {
            endpoints: text(&raw.backup_endpoints),
            service_ip: text(&raw.service_ip),
            service_name: text(&raw.service_name),
            namespace: text(&raw.namespace),
            port: text(&raw.backup_port),
            cluster_domain: text(&raw.cluster_domain),
        };

        let backup = BackupOptions {
            databases: split_list(&raw.database),
            include_metadata: text_or(&raw.include_metadata, "all"),
            keep_failed: parse_bool("KEEP_FAILED", &raw.keep_failed, false)?,
            parallel_recovery: parse_bool("PARALLEL_RECOVERY", &raw.parallel_recovery, false)?,
            backup_type: text_or(&raw.backup_type, "AUTO"),
            page_cache: non_empty(&raw.page_cache),
            verbose,
        };

        let consistency_check = ConsistencyCheckOptions {
            enabled: parse_bool("CONSISTENCY_CHECK_ENABLE", &raw.consistency_check_enable, false)?,
            databases: split_list(&raw.consistency_check_database),
            check_indexes: parse_bool("CONSISTENCY_CHECK_INDEXES", &raw.consistency_check_indexes, true)?,
            check_graph: parse_bool("CONSISTENCY_CHECK_GRAPH", &raw.consistency_check_graph, true)?,
            check_counts: parse_bool("CONSISTENCY_CHECK_COUNTS", &raw.consistency_check_counts, true)?,
            check_property_owners: parse_bool(
                "CONSISTENCY_CHECK_PROPERTYOWNERS",
                &raw.consistency_check_property_owners,
                true,
            )?,
            threads: non_empty(&raw.consistency_check_threads),
            max_off_heap_memory: non_empty(&raw.consistency_check_max_off_heap_memory),
            verbose: parse_bool("CONSISTENCY_CHECK_VERBOSE", &raw.consistency_check_verbose, true)?,
        };

        let aggregate = AggregateOptions {
            enabled: parse_bool("AGGREGATE_BACKUP_ENABLED", &raw.aggregate_enabled, false)?,
            from_path: text(&raw.aggregate_from_path),
            databases: split_list(&raw.aggregate_database),
            keep_old_backup: parse_bool("AGGREGATE_BACKUP_KEEPOLDBACKUP", &raw.aggregate_keep_old_backup, false)?,
            parallel_recovery: parse_bool(
                "AGGREGATE_BACKUP_PARALLEL_RECOVERY",
                &raw.aggregate_parallel_recovery,
                false,
            )?,
            verbose,
        };

        let storage = StorageTarget {
            provider: text(&raw.cloud_provider).parse()?,
            bucket_name: text(&raw.bucket_name),
            credential_path: text_or(&raw.credential_path, DEFAULT_CREDENTIAL_PATH),
            minio_endpoint: non_empty(&raw.minio_endpoint),
            azure_account_name: non_empty(&raw.azure_storage_account_name),
        };

        let probe_timeout_secs = match non_empty(&raw.probe_timeout_secs) {
            Some(v) => v.parse::<u64>().map_err(|_| {
                BackupError::Config(format!("STARTUP_PROBE_TIMEOUT_SECS must be a number, got '{}'", v))
            })?,
            None => DEFAULT_PROBE_TIMEOUT_SECS,
        };

        let config = AppConfig {
            endpoints,
            backup,
            consistency_check,
            aggregate,
            storage,
            keep_backup_files: parse_bool("KEEP_BACKUP_FILES", &raw.keep_backup_files, true)?,
            output_dir: PathBuf::from(text_or(&raw.output_dir, DEFAULT_OUTPUT_DIR)),
            probe_timeout: Duration::from_secs(probe_timeout_secs),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.aggregate.enabled {
            if self.aggregate.from_path.is_empty() {
                return Err(BackupError::Config(
                    "AGGREGATE_BACKUP_FROM_PATH must be set when aggregate backup is enabled".into(),
                ));
            }
            if self.aggregate.databases.is_empty() {
                return Err(BackupError::Config(
                    "AGGREGATE_BACKUP_DATABASE must be set when aggregate backup is enabled".into(),
                ));
            }
        } else if self.backup.databases.is_empty() {
            return Err(BackupError::Config("DATABASE must name at least one database".into()));
        }

        if self.storage.provider != CloudProvider::None && self.storage.bucket_name.is_empty() {
            return Err(BackupError::Config(format!(
                "BUCKET_NAME must be set for cloud provider {}",
                self.storage.provider
            )));
        }
        Ok(())
    }
}

// Variables this job never reads may hold arbitrary bytes; they are skipped, not fatal
fn unicode_vars<I>(vars: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect()
}

fn text(value: &Option<String>) -> String {
    value.as_deref().map(str::trim).unwrap_or_default().to_string()
}

fn text_or(value: &Option<String>, default: &str) -> String {
    non_empty(value).unwrap_or_else(|| default.to_string())
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn split_list(value: &Option<String>) -> Vec<String> {
    value
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(name: &str, value: &Option<String>, default: bool) -> Result<bool> {
    match non_empty(value) {
        None => Ok(default),
        Some(v) => match v.to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(BackupError::Config(format!(
                "{} must be 'true' or 'false', got '{}'",
                name, v
            ))),
        },
    }
}
