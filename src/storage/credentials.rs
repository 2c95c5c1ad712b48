// graphdb-backup/src/storage/credentials.rs
//! Parsing of the mounted credential secret for each provider.
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::config::{CloudProvider, StorageTarget};
use crate::errors::{BackupError, Result};

/// Keys from an AWS shared-credentials file.
#[derive(Debug, Clone, PartialEq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: Option<String>,
}

impl AwsCredentials {
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::parse(&read_secret(path)?)
    }

    /// Reads the `[default]` profile, or the first profile when there is no default.
    pub fn parse(content: &str) -> Result<Self> {
        let mut profiles: Vec<(String, HashMap<String, String>)> = Vec::new();

        for line in content.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                profiles.push((name.trim().to_string(), HashMap::new()));
                continue;
            }
            if let (Some((key, value)), Some((_, keys))) = (line.split_once('='), profiles.last_mut()) {
                keys.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        let profile = profiles
            .iter()
            .find(|(name, _)| name == "default")
            .or_else(|| profiles.first())
            .map(|(_, keys)| keys);

        let field = |key: &str| profile.and_then(|keys| keys.get(key)).cloned();
        match (field("aws_access_key_id"), field("aws_secret_access_key")) {
            (Some(access_key_id), Some(secret_access_key)) => Ok(AwsCredentials {
                access_key_id,
                secret_access_key,
                region: field("region"),
            }),
            _ => Err(BackupError::Credentials(
                "aws credentials must contain aws_access_key_id and aws_secret_access_key".into(),
            )),
        }
    }
}

/// Storage account name and key from `KEY=VALUE` lines.
#[derive(Debug, Clone, PartialEq)]
pub struct AzureCredentials {
    pub account_name: String,
    pub account_key: String,
}

impl AzureCredentials {
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::parse(&read_secret(path)?)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut account_name = None;
        let mut account_key = None;
        for line in content.lines().map(str::trim) {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').to_string();
            match key.trim() {
                "AZURE_STORAGE_ACCOUNT_NAME" => account_name = Some(value),
                "AZURE_STORAGE_ACCOUNT_KEY" => account_key = Some(value),
                _ => {}
            }
        }
        match (account_name, account_key) {
            (Some(account_name), Some(account_key)) => Ok(AzureCredentials {
                account_name,
                account_key,
            }),
            _ => Err(BackupError::Credentials(
                "azure credentials must contain AZURE_STORAGE_ACCOUNT_NAME and AZURE_STORAGE_ACCOUNT_KEY".into(),
            )),
        }
    }
}

// Only the fields needed to tell a service-account key apart from an arbitrary file
#[derive(Debug, Deserialize)]
struct GcpServiceAccount {
    #[serde(rename = "type")]
    kind: String,
    client_email: String,
}

fn validate_gcp_key(path: &Path) -> Result<()> {
    let account: GcpServiceAccount = serde_json::from_str(&read_secret(path)?).map_err(|e| {
        BackupError::Credentials(format!("{} is not a service account key: {}", path.display(), e))
    })?;
    if account.kind != "service_account" {
        return Err(BackupError::Credentials(format!(
            "{} has type '{}', expected 'service_account' ({})",
            path.display(),
            account.kind,
            account.client_email
        )));
    }
    Ok(())
}

/// Environment the aggregate subprocess needs to read a remote source when no ambient
/// identity is available. Values are secrets and must not be logged.
pub fn aggregate_env(target: &StorageTarget) -> Result<Vec<(String, String)>> {
    let path = Path::new(&target.credential_path);
    let mut envs = Vec::new();
    match target.provider {
        CloudProvider::Aws => {
            let creds = AwsCredentials::from_file(path)?;
            envs.push(("AWS_ACCESS_KEY_ID".to_string(), creds.access_key_id));
            envs.push(("AWS_SECRET_ACCESS_KEY".to_string(), creds.secret_access_key));
            if let Some(region) = creds.region {
                envs.push(("AWS_DEFAULT_REGION".to_string(), region.clone()));
                envs.push(("AWS_REGION".to_string(), region));
            }
        }
        CloudProvider::Gcp => {
            validate_gcp_key(path)?;
            envs.push((
                "GOOGLE_APPLICATION_CREDENTIALS".to_string(),
                target.credential_path.clone(),
            ));
        }
        CloudProvider::Azure => {
            let creds = AzureCredentials::from_file(path)?;
            envs.push(("AZURE_STORAGE_ACCOUNT_NAME".to_string(), creds.account_name));
            envs.push(("AZURE_STORAGE_ACCOUNT_KEY".to_string(), creds.account_key));
        }
        CloudProvider::None => {}
    }
    Ok(envs)
}

fn read_secret(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        BackupError::Credentials(format!("cannot read credentials at {}: {}", path.display(), e))
    })
}
