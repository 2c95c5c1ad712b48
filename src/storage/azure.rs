// graphdb-backup/src/storage/azure.rs
use async_trait::async_trait;
use object_store::ObjectStore;
use object_store::azure::MicrosoftAzureBuilder;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::credentials::AzureCredentials;
use super::{StorageClient, check_store_access, upload_to_store};
use crate::config::StorageTarget;
use crate::errors::{BackupError, Result};

/// Azure Blob Storage client. A "bucket" here is a blob container.
pub struct AzureClient {
    account_name: Option<String>,
    account_key: Option<String>,
    source_dir: PathBuf,
}

impl AzureClient {
    pub fn new(target: &StorageTarget, source_dir: &Path) -> Result<Self> {
        let (account_name, account_key) = if target.uses_ambient_identity() {
            // Workload identity: the federated token settings come from the environment
            (target.azure_account_name.clone(), None)
        } else {
            let creds = AzureCredentials::from_file(Path::new(&target.credential_path))?;
            (Some(creds.account_name), Some(creds.account_key))
        };
        Ok(AzureClient {
            account_name,
            account_key,
            source_dir: source_dir.to_path_buf(),
        })
    }

    fn store(&self, container: &str) -> object_store::Result<Arc<dyn ObjectStore>> {
        let mut builder = MicrosoftAzureBuilder::from_env().with_container_name(container);
        if let Some(account) = &self.account_name {
            builder = builder.with_account(account);
        }
        if let Some(key) = &self.account_key {
            builder = builder.with_access_key(key);
        }
        Ok(Arc::new(builder.build()?))
    }
}

#[async_trait]
impl StorageClient for AzureClient {
    async fn check_access(&self, container: &str) -> Result<()> {
        let store = self.store(container).map_err(|e| BackupError::StorageAccess {
            target: format!("azb://{}", container),
            reason: e.to_string(),
        })?;
        check_store_access(store.as_ref(), &format!("azb://{}", container)).await
    }

    async fn upload_file(&self, file_names: &[String], container: &str) -> Result<()> {
        let store = self.store(container).map_err(|e| BackupError::Upload {
            file: file_names.join(", "),
            target: format!("azb://{}", container),
            reason: e.to_string(),
        })?;
        upload_to_store(store, &self.source_dir, file_names, &format!("azb://{}", container)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_without_account_fails_upload_as_upload_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let client = AzureClient {
            account_name: None,
            account_key: None,
            source_dir: dir.path().to_path_buf(),
        };
        let names = vec![
            "neo4j-2023-05-04T17-21-27.backup".to_string(),
            "system-2023-05-04T17-21-28.backup".to_string(),
        ];

        match client.upload_file(&names, "backups").await {
            Err(BackupError::Upload { file, target, .. }) => {
                assert!(file.contains("system-2023-05-04T17-21-28.backup"));
                assert_eq!(target, "azb://backups");
            }
            other => panic!("expected upload error, got {:?}", other),
        }
        Ok(())
    }
}
