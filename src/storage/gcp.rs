// graphdb-backup/src/storage/gcp.rs
use async_trait::async_trait;
use object_store::ObjectStore;
use object_store::gcp::GoogleCloudStorageBuilder;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{StorageClient, check_store_access, upload_to_store};
use crate::config::StorageTarget;
use crate::errors::{BackupError, Result};

pub struct GcpClient {
    service_account_path: Option<String>,
    source_dir: PathBuf,
}

impl GcpClient {
    pub fn new(target: &StorageTarget, source_dir: &Path) -> Result<Self> {
        let service_account_path = if target.uses_ambient_identity() {
            None
        } else {
            Some(target.credential_path.clone())
        };
        Ok(GcpClient {
            service_account_path,
            source_dir: source_dir.to_path_buf(),
        })
    }

    // The bucket is bound when the store is built, so one store per call
    fn store(&self, bucket: &str) -> object_store::Result<Arc<dyn ObjectStore>> {
        let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(bucket);
        if let Some(path) = &self.service_account_path {
            builder = builder.with_service_account_path(path);
        }
        Ok(Arc::new(builder.build()?))
    }
}

#[async_trait]
impl StorageClient for GcpClient {
    async fn check_access(&self, bucket: &str) -> Result<()> {
        let store = self.store(bucket).map_err(|e| BackupError::StorageAccess {
            target: format!("gs://{}", bucket),
            reason: e.to_string(),
        })?;
        check_store_access(store.as_ref(), &format!("gs://{}", bucket)).await
    }

    async fn upload_file(&self, file_names: &[String], bucket: &str) -> Result<()> {
        let store = self.store(bucket).map_err(|e| BackupError::Upload {
            file: file_names.join(", "),
            target: format!("gs://{}", bucket),
            reason: e.to_string(),
        })?;
        upload_to_store(store, &self.source_dir, file_names, &format!("gs://{}", bucket)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with_missing_key(dir: &Path) -> GcpClient {
        GcpClient {
            service_account_path: Some(dir.join("missing-key.json").display().to_string()),
            source_dir: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn test_unbuildable_store_fails_upload_as_upload_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let client = client_with_missing_key(dir.path());
        let names = vec!["neo4j-2023-05-04T17-21-27.backup".to_string()];

        match client.upload_file(&names, "graph-backups").await {
            Err(BackupError::Upload { file, target, .. }) => {
                assert_eq!(file, "neo4j-2023-05-04T17-21-27.backup");
                assert_eq!(target, "gs://graph-backups");
            }
            other => panic!("expected upload error, got {:?}", other),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_unbuildable_store_fails_access_check_as_access_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let client = client_with_missing_key(dir.path());

        let result = client.check_access("graph-backups").await;
        assert!(matches!(result, Err(BackupError::StorageAccess { .. })));
        Ok(())
    }
}
