// graphdb-backup/src/storage/mod.rs
pub(crate) mod aws;
pub(crate) mod azure;
pub(crate) mod credentials;
pub(crate) mod gcp;

use async_trait::async_trait;
use object_store::ObjectStore;
use object_store::buffered::BufWriter;
use object_store::path::Path as ObjectPath;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::config::{CloudProvider, StorageTarget};
use crate::errors::{BackupError, Result};

/// Capabilities every upload destination offers, whatever the provider.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Verifies the bucket/container exists and is writable with the configured identity.
    async fn check_access(&self, bucket: &str) -> Result<()>;

    /// Uploads each named file from the output directory, keyed by its file name. The
    /// first failure aborts the rest of the batch.
    async fn upload_file(&self, file_names: &[String], bucket: &str) -> Result<()>;
}

/// Builds the client for the configured provider, or `None` for local-only runs.
pub async fn create_client(
    target: &StorageTarget,
    source_dir: &Path,
) -> Result<Option<Arc<dyn StorageClient>>> {
    let client: Arc<dyn StorageClient> = match target.provider {
        CloudProvider::Aws => Arc::new(aws::AwsClient::new(target, source_dir).await?),
        CloudProvider::Gcp => Arc::new(gcp::GcpClient::new(target, source_dir)?),
        CloudProvider::Azure => Arc::new(azure::AzureClient::new(target, source_dir)?),
        CloudProvider::None => return Ok(None),
    };
    Ok(Some(client))
}

/// Lists the root of `store`; any error means the destination is unusable.
pub(crate) async fn check_store_access(store: &dyn ObjectStore, target: &str) -> Result<()> {
    store
        .list_with_delimiter(None)
        .await
        .map_err(|e| BackupError::StorageAccess {
            target: target.to_string(),
            reason: e.to_string(),
        })?;
    info!(target = %target, "✓ Storage target is accessible");
    Ok(())
}

/// Streams local files into `store` through a multipart-capable buffered writer.
pub(crate) async fn upload_to_store(
    store: Arc<dyn ObjectStore>,
    source_dir: &Path,
    file_names: &[String],
    target: &str,
) -> Result<()> {
    for file_name in file_names {
        let upload_err = |reason: String| BackupError::Upload {
            file: file_name.clone(),
            target: target.to_string(),
            reason,
        };

        let local_path = source_dir.join(file_name);
        info!(file = %local_path.display(), target = %target, "Uploading");

        let mut file = tokio::fs::File::open(&local_path)
            .await
            .map_err(|e| upload_err(e.to_string()))?;
        let mut writer = BufWriter::new(Arc::clone(&store), ObjectPath::from(file_name.as_str()));
        tokio::io::copy(&mut file, &mut writer)
            .await
            .map_err(|e| upload_err(e.to_string()))?;
        writer.shutdown().await.map_err(|e| upload_err(e.to_string()))?;

        info!(file = %file_name, target = %target, "✅ Upload complete");
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    #[tokio::test]
    async fn test_upload_to_store_keys_by_file_name() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("neo4j-2023-05-04T17-21-27.backup"), b"backup bytes")?;
        std::fs::write(dir.path().join("neo4j-2023-05-04T17-21-27.backup.report"), b"report")?;
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());

        let names = vec![
            "neo4j-2023-05-04T17-21-27.backup".to_string(),
            "neo4j-2023-05-04T17-21-27.backup.report".to_string(),
        ];
        upload_to_store(Arc::clone(&store), dir.path(), &names, "memory").await?;

        let stored = store
            .get(&ObjectPath::from("neo4j-2023-05-04T17-21-27.backup"))
            .await?
            .bytes()
            .await?;
        assert_eq!(stored.as_ref(), b"backup bytes");
        check_store_access(store.as_ref(), "memory").await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_local_file_aborts_batch() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("second.backup"), b"data")?;
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());

        let names = vec!["first.backup".to_string(), "second.backup".to_string()];
        let result = upload_to_store(Arc::clone(&store), dir.path(), &names, "memory").await;

        match result {
            Err(BackupError::Upload { file, .. }) => assert_eq!(file, "first.backup"),
            other => panic!("expected upload error, got {:?}", other),
        }
        assert!(store.head(&ObjectPath::from("second.backup")).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_local_only_provider_has_no_client() -> anyhow::Result<()> {
        let target = StorageTarget {
            provider: CloudProvider::None,
            bucket_name: String::new(),
            credential_path: "/credentials/".into(),
            minio_endpoint: None,
            azure_account_name: None,
        };
        assert!(create_client(&target, Path::new("/backups")).await?.is_none());
        Ok(())
    }
}
