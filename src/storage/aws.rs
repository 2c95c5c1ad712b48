// graphdb-backup/src/storage/aws.rs
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::error::DisplayErrorContext;
use s3::primitives::ByteStream;
use s3::types::{CompletedMultipartUpload, CompletedPart};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

use super::StorageClient;
use super::credentials::AwsCredentials;
use crate::config::StorageTarget;
use crate::errors::{BackupError, Result};

// Single PUTs are capped at 5 GiB by S3; larger artifacts go through multipart upload
const MULTIPART_THRESHOLD: u64 = 1024 * 1024 * 1024;
const MIN_PART_SIZE: usize = 64 * 1024 * 1024;
const MAX_PARTS: u64 = 10_000;

/// S3 client; also talks to MinIO when `MINIO_ENDPOINT` is set.
pub struct AwsClient {
    client: s3::Client,
    source_dir: PathBuf,
}

impl AwsClient {
    pub async fn new(target: &StorageTarget, source_dir: &Path) -> Result<Self> {
        let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest());

        // Without a mounted secret the pod's service account (IRSA) supplies credentials
        if !target.uses_ambient_identity() {
            let creds = AwsCredentials::from_file(Path::new(&target.credential_path))?;
            if let Some(region) = creds.region.clone() {
                loader = loader.region(Region::new(region));
            }
            loader = loader.credentials_provider(s3::config::Credentials::new(
                creds.access_key_id,
                creds.secret_access_key,
                None,
                None,
                "CredentialFile",
            ));
        }
        if let Some(endpoint) = &target.minio_endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        let s3_config = s3::config::Builder::from(&sdk_config)
            .force_path_style(target.minio_endpoint.is_some())
            .build();

        Ok(AwsClient {
            client: s3::Client::from_conf(s3_config),
            source_dir: source_dir.to_path_buf(),
        })
    }
}

impl AwsClient {
    /// Uploads `file_path` in parts; the upload is aborted when any part fails.
    async fn upload_multipart(&self, file_path: &Path, key: &str, bucket: &str, size: u64) -> Result<()> {
        let part_size = part_size_for(size);
        info!(
            key = %key,
            size,
            parts = size.div_ceil(part_size as u64),
            "Starting multipart upload"
        );

        let multipart = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| upload_error(key, bucket, DisplayErrorContext(&e).to_string()))?;
        let upload_id = multipart
            .upload_id()
            .ok_or_else(|| upload_error(key, bucket, "no upload id returned".into()))?;

        match self.upload_parts(file_path, key, bucket, upload_id, part_size).await {
            Ok(parts) => {
                let completed = CompletedMultipartUpload::builder().set_parts(Some(parts)).build();
                self.client
                    .complete_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .multipart_upload(completed)
                    .send()
                    .await
                    .map_err(|e| upload_error(key, bucket, DisplayErrorContext(&e).to_string()))?;
                Ok(())
            }
            Err(e) => {
                if let Err(abort) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .send()
                    .await
                {
                    warn!(key = %key, error = %DisplayErrorContext(&abort), "Failed to abort multipart upload");
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        file_path: &Path,
        key: &str,
        bucket: &str,
        upload_id: &str,
        part_size: usize,
    ) -> Result<Vec<CompletedPart>> {
        let mut file = tokio::fs::File::open(file_path)
            .await
            .map_err(|e| upload_error(key, bucket, e.to_string()))?;
        let mut parts = Vec::new();
        let mut part_number = 1;

        loop {
            let chunk = read_part(&mut file, part_size)
                .await
                .map_err(|e| upload_error(key, bucket, e.to_string()))?;
            if chunk.is_empty() {
                break;
            }
            debug!(key = %key, part_number, bytes = chunk.len(), "Uploading part");

            let uploaded = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .map_err(|e| upload_error(key, bucket, DisplayErrorContext(&e).to_string()))?;

            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(uploaded.e_tag().map(str::to_string))
                    .build(),
            );
            part_number += 1;
        }
        Ok(parts)
    }
}

#[async_trait]
impl StorageClient for AwsClient {
    async fn check_access(&self, bucket: &str) -> Result<()> {
        self.client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| BackupError::StorageAccess {
                target: format!("s3://{}", bucket),
                reason: DisplayErrorContext(&e).to_string(),
            })?;
        info!(bucket = %bucket, "✓ Target bucket is accessible");
        Ok(())
    }

    async fn upload_file(&self, file_names: &[String], bucket: &str) -> Result<()> {
        for file_name in file_names {
            let file_path = self.source_dir.join(file_name);
            let size = tokio::fs::metadata(&file_path)
                .await
                .map_err(|e| upload_error(file_name, bucket, e.to_string()))?
                .len();
            info!(file = %file_path.display(), bucket = %bucket, size, "Uploading to S3");

            if size > MULTIPART_THRESHOLD {
                self.upload_multipart(&file_path, file_name, bucket, size).await?;
            } else {
                let body = ByteStream::from_path(&file_path)
                    .await
                    .map_err(|e| upload_error(file_name, bucket, e.to_string()))?;

                self.client
                    .put_object()
                    .bucket(bucket)
                    .key(file_name)
                    .body(body)
                    .send()
                    .await
                    .map_err(|e| upload_error(file_name, bucket, DisplayErrorContext(&e).to_string()))?;
            }

            info!(file = %file_name, bucket = %bucket, "✅ Successfully uploaded");
        }
        Ok(())
    }
}

fn upload_error(file: &str, bucket: &str, reason: String) -> BackupError {
    BackupError::Upload {
        file: file.to_string(),
        target: format!("s3://{}", bucket),
        reason,
    }
}

/// Part size for an object of `size` bytes, large enough to stay within the part limit.
fn part_size_for(size: u64) -> usize {
    let needed = size.div_ceil(MAX_PARTS) as usize;
    needed.max(MIN_PART_SIZE)
}

/// Fills one part from `reader`; shorter than `part_size` only at end of file.
async fn read_part<R: AsyncRead + Unpin>(reader: &mut R, part_size: usize) -> std::io::Result<Vec<u8>> {
    let mut chunk = Vec::with_capacity(part_size);
    reader.take(part_size as u64).read_to_end(&mut chunk).await?;
    Ok(chunk)
}
