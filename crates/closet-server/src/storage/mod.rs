//! Object store client
//!
//! Durable byte storage keyed by opaque string keys, backed by any
//! S3-compatible service. Stages depend on the [`ObjectStore`] trait so
//! tests can substitute an in-memory store; production wiring uses
//! [`Storage`] over aws-sdk-s3.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    presigning::PresigningConfig,
    primitives::ByteStream,
    Client,
};
use std::time::Duration;
use tracing::{debug, info, instrument};

pub mod config;

/// Byte storage contract the stages program against.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store bytes under a key, overwriting any previous object.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()>;

    /// Fetch the full object bytes.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Check whether an object exists without fetching it.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Generate a fresh time-limited readable URL for the object. Signed
    /// URLs are never persisted; every caller gets an independent expiry.
    async fn presign(&self, key: &str, expires_in: Duration) -> Result<String>;
}

/// S3-backed object store client.
#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
}

impl Storage {
    pub async fn new(config: config::StorageConfig) -> Result<Self> {
        debug!("Initializing storage with config: {:?}", config);

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "closet-storage",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!("Storage client initialized for bucket: {}", config.bucket);

        Ok(Self {
            client,
            bucket: config.bucket,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for Storage {
    #[instrument(skip(self, data))]
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        debug!(
            "Uploading {} bytes to s3://{}/{}",
            data.len(),
            self.bucket,
            key
        );

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .context("Failed to upload to S3")?;

        info!("Uploaded s3://{}/{}", self.bucket, key);

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        debug!("Downloading from s3://{}/{}", self.bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context(format!("Failed to download from S3: {}", key))?;

        let data = response
            .body
            .collect()
            .await
            .context("Failed to read S3 response body")?
            .into_bytes()
            .to_vec();

        debug!(
            "Downloaded {} bytes from s3://{}/{}",
            data.len(),
            self.bucket,
            key
        );

        Ok(data)
    }

    #[instrument(skip(self))]
    async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.to_string().contains("NotFound") || e.to_string().contains("404") {
                    Ok(false)
                } else {
                    Err(anyhow!("Failed to check S3 object existence: {}", e))
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn presign(&self, key: &str, expires_in: Duration) -> Result<String> {
        debug!(
            "Generating presigned URL for s3://{}/{} (expires in: {:?})",
            self.bucket, key, expires_in
        );

        let presigning_config = PresigningConfig::expires_in(expires_in)
            .context("Failed to create presigning config")?;

        let presigned_request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .context("Failed to generate presigned URL")?;

        Ok(presigned_request.uri().to_string())
    }
}

/// Key for an original uploaded artifact: `{user_id}/{artifact_id}.{ext}`.
pub fn artifact_key(user_id: &str, artifact_id: &str, ext: &str) -> String {
    format!("{}/{}.{}", user_id, artifact_id, ext)
}

/// Key for a synthesized clipart derivative:
/// `{user_id}/closet_items/{artifact_id}.png`. Deterministic so that
/// re-running synthesis overwrites instead of accumulating derivatives.
pub fn clipart_key(user_id: &str, artifact_id: &str) -> String {
    format!("{}/closet_items/{}.png", user_id, artifact_id)
}

/// Key for extracted document text: `{job_id}.txt`.
pub fn text_key(job_id: &str) -> String {
    format!("{}.txt", job_id)
}
