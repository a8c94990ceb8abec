//! [`ObjectStore`] capability and its S3 implementation.

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Errors produced while downloading an object.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The object request itself failed (missing object, access denied, network).
    #[error("object request failed: {0}")]
    Request(String),

    /// The response body could not be streamed to completion.
    #[error("object body read failed: {0}")]
    Body(String),

    /// Writing the downloaded bytes to the local file failed.
    #[error("local write failed")]
    Write(#[from] std::io::Error),
}

/// Fetch a named object from a bucket into a local file.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download `key` from `bucket` into `dest`, returning the bytes written.
    async fn download(&self, bucket: &str, key: &str, dest: &mut File) -> Result<u64, StoreError>;
}

/// [`ObjectStore`] backed by `GetObject`.
#[derive(Clone)]
pub struct S3Store {
    client: aws_sdk_s3::Client,
}

impl S3Store {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn download(&self, bucket: &str, key: &str, dest: &mut File) -> Result<u64, StoreError> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StoreError::Request(DisplayErrorContext(&e).to_string()))?;

        let mut body = resp.body;
        let mut written = 0u64;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| StoreError::Body(e.to_string()))?
        {
            dest.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        dest.flush().await?;

        Ok(written)
    }
}
