//! Blob storage for uploaded images.
//!
//! Uploads go either to an S3 bucket or to a directory under the server's
//! data dir (served back via `/uploads`). Either way the caller gets a
//! public URL to persist on the owning record.

use anyhow::{Context, Result};
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

use crate::config::{ServerConfig, StorageConfig};

pub enum Storage {
    S3 {
        client: aws_sdk_s3::Client,
        bucket: String,
        bucket_url: String,
    },
    Local {
        dir: PathBuf,
        public_base: String,
    },
}

impl Storage {
    pub async fn from_config(storage: &StorageConfig, server: &ServerConfig) -> Result<Self> {
        if storage.use_s3 {
            let bucket = storage
                .bucket
                .clone()
                .context("storage.bucket is required when use_s3 is set")?;
            let bucket_url = storage
                .bucket_url
                .clone()
                .context("storage.bucket_url is required when use_s3 is set")?;

            let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
            if let Some(region) = storage.region.clone() {
                loader = loader.region(aws_sdk_s3::config::Region::new(region));
            }
            let sdk_config = loader.load().await;
            info!("Using S3 storage, bucket {}", bucket);
            Ok(Storage::S3 {
                client: aws_sdk_s3::Client::new(&sdk_config),
                bucket,
                bucket_url,
            })
        } else {
            let dir = server.data_dir.join("uploads");
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("Failed to create upload dir {}", dir.display()))?;
            info!("Using local storage at {}", dir.display());
            Ok(Storage::Local {
                dir,
                public_base: server.public_url.trim_end_matches('/').to_string(),
            })
        }
    }

    /// Store a blob under a random name in `folder` and return its public URL.
    pub async fn store(
        &self,
        folder: &str,
        extension: &str,
        content_type: &str,
        bytes: Bytes,
    ) -> Result<String> {
        let key = format!("{folder}/{}.{extension}", Uuid::new_v4());
        match self {
            Storage::S3 {
                client,
                bucket,
                bucket_url,
            } => {
                client
                    .put_object()
                    .bucket(bucket)
                    .key(&key)
                    .content_type(content_type)
                    .body(ByteStream::from(bytes))
                    .send()
                    .await
                    .context("S3 upload failed")?;
                Ok(format!("{}/{key}", bucket_url.trim_end_matches('/')))
            }
            Storage::Local { dir, public_base } => {
                let path = dir.join(&key);
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&path, &bytes)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                Ok(format!("{public_base}/uploads/{key}"))
            }
        }
    }

    /// Directory served as `/uploads` when storing locally.
    pub fn local_dir(&self) -> Option<&PathBuf> {
        match self {
            Storage::Local { dir, .. } => Some(dir),
            Storage::S3 { .. } => None,
        }
    }
}
