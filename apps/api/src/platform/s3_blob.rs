use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::HostedConfig;
use crate::platform::memory::UPLOAD_ROOT;
use crate::platform::{Blob, BlobRef, BlobStore, Document, PlatformError};

/// Blob storage on S3 (AWS in production, MinIO locally).
pub struct S3BlobStore {
    client: S3Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(client: S3Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
pub async fn build_s3_client(config: &HostedConfig) -> S3Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "resumind-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    // MinIO only serves path-style URLs.
    let s3_config = aws_sdk_s3::config::Builder::from(&s3_config)
        .force_path_style(true)
        .build();

    aws_sdk_s3::Client::from_conf(s3_config)
}

fn storage_error(context: &str, e: impl std::fmt::Display) -> PlatformError {
    PlatformError::Storage(format!("{context}: {e}"))
}

fn file_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn write(&self, path: &str, document: Document) -> Result<BlobRef, PlatformError> {
        let size = document.bytes.len() as u64;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(ByteStream::from(document.bytes))
            .content_type(&document.content_type)
            .send()
            .await
            .map_err(|e| storage_error("S3 upload failed", e))?;

        info!("Uploaded s3://{}/{} ({size} bytes)", self.bucket, path);

        Ok(BlobRef {
            path: path.to_string(),
            name: file_name(path),
            size,
            content_type: Some(document.content_type),
        })
    }

    async fn read(&self, path: &str) -> Result<Blob, PlatformError> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| {
                let e = e.into_service_error();
                if e.is_no_such_key() {
                    PlatformError::NotFound(path.to_string())
                } else {
                    storage_error("S3 read failed", e)
                }
            })?;

        let content_type = object.content_type().map(str::to_string);
        let bytes = object
            .body
            .collect()
            .await
            .map_err(|e| storage_error("S3 body read failed", e))?
            .into_bytes();

        Ok(Blob {
            content_type,
            bytes,
        })
    }

    async fn upload(&self, document: Document) -> Result<BlobRef, PlatformError> {
        let path = format!("{UPLOAD_ROOT}{}/{}", Uuid::new_v4(), document.name);
        self.write(&path, document).await
    }

    async fn delete(&self, path: &str) -> Result<(), PlatformError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| storage_error("S3 delete failed", e))?;
        debug!("Deleted s3://{}/{}", self.bucket, path);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobRef>, PlatformError> {
        let mut refs = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| storage_error("S3 list failed", e))?;
            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                refs.push(BlobRef {
                    path: key.to_string(),
                    name: file_name(key),
                    size: object.size().unwrap_or_default().max(0) as u64,
                    content_type: None,
                });
            }
        }

        Ok(refs)
    }
}
