//! Object store seam and its S3 implementation.

use crate::config::StorageConfig;
use async_trait::async_trait;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client as S3Client;
use aws_types::SdkConfig;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors returned by object store calls
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object store request failed ({operation}): {message}")]
    Transport { operation: &'static str, message: String },

    #[error("Object {0} not found")]
    NotFound(String),
}

impl StorageError {
    fn transport(operation: &'static str, err: impl std::fmt::Display) -> Self {
        StorageError::Transport {
            operation,
            message: err.to_string(),
        }
    }
}

/// Snapshot of one object from a listing call
#[derive(Debug, Clone, PartialEq)]
pub struct StorageObject {
    pub key: String,
    pub size: i64,
    pub last_modified: Option<DateTime<Utc>>,
}

impl StorageObject {
    pub fn new(key: impl Into<String>, size: i64) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified: None,
        }
    }
}

/// Operations the archive needs from the bucket
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List every object under `prefix`, in listing order
    async fn list(&self, prefix: &str) -> Result<Vec<StorageObject>, StorageError>;

    /// Make an object publicly readable
    async fn set_public_read(&self, key: &str) -> Result<(), StorageError>;

    /// Server-side copy; the destination is publicly readable
    async fn copy_public(&self, source_key: &str, destination_key: &str) -> Result<(), StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Existence probe
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Write a zero-byte object
    async fn put_empty(&self, key: &str) -> Result<(), StorageError>;
}

/// S3-backed object store bound to a single bucket
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Create a new store handle from a loaded SDK configuration
    pub fn new(sdk_config: &SdkConfig, config: &StorageConfig) -> Self {
        let mut s3_config_builder = S3ConfigBuilder::from(sdk_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 object store initialized"
        );

        Self {
            client,
            bucket: config.bucket.clone(),
        }
    }

    /// Get the bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Release the client handle
    pub fn close(self) {
        debug!(bucket = %self.bucket, "Releasing S3 client");
        drop(self.client);
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self))]
    async fn list(&self, prefix: &str) -> Result<Vec<StorageObject>, StorageError> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut objects = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page
                .map_err(|e| StorageError::transport("list_objects_v2", DisplayErrorContext(e)))?;

            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                objects.push(StorageObject {
                    key: key.to_string(),
                    size: object.size().unwrap_or_default(),
                    last_modified: object
                        .last_modified()
                        .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos())),
                });
            }
        }

        debug!(prefix = %prefix, count = objects.len(), "Listed objects");
        Ok(objects)
    }

    #[instrument(skip(self))]
    async fn set_public_read(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .put_object_acl()
            .bucket(&self.bucket)
            .key(key)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| StorageError::transport("put_object_acl", DisplayErrorContext(e)))?;

        debug!(key = %key, "Object set to public-read");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn copy_public(&self, source_key: &str, destination_key: &str) -> Result<(), StorageError> {
        // Copy source must be URL-encoded
        let copy_source = format!("{}/{}", self.bucket, urlencoding::encode(source_key));

        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(&copy_source)
            .key(destination_key)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| StorageError::transport("copy_object", DisplayErrorContext(e)))?;

        debug!(from = %source_key, to = %destination_key, "Object copied");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::transport("delete_object", DisplayErrorContext(e)))?;

        debug!(key = %key, "Object deleted");
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
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
                if e.as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false)
                {
                    Ok(false)
                } else {
                    Err(StorageError::transport("head_object", DisplayErrorContext(e)))
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn put_empty(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from_static(b""))
            .send()
            .await
            .map_err(|e| StorageError::transport("put_object", DisplayErrorContext(e)))?;

        debug!(key = %key, "Empty object written");
        Ok(())
    }
}

/// Public URL for `key`, percent-encoding each path segment
pub fn public_url(base_url: &str, key: &str) -> String {
    let encoded: Vec<String> = key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!("{}/{}", base_url.trim_end_matches('/'), encoded.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_url_encodes_spaces() {
        assert_eq!(
            public_url(
                "https://s3.ap-southeast-1.amazonaws.com/recordings",
                "Teacher A/lesson 1.mp4"
            ),
            "https://s3.ap-southeast-1.amazonaws.com/recordings/Teacher%20A/lesson%201.mp4"
        );
    }

    #[test]
    fn test_public_url_keeps_separators() {
        assert_eq!(
            public_url("https://cdn.example.com/", "a/b/c.mp4"),
            "https://cdn.example.com/a/b/c.mp4"
        );
    }

    #[test]
    fn test_storage_object_new() {
        let object = StorageObject::new("TeacherA/clip.mp4", 42);
        assert_eq!(object.key, "TeacherA/clip.mp4");
        assert_eq!(object.size, 42);
        assert!(object.last_modified.is_none());
    }
}
