//! S3-compatible snapshot storage.
//!
//! # Configuration
//!
//! ```toml
//! [remote]
//! backend = "s3"
//! prefix = "snapshots"
//!
//! [remote.s3]
//! bucket = "snapvault"
//! region = "us-east-1"
//!
//! # Optional: For MinIO or other S3-compatible services
//! endpoint = "http://localhost:9000"
//! force_path_style = true
//! ```

use object_store::aws::AmazonS3Builder;
use std::sync::Arc;

use crate::error::{Result, StorageError};
use crate::object::ObjectStoreRemote;

/// Configuration for S3 storage.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,
    /// AWS region
    pub region: String,
    /// Optional custom endpoint (for MinIO, etc.)
    pub endpoint: Option<String>,
    /// Use path-style requests (required for MinIO)
    pub force_path_style: bool,
    /// Optional access key (if not using IAM/env credentials)
    pub access_key_id: Option<String>,
    /// Optional secret key
    pub secret_access_key: Option<String>,
    /// Allow HTTP (non-HTTPS) connections
    pub allow_http: bool,
}

impl S3Config {
    /// Create a new S3 configuration for AWS.
    pub fn aws(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
            endpoint: None,
            force_path_style: false,
            access_key_id: None,
            secret_access_key: None,
            allow_http: false,
        }
    }

    /// Create configuration for MinIO or other S3-compatible services.
    pub fn minio(bucket: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: "us-east-1".to_string(),
            endpoint: Some(endpoint.into()),
            force_path_style: true,
            access_key_id: None,
            secret_access_key: None,
            allow_http: true,
        }
    }

    /// Set explicit credentials.
    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }
}

impl ObjectStoreRemote {
    /// Snapshot store in an S3 bucket.
    pub fn s3(config: S3Config, prefix: &str) -> Result<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region)
            .with_allow_http(config.allow_http);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }

        if config.force_path_style {
            builder = builder.with_virtual_hosted_style_request(false);
        }

        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            builder = builder
                .with_access_key_id(key_id)
                .with_secret_access_key(secret);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self::from_store(Arc::new(store), prefix, "s3"))
    }
}
