//! Remote store configuration.
//!
//! # Configuration Examples
//!
//! ## Directory-backed remote (Default)
//!
//! ```toml
//! [remote]
//! backend = "local"
//! path = "/mnt/nas/snapvault"
//! prefix = "snapshots"
//! ```
//!
//! ## S3 / MinIO (requires `remote-s3` feature)
//!
//! ```toml
//! [remote]
//! backend = "s3"
//!
//! [remote.s3]
//! bucket = "my-snapshots"
//! region = "us-east-1"
//! endpoint = "http://localhost:9000"
//! force_path_style = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use snapvault_storage::{RemoteBackend, RemoteStore};

/// Remote store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteConfig {
    /// Backend type: "local", "memory", or "s3"
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Root directory for the "local" backend (defaults to `<data_dir>/remote`)
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Key prefix every snapshot is stored under
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// S3 configuration (for the "s3" backend)
    #[serde(default)]
    pub s3: Option<S3RemoteConfig>,
}

fn default_backend() -> String {
    "local".to_string()
}

fn default_prefix() -> String {
    "snapshots".to_string()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: None,
            prefix: default_prefix(),
            s3: None,
        }
    }
}

/// S3-compatible remote configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct S3RemoteConfig {
    /// S3 bucket name
    pub bucket: String,

    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,

    /// Custom endpoint (for MinIO, etc.)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Use path-style requests (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,

    /// Access key ID (optional, uses AWS credential chain if not set)
    #[serde(default)]
    pub access_key_id: Option<String>,

    /// Secret access key (optional)
    #[serde(default)]
    pub secret_access_key: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl RemoteConfig {
    /// Resolve the backend selection. `data_dir` anchors the default local path.
    pub fn backend(&self, data_dir: &Path) -> Result<RemoteBackend, crate::Error> {
        match self.backend.as_str() {
            "memory" => Ok(RemoteBackend::Memory),
            "local" => Ok(RemoteBackend::Local {
                path: self
                    .path
                    .clone()
                    .unwrap_or_else(|| data_dir.join("remote")),
            }),
            #[cfg(feature = "remote-s3")]
            "s3" => {
                let s3 = self.s3.as_ref().ok_or_else(|| {
                    crate::Error::Config("S3 backend requires [remote.s3] section".to_string())
                })?;

                let mut config = if let Some(ref endpoint) = s3.endpoint {
                    snapvault_storage::S3Config::minio(&s3.bucket, endpoint)
                } else {
                    snapvault_storage::S3Config::aws(&s3.bucket, &s3.region)
                };
                config.region = s3.region.clone();
                config.force_path_style = s3.force_path_style;

                if let (Some(key), Some(secret)) = (&s3.access_key_id, &s3.secret_access_key) {
                    config = config.with_credentials(key, secret);
                }

                Ok(RemoteBackend::S3(config))
            }
            #[cfg(not(feature = "remote-s3"))]
            "s3" => Err(crate::Error::Config(
                "S3 remote requires the 'remote-s3' feature".to_string(),
            )),
            other => Err(crate::Error::Config(format!(
                "Unknown remote backend: {}. Use 'local', 'memory', or 's3'",
                other
            ))),
        }
    }

    /// Create a RemoteStore from this configuration.
    pub fn create_remote(&self, data_dir: &Path) -> Result<Arc<dyn RemoteStore>, crate::Error> {
        let backend = self.backend(data_dir)?;
        Ok(snapvault_storage::create_remote(&backend, &self.prefix)?)
    }
}
