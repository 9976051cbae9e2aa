//! Remote snapshot storage for snapvault.
//!
//! This crate provides the `RemoteStore` trait that the backup and restore
//! orchestrators talk to, plus adapters over the `object_store` crate so the
//! same code runs against an in-memory store, a local directory, or S3.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Orchestrators (backup / restore)            │
//! │                    │                         │
//! │                    ▼                         │
//! │            ┌───────────────┐                 │
//! │            │ SerialRemote  │ ← one worker    │
//! │            └───────┬───────┘                 │
//! │                    ▼                         │
//! │            ┌───────────────┐                 │
//! │            │  RemoteStore  │ ← unified trait │
//! │            └───────┬───────┘                 │
//! │        ┌───────────┼───────────┐             │
//! │        ▼           ▼           ▼             │
//! │   ┌─────────┐ ┌─────────┐ ┌─────────┐        │
//! │   │ Memory  │ │  Local  │ │   S3    │        │
//! │   └─────────┘ └─────────┘ └─────────┘        │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Object layout
//!
//! Every uploaded snapshot gets its own id directory:
//!
//! ```text
//! <prefix>/<id>/<display_name>
//!
//! snapshots/6f1c.../backup-2024-05-01-10-00-00.backup
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use snapvault_storage::{ObjectStoreRemote, RemoteStore};
//! use bytes::Bytes;
//!
//! # async fn example() -> snapvault_storage::Result<()> {
//! let remote = ObjectStoreRemote::in_memory("snapshots");
//!
//! let id = remote
//!     .upload("backup-2024-05-01-10-00-00.backup", Bytes::from("sealed"))
//!     .await?;
//!
//! let newest = remote.list().await?;
//! assert_eq!(newest[0].id, id);
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - `s3` - Enable the S3/MinIO backend

mod error;
mod object;
mod serial;
mod traits;

#[cfg(feature = "s3")]
mod s3;

pub use error::{Result, StorageError};
pub use object::ObjectStoreRemote;
pub use serial::SerialRemote;
pub use traits::{RemoteStore, Snapshot};

#[cfg(feature = "s3")]
pub use s3::S3Config;

// Re-export bytes for convenience
pub use bytes::Bytes;

use std::sync::Arc;

/// Create a remote store from configuration.
pub fn create_remote(config: &RemoteBackend, prefix: &str) -> Result<Arc<dyn RemoteStore>> {
    match config {
        RemoteBackend::Memory => Ok(Arc::new(ObjectStoreRemote::in_memory(prefix))),
        RemoteBackend::Local { path } => Ok(Arc::new(ObjectStoreRemote::local(path, prefix)?)),
        #[cfg(feature = "s3")]
        RemoteBackend::S3(s3_config) => Ok(Arc::new(ObjectStoreRemote::s3(
            s3_config.clone(),
            prefix,
        )?)),
        #[cfg(not(feature = "s3"))]
        RemoteBackend::S3(_) => Err(StorageError::Config(
            "S3 remote requires the 's3' feature".to_string(),
        )),
    }
}

/// Remote backend selection.
#[derive(Debug, Clone)]
pub enum RemoteBackend {
    /// Process-local store, lost on exit
    Memory,
    /// Directory on a local or mounted filesystem
    Local {
        /// Root directory of the store
        path: std::path::PathBuf,
    },
    /// S3-compatible object storage
    #[cfg(feature = "s3")]
    S3(S3Config),
    /// S3 placeholder when feature is disabled
    #[cfg(not(feature = "s3"))]
    S3(S3ConfigPlaceholder),
}

/// Placeholder for S3 config when feature is disabled.
#[cfg(not(feature = "s3"))]
#[derive(Debug, Clone, Default)]
pub struct S3ConfigPlaceholder {
    _private: (),
}

impl Default for RemoteBackend {
    fn default() -> Self {
        RemoteBackend::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_memory_remote() {
        let remote = create_remote(&RemoteBackend::Memory, "snapshots").unwrap();
        assert_eq!(remote.backend_name(), "memory");
        assert!(remote.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_local_remote() {
        let dir = TempDir::new().unwrap();
        let config = RemoteBackend::Local {
            path: dir.path().join("remote"),
        };
        let remote = create_remote(&config, "snapshots").unwrap();
        assert_eq!(remote.backend_name(), "file");
    }

    #[cfg(not(feature = "s3"))]
    #[test]
    fn test_s3_requires_feature() {
        let config = RemoteBackend::S3(S3ConfigPlaceholder::default());
        let err = create_remote(&config, "snapshots").err().unwrap();
        assert!(matches!(err, StorageError::Config(_)));
    }
}
