//! Core remote store trait definitions.
//!
//! The `RemoteStore` trait is the only way the orchestrators reach the remote
//! service. Sign-in, transport and retries belong to the implementation.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// A snapshot file, either committed locally or stored remotely.
///
/// Identity is `(id, display_name)`. `location` tells local files
/// (`file://...`) apart from remote objects (`<backend>://...`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Opaque identifier assigned by the store
    pub id: String,
    /// Human-readable file name
    pub display_name: String,
    /// Size in bytes
    pub size_bytes: u64,
    /// Last modification time
    pub modified_at: DateTime<Utc>,
    /// URI of the stored bytes
    pub location: String,
}

impl Snapshot {
    /// Describe a committed local file. The file name doubles as the id.
    pub fn local(path: &Path, size_bytes: u64, modified_at: DateTime<Utc>) -> Self {
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            id: display_name.clone(),
            display_name,
            size_bytes,
            modified_at,
            location: format!("file://{}", path.display()),
        }
    }

    /// Whether the bytes live on the local filesystem.
    pub fn is_local(&self) -> bool {
        self.location.starts_with("file://")
    }
}

/// Remote snapshot store.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`. Callers that need the
/// one-call-at-a-time guarantee wrap the store in
/// [`SerialRemote`](crate::SerialRemote).
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List every snapshot, most recently modified first.
    ///
    /// An empty store is not an error.
    async fn list(&self) -> Result<Vec<Snapshot>>;

    /// Upload a complete snapshot and return its new id.
    ///
    /// Either the whole object becomes visible or nothing does.
    async fn upload(&self, display_name: &str, data: Bytes) -> Result<String>;

    /// Delete a snapshot. Deleting a missing id succeeds.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Download a snapshot into `dest`, returning the number of bytes written.
    ///
    /// `dest` is owned by the caller. On failure no partial file is left behind.
    async fn download(&self, id: &str, display_name: &str, dest: &Path) -> Result<u64>;

    /// Get the backend name (for logging/debugging).
    fn backend_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::path::PathBuf;

    #[test]
    fn test_local_snapshot() {
        let path = PathBuf::from("/var/backups/backup-2024-05-01-10-00-00.backup");
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let snap = Snapshot::local(&path, 42, at);

        assert_eq!(snap.id, "backup-2024-05-01-10-00-00.backup");
        assert_eq!(snap.display_name, snap.id);
        assert!(snap.is_local());
        assert_eq!(
            snap.location,
            "file:///var/backups/backup-2024-05-01-10-00-00.backup"
        );
    }
}
