//! `RemoteStore` over any `object_store` backend.
//!
//! Objects are laid out as `<prefix>/<id>/<display_name>` so that an id maps
//! to exactly one directory and deleting a snapshot is a prefix delete.

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{Result, StorageError};
use crate::traits::{RemoteStore, Snapshot};

/// Snapshot store backed by an `object_store::ObjectStore`.
#[derive(Clone)]
pub struct ObjectStoreRemote {
    store: Arc<dyn ObjectStore>,
    prefix: ObjectPath,
    scheme: &'static str,
}

impl ObjectStoreRemote {
    /// Wrap an existing store. `scheme` is used for snapshot locations and logs.
    pub fn from_store(store: Arc<dyn ObjectStore>, prefix: &str, scheme: &'static str) -> Self {
        Self {
            store,
            prefix: ObjectPath::from(prefix.trim_matches('/')),
            scheme,
        }
    }

    /// Process-local store. Contents are dropped with the last clone.
    pub fn in_memory(prefix: &str) -> Self {
        Self::from_store(Arc::new(InMemory::new()), prefix, "memory")
    }

    /// Directory-backed store, e.g. a mounted network share.
    ///
    /// The root directory is created if missing.
    pub fn local(root: impl AsRef<Path>, prefix: &str) -> Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)?;
        let store = LocalFileSystem::new_with_prefix(root)?;
        Ok(Self::from_store(Arc::new(store), prefix, "file"))
    }

    fn snapshot_dir(&self, id: &str) -> ObjectPath {
        self.prefix.child(id)
    }

    fn object_path(&self, id: &str, display_name: &str) -> ObjectPath {
        self.snapshot_dir(id).child(display_name)
    }

    fn location(&self, path: &ObjectPath) -> String {
        format!("{}://{}", self.scheme, path)
    }

    /// Map an object back to a snapshot. Objects outside the
    /// `<prefix>/<id>/<name>` shape are ignored.
    fn to_snapshot(&self, meta: &ObjectMeta) -> Option<Snapshot> {
        let parts: Vec<_> = meta.location.prefix_match(&self.prefix)?.collect();
        if parts.len() != 2 {
            return None;
        }

        Some(Snapshot {
            id: parts[0].as_ref().to_string(),
            display_name: parts[1].as_ref().to_string(),
            size_bytes: meta.size as u64,
            modified_at: meta.last_modified,
            location: self.location(&meta.location),
        })
    }

    async fn verify_upload(&self, path: &ObjectPath, expected: u64) -> Result<()> {
        let meta = self.store.head(path).await?;
        if meta.size as u64 != expected {
            return Err(StorageError::Verification(format!(
                "{}: stored {} bytes, sent {}",
                path, meta.size, expected
            )));
        }
        Ok(())
    }

    async fn write_to_file(&self, path: &ObjectPath, dest: &Path) -> Result<u64> {
        let result = self.store.get(path).await?;
        let mut stream = result.into_stream();
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;

        while let Some(chunk) = stream.try_next().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }
}

impl std::fmt::Debug for ObjectStoreRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreRemote")
            .field("scheme", &self.scheme)
            .field("prefix", &self.prefix.as_ref())
            .finish()
    }
}

#[async_trait]
impl RemoteStore for ObjectStoreRemote {
    #[instrument(skip(self), fields(backend = self.scheme))]
    async fn list(&self) -> Result<Vec<Snapshot>> {
        let mut results = Vec::new();
        let mut stream = self.store.list(Some(&self.prefix));

        while let Some(meta) = stream.try_next().await? {
            if let Some(snapshot) = self.to_snapshot(&meta) {
                results.push(snapshot);
            }
        }

        // Canonical names embed the creation time, so the name breaks ties
        // between objects written within the same clock tick.
        results.sort_by(|a, b| {
            b.modified_at
                .cmp(&a.modified_at)
                .then_with(|| b.display_name.cmp(&a.display_name))
        });

        debug!("Listed {} snapshots", results.len());
        Ok(results)
    }

    #[instrument(skip(self, data), fields(backend = self.scheme, name = %display_name, size = data.len()))]
    async fn upload(&self, display_name: &str, data: Bytes) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let path = self.object_path(&id, display_name);
        let expected = data.len() as u64;

        debug!("Uploading {} bytes to {}", expected, self.location(&path));
        self.store.put(&path, data.into()).await?;

        // Nothing may stay visible unless the stored object is verified.
        if let Err(e) = self.verify_upload(&path, expected).await {
            warn!("Removing unverified object {}: {}", path, e);
            if let Err(delete_err) = self.store.delete(&path).await {
                warn!("Failed to remove unverified object {}: {}", path, delete_err);
            }
            return Err(e);
        }

        Ok(id)
    }

    #[instrument(skip(self), fields(backend = self.scheme))]
    async fn delete(&self, id: &str) -> Result<()> {
        let dir = self.snapshot_dir(id);
        let objects: Vec<ObjectMeta> = self.store.list(Some(&dir)).try_collect().await?;

        for meta in objects {
            debug!("Deleting {}", self.location(&meta.location));
            match self.store.delete(&meta.location).await {
                Ok(()) => {}
                Err(object_store::Error::NotFound { .. }) => {} // Idempotent
                Err(e) => return Err(StorageError::from(e)),
            }
        }

        Ok(())
    }

    #[instrument(skip(self), fields(backend = self.scheme, dest = %dest.display()))]
    async fn download(&self, id: &str, display_name: &str, dest: &Path) -> Result<u64> {
        let path = self.object_path(id, display_name);
        debug!("Downloading {}", self.location(&path));

        match self.write_to_file(&path, dest).await {
            Ok(written) => Ok(written),
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(dest).await {
                    if remove_err.kind() != std::io::ErrorKind::NotFound {
                        warn!(
                            "Failed to remove partial download {}: {}",
                            dest.display(),
                            remove_err
                        );
                    }
                }
                if e.is_not_found() {
                    return Err(StorageError::NotFound(format!("{}/{}", id, display_name)));
                }
                Err(e)
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        self.scheme
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upload_then_list() {
        let remote = ObjectStoreRemote::in_memory("snapshots");

        let id = remote
            .upload("backup-2024-05-01-10-00-00.backup", Bytes::from("sealed"))
            .await
            .unwrap();

        let listing = remote.list().await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].id, id);
        assert_eq!(listing[0].display_name, "backup-2024-05-01-10-00-00.backup");
        assert_eq!(listing[0].size_bytes, 6);
        assert!(listing[0].location.starts_with("memory://snapshots/"));
    }

    #[tokio::test]
    async fn test_list_empty() {
        let remote = ObjectStoreRemote::in_memory("snapshots");
        assert!(remote.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let remote = ObjectStoreRemote::in_memory("snapshots");

        remote
            .upload("backup-2024-05-01-10-00-00.backup", Bytes::from("a"))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let newest = remote
            .upload("backup-2024-05-02-10-00-00.backup", Bytes::from("b"))
            .await
            .unwrap();

        let listing = remote.list().await.unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].id, newest);
    }

    #[tokio::test]
    async fn test_list_ignores_foreign_objects() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        store
            .put(&ObjectPath::from("snapshots/stray.txt"), Bytes::from("x").into())
            .await
            .unwrap();
        store
            .put(&ObjectPath::from("other/1/a.backup"), Bytes::from("x").into())
            .await
            .unwrap();

        let remote = ObjectStoreRemote::from_store(store, "snapshots", "memory");
        assert!(remote.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let remote = ObjectStoreRemote::in_memory("snapshots");
        let id = remote
            .upload("a.backup", Bytes::from("data"))
            .await
            .unwrap();

        remote.delete(&id).await.unwrap();
        assert!(remote.list().await.unwrap().is_empty());

        remote.delete(&id).await.unwrap();
        remote.delete("does-not-exist").await.unwrap();
    }

    #[tokio::test]
    async fn test_download() {
        let dir = TempDir::new().unwrap();
        let remote = ObjectStoreRemote::in_memory("snapshots");
        let id = remote
            .upload("a.backup", Bytes::from("hello snapshot"))
            .await
            .unwrap();

        let dest = dir.path().join("download.tmp");
        let written = remote.download(&id, "a.backup", &dest).await.unwrap();

        assert_eq!(written, 14);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello snapshot");
    }

    #[tokio::test]
    async fn test_download_missing_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let remote = ObjectStoreRemote::in_memory("snapshots");
        let dest = dir.path().join("download.tmp");

        let err = remote.download("nope", "a.backup", &dest).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_local_directory_remote() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("remote");
        let remote = ObjectStoreRemote::local(&root, "snapshots").unwrap();

        let id = remote
            .upload("a.backup", Bytes::from("on disk"))
            .await
            .unwrap();

        assert!(root.join("snapshots").join(&id).join("a.backup").exists());

        let listing = remote.list().await.unwrap();
        assert_eq!(listing.len(), 1);
        assert!(listing[0].location.starts_with("file://"));

        remote.delete(&id).await.unwrap();
        assert!(remote.list().await.unwrap().is_empty());
    }

    // ------------------------------------------------------------------------
    // Stores whose post-upload check misbehaves
    // ------------------------------------------------------------------------

    #[derive(Debug, Clone, Copy)]
    enum HeadFault {
        Unavailable,
        ShortSize,
    }

    #[derive(Debug)]
    struct FaultyHead {
        inner: InMemory,
        fault: HeadFault,
    }

    impl std::fmt::Display for FaultyHead {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "FaultyHead({:?})", self.fault)
        }
    }

    #[async_trait]
    impl ObjectStore for FaultyHead {
        async fn put_opts(
            &self,
            location: &ObjectPath,
            payload: object_store::PutPayload,
            opts: object_store::PutOptions,
        ) -> object_store::Result<object_store::PutResult> {
            self.inner.put_opts(location, payload, opts).await
        }

        async fn put_multipart_opts(
            &self,
            location: &ObjectPath,
            opts: object_store::PutMultipartOpts,
        ) -> object_store::Result<Box<dyn object_store::MultipartUpload>> {
            self.inner.put_multipart_opts(location, opts).await
        }

        async fn get_opts(
            &self,
            location: &ObjectPath,
            options: object_store::GetOptions,
        ) -> object_store::Result<object_store::GetResult> {
            self.inner.get_opts(location, options).await
        }

        async fn head(&self, location: &ObjectPath) -> object_store::Result<ObjectMeta> {
            match self.fault {
                HeadFault::Unavailable => Err(object_store::Error::Generic {
                    store: "faulty",
                    source: "head request timed out".into(),
                }),
                HeadFault::ShortSize => {
                    let mut meta = self.inner.head(location).await?;
                    meta.size -= 1;
                    Ok(meta)
                }
            }
        }

        async fn delete(&self, location: &ObjectPath) -> object_store::Result<()> {
            self.inner.delete(location).await
        }

        fn list(
            &self,
            prefix: Option<&ObjectPath>,
        ) -> futures::stream::BoxStream<'_, object_store::Result<ObjectMeta>> {
            self.inner.list(prefix)
        }

        async fn list_with_delimiter(
            &self,
            prefix: Option<&ObjectPath>,
        ) -> object_store::Result<object_store::ListResult> {
            self.inner.list_with_delimiter(prefix).await
        }

        async fn copy(&self, from: &ObjectPath, to: &ObjectPath) -> object_store::Result<()> {
            self.inner.copy(from, to).await
        }

        async fn copy_if_not_exists(
            &self,
            from: &ObjectPath,
            to: &ObjectPath,
        ) -> object_store::Result<()> {
            self.inner.copy_if_not_exists(from, to).await
        }
    }

    fn faulty_remote(fault: HeadFault) -> ObjectStoreRemote {
        let store = Arc::new(FaultyHead {
            inner: InMemory::new(),
            fault,
        });
        ObjectStoreRemote::from_store(store, "snapshots", "memory")
    }

    #[tokio::test]
    async fn test_failed_verification_leaves_nothing_visible() {
        let remote = faulty_remote(HeadFault::Unavailable);

        let err = remote
            .upload("a.backup", Bytes::from("sealed"))
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::ObjectStore(_)));
        assert!(remote.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_size_mismatch_is_removed() {
        let remote = faulty_remote(HeadFault::ShortSize);

        let err = remote
            .upload("a.backup", Bytes::from("sealed"))
            .await
            .unwrap_err();

        match err {
            StorageError::Verification(msg) => assert!(msg.contains("stored 5 bytes, sent 6")),
            other => panic!("unexpected error {:?}", other),
        }
        assert!(remote.list().await.unwrap().is_empty());
    }
}
