//! Single-worker dispatcher for remote calls.
//!
//! Every call is sent to one background task over a bounded channel and
//! answered on a oneshot, so at most one remote call is in flight per
//! `SerialRemote` and calls complete in submission order.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::error::{Result, StorageError};
use crate::traits::{RemoteStore, Snapshot};

const QUEUE_DEPTH: usize = 16;

enum Request {
    List {
        reply: oneshot::Sender<Result<Vec<Snapshot>>>,
    },
    Upload {
        display_name: String,
        data: Bytes,
        reply: oneshot::Sender<Result<String>>,
    },
    Delete {
        id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Download {
        id: String,
        display_name: String,
        dest: PathBuf,
        reply: oneshot::Sender<Result<u64>>,
    },
}

/// Serializes calls to an inner [`RemoteStore`] through a dedicated worker task.
///
/// Must be created inside a Tokio runtime. The worker exits when the last
/// clone is dropped.
#[derive(Clone)]
pub struct SerialRemote {
    tx: mpsc::Sender<Request>,
    backend: &'static str,
}

impl SerialRemote {
    /// Spawn the worker for `inner`.
    pub fn spawn(inner: Arc<dyn RemoteStore>) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let backend = inner.backend_name();
        tokio::spawn(worker(inner, rx));
        debug!(backend = backend, "Started serial remote worker");
        Self { tx, backend }
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> Request,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| StorageError::WorkerStopped)?;
        rx.await.map_err(|_| StorageError::WorkerStopped)?
    }
}

async fn worker(inner: Arc<dyn RemoteStore>, mut rx: mpsc::Receiver<Request>) {
    while let Some(request) = rx.recv().await {
        // A dropped receiver means the caller went away; the result is discarded.
        match request {
            Request::List { reply } => {
                trace!("serial remote: list");
                let _ = reply.send(inner.list().await);
            }
            Request::Upload {
                display_name,
                data,
                reply,
            } => {
                trace!("serial remote: upload {}", display_name);
                let _ = reply.send(inner.upload(&display_name, data).await);
            }
            Request::Delete { id, reply } => {
                trace!("serial remote: delete {}", id);
                let _ = reply.send(inner.delete(&id).await);
            }
            Request::Download {
                id,
                display_name,
                dest,
                reply,
            } => {
                trace!("serial remote: download {}", id);
                let _ = reply.send(inner.download(&id, &display_name, &dest).await);
            }
        }
    }
    debug!("Serial remote worker stopped");
}

impl std::fmt::Debug for SerialRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialRemote")
            .field("backend", &self.backend)
            .finish()
    }
}

#[async_trait]
impl RemoteStore for SerialRemote {
    async fn list(&self) -> Result<Vec<Snapshot>> {
        self.call(|reply| Request::List { reply }).await
    }

    async fn upload(&self, display_name: &str, data: Bytes) -> Result<String> {
        let display_name = display_name.to_string();
        self.call(|reply| Request::Upload {
            display_name,
            data,
            reply,
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.call(|reply| Request::Delete { id, reply }).await
    }

    async fn download(&self, id: &str, display_name: &str, dest: &Path) -> Result<u64> {
        let id = id.to_string();
        let display_name = display_name.to_string();
        let dest = dest.to_path_buf();
        self.call(|reply| Request::Download {
            id,
            display_name,
            dest,
            reply,
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectStoreRemote;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records the peak number of concurrent calls.
    struct OverlapCounter {
        inner: ObjectStoreRemote,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl OverlapCounter {
        async fn enter(&self) {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        fn leave(&self) {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl RemoteStore for OverlapCounter {
        async fn list(&self) -> Result<Vec<Snapshot>> {
            self.enter().await;
            let r = self.inner.list().await;
            self.leave();
            r
        }

        async fn upload(&self, display_name: &str, data: Bytes) -> Result<String> {
            self.enter().await;
            let r = self.inner.upload(display_name, data).await;
            self.leave();
            r
        }

        async fn delete(&self, id: &str) -> Result<()> {
            self.enter().await;
            let r = self.inner.delete(id).await;
            self.leave();
            r
        }

        async fn download(&self, id: &str, display_name: &str, dest: &Path) -> Result<u64> {
            self.inner.download(id, display_name, dest).await
        }

        fn backend_name(&self) -> &'static str {
            "overlap"
        }
    }

    #[tokio::test]
    async fn test_calls_are_serialized() {
        let counter = Arc::new(OverlapCounter {
            inner: ObjectStoreRemote::in_memory("snapshots"),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let remote = SerialRemote::spawn(counter.clone());

        let mut handles = Vec::new();
        for i in 0..8 {
            let remote = remote.clone();
            handles.push(tokio::spawn(async move {
                remote
                    .upload(&format!("{i}.backup"), Bytes::from("x"))
                    .await
                    .unwrap();
                remote.list().await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(counter.peak.load(Ordering::SeqCst), 1);
        assert_eq!(remote.list().await.unwrap().len(), 8);
        assert_eq!(remote.backend_name(), "overlap");
    }

    #[tokio::test]
    async fn test_forwards_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let remote = SerialRemote::spawn(Arc::new(ObjectStoreRemote::in_memory("snapshots")));

        let err = remote
            .download("missing", "a.backup", &dir.path().join("x"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        remote.delete("missing").await.unwrap();
    }
}
