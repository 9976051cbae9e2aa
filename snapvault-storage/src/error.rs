//! Remote storage error types.

use std::io;
use thiserror::Error;

/// Remote store operation errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error while staging data locally
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Snapshot not found
    #[error("Snapshot not found: {0}")]
    NotFound(String),

    /// Storage backend error
    #[error("Backend error: {0}")]
    Backend(String),

    /// Object store error
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// Uploaded object did not match what was sent
    #[error("Upload verification failed: {0}")]
    Verification(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The dedicated remote worker is no longer running
    #[error("Remote worker stopped")]
    WorkerStopped,
}

/// Result type for remote storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    /// Check if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
            || matches!(self, StorageError::ObjectStore(object_store::Error::NotFound { .. }))
            || matches!(self, StorageError::Io(e) if e.kind() == io::ErrorKind::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_not_found() {
        let err = StorageError::NotFound("abc".to_string());
        assert!(err.is_not_found());

        let io_err = StorageError::Io(io::Error::new(io::ErrorKind::NotFound, "not found"));
        assert!(io_err.is_not_found());

        assert!(!StorageError::WorkerStopped.is_not_found());
    }

    #[test]
    fn test_error_display() {
        let err = StorageError::NotFound("snapshots/1234/backup.backup".to_string());
        assert_eq!(
            err.to_string(),
            "Snapshot not found: snapshots/1234/backup.backup"
        );
    }
}
