//! Snapshot encoding.
//!
//! The orchestrators only see the [`SnapshotCodec`] trait. [`ArchiveCodec`]
//! is the shipped implementation.

mod archive;

pub use archive::{ArchiveCodec, KdfParams};

use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;

/// Errors produced while encoding or decoding a snapshot.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The snapshot was written by a newer schema than this build supports.
    #[error("snapshot schema {found} is newer than supported schema {supported}")]
    Downgrade { found: u32, supported: u32 },

    /// The snapshot cannot be decoded. A wrong passphrase looks the same.
    #[error("corrupt snapshot: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What an import wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub schema_version: u32,
    pub files: u64,
    pub bytes: u64,
}

/// Turns the live database into a sealed byte stream and back.
///
/// Both operations block; callers run them on the blocking pool.
pub trait SnapshotCodec: Send + Sync {
    /// Highest schema version this codec can import.
    fn schema_version(&self) -> u32;

    /// Write a snapshot of the database to `out`, returning the bytes written.
    fn export(&self, passphrase: &str, out: &mut dyn Write) -> Result<u64, CodecError>;

    /// Decode a snapshot from `input` into the empty directory `dest`.
    ///
    /// `dest` is left for the caller to discard on error.
    fn import(
        &self,
        input: &mut dyn Read,
        passphrase: &str,
        dest: &Path,
    ) -> Result<ImportSummary, CodecError>;
}
