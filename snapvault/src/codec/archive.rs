//! Encrypted tar.zst snapshots.
//!
//! # File Format
//!
//! ```text
//! [Magic "SVLT": 4] [Format: 1] [Schema: u32 BE]
//! [Argon2 m_cost, t_cost, p_cost: 3 x u32 BE] [Salt: 16] [Nonce: 12]
//! [Ciphertext + Tag]
//! ```
//!
//! The whole header is authenticated as associated data. The plaintext is a
//! zstd-compressed tar holding `metadata.json` and the database files under
//! `db/`.

use aes_gcm::aead::{rand_core::RngCore, Aead, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use super::{CodecError, ImportSummary, SnapshotCodec};

/// Magic bytes for snapshot files
const MAGIC: &[u8; 4] = b"SVLT";

/// Current container format
const FORMAT: u8 = 0x01;

const SALT_SIZE: usize = 16;
const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;

/// magic (4) + format (1) + schema (4) + kdf (12) + salt (16) + nonce (12)
const HEADER_SIZE: usize = 49;

/// Refuse KDF parameters that would exhaust memory before the tag is checked.
const MAX_MEMORY_KIB: u32 = 1024 * 1024;

const METADATA_ENTRY: &str = "metadata.json";
const DB_PREFIX: &str = "db";

/// Argon2id cost parameters, stored in every snapshot header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 65536, // 64 MiB
            iterations: 3,
            parallelism: 4,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotMetadata {
    schema_version: u32,
    exported_at: DateTime<Utc>,
    snapvault_version: String,
    files: u64,
    size_bytes: u64,
}

struct Header {
    format: u8,
    schema: u32,
    kdf: KdfParams,
    salt: [u8; SALT_SIZE],
    nonce: [u8; NONCE_SIZE],
}

impl Header {
    fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(MAGIC);
        out[4] = self.format;
        out[5..9].copy_from_slice(&self.schema.to_be_bytes());
        out[9..13].copy_from_slice(&self.kdf.memory_kib.to_be_bytes());
        out[13..17].copy_from_slice(&self.kdf.iterations.to_be_bytes());
        out[17..21].copy_from_slice(&self.kdf.parallelism.to_be_bytes());
        out[21..37].copy_from_slice(&self.salt);
        out[37..49].copy_from_slice(&self.nonce);
        out
    }

    fn parse(bytes: &[u8; HEADER_SIZE]) -> Result<Self, CodecError> {
        if &bytes[0..4] != MAGIC {
            return Err(CodecError::Corrupt("not a snapvault snapshot".to_string()));
        }

        let be = |range: std::ops::Range<usize>| {
            let mut word = [0u8; 4];
            word.copy_from_slice(&bytes[range]);
            u32::from_be_bytes(word)
        };

        let mut salt = [0u8; SALT_SIZE];
        salt.copy_from_slice(&bytes[21..37]);
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[37..49]);

        Ok(Self {
            format: bytes[4],
            schema: be(5..9),
            kdf: KdfParams {
                memory_kib: be(9..13),
                iterations: be(13..17),
                parallelism: be(17..21),
            },
            salt,
            nonce,
        })
    }
}

/// Snapshot codec for a database stored as a directory of files.
#[derive(Debug, Clone)]
pub struct ArchiveCodec {
    database_dir: PathBuf,
    schema_version: u32,
    kdf: KdfParams,
}

impl ArchiveCodec {
    /// Schema version written by this build.
    pub const CURRENT_SCHEMA: u32 = 1;

    pub fn new(database_dir: impl Into<PathBuf>) -> Self {
        Self {
            database_dir: database_dir.into(),
            schema_version: Self::CURRENT_SCHEMA,
            kdf: KdfParams::default(),
        }
    }

    pub fn with_schema_version(mut self, version: u32) -> Self {
        self.schema_version = version;
        self
    }

    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn database_dir(&self) -> &Path {
        &self.database_dir
    }

    fn build_archive(&self) -> Result<Vec<u8>, CodecError> {
        let mut files = Vec::new();
        collect_files(&self.database_dir, &self.database_dir, &mut files)?;
        files.sort();

        let mut size_bytes = 0u64;
        for rel in &files {
            size_bytes += fs::metadata(self.database_dir.join(rel))?.len();
        }

        let metadata = SnapshotMetadata {
            schema_version: self.schema_version,
            exported_at: Utc::now(),
            snapvault_version: env!("CARGO_PKG_VERSION").to_string(),
            files: files.len() as u64,
            size_bytes,
        };
        let metadata_json = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| CodecError::Corrupt(format!("metadata serialization failed: {}", e)))?;

        let encoder = zstd::stream::Encoder::new(Vec::new(), 3)?;
        let mut archive = tar::Builder::new(encoder);
        add_bytes_to_archive(&mut archive, METADATA_ENTRY, &metadata_json)?;

        for rel in &files {
            let archive_path = Path::new(DB_PREFIX).join(rel);
            let mut file = File::open(self.database_dir.join(rel))?;
            archive.append_file(&archive_path, &mut file)?;
        }

        let encoder = archive.into_inner()?;
        Ok(encoder.finish()?)
    }
}

impl SnapshotCodec for ArchiveCodec {
    fn schema_version(&self) -> u32 {
        self.schema_version
    }

    fn export(&self, passphrase: &str, out: &mut dyn Write) -> Result<u64, CodecError> {
        let plaintext = self.build_archive()?;

        let mut salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut salt);
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let header = Header {
            format: FORMAT,
            schema: self.schema_version,
            kdf: self.kdf,
            salt,
            nonce,
        };
        let header_bytes = header.to_bytes();

        let key = derive_key(passphrase, &salt, &self.kdf)?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| CodecError::Corrupt(format!("cipher init failed: {}", e)))?;
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &plaintext,
                    aad: &header_bytes,
                },
            )
            .map_err(|e| CodecError::Corrupt(format!("encryption failed: {}", e)))?;

        out.write_all(&header_bytes)?;
        out.write_all(&ciphertext)?;
        out.flush()?;

        let written = (HEADER_SIZE + ciphertext.len()) as u64;
        debug!(
            schema = self.schema_version,
            plaintext = plaintext.len(),
            written,
            "Exported snapshot"
        );
        Ok(written)
    }

    fn import(
        &self,
        input: &mut dyn Read,
        passphrase: &str,
        dest: &Path,
    ) -> Result<ImportSummary, CodecError> {
        let mut header_bytes = [0u8; HEADER_SIZE];
        input.read_exact(&mut header_bytes).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                CodecError::Corrupt("truncated header".to_string())
            } else {
                CodecError::Io(e)
            }
        })?;

        let header = Header::parse(&header_bytes)?;
        if header.schema > self.schema_version {
            return Err(CodecError::Downgrade {
                found: header.schema,
                supported: self.schema_version,
            });
        }
        if header.format != FORMAT {
            return Err(CodecError::Corrupt(format!(
                "unknown container format {}",
                header.format
            )));
        }
        if header.kdf.memory_kib > MAX_MEMORY_KIB {
            return Err(CodecError::Corrupt("unreasonable KDF parameters".to_string()));
        }

        let mut ciphertext = Vec::new();
        input.read_to_end(&mut ciphertext)?;

        let key = derive_key(passphrase, &header.salt, &header.kdf)?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| CodecError::Corrupt(format!("cipher init failed: {}", e)))?;
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(&header.nonce),
                Payload {
                    msg: &ciphertext,
                    aad: &header_bytes,
                },
            )
            .map_err(|_| {
                CodecError::Corrupt("decryption failed: wrong passphrase or damaged data".into())
            })?;

        let tarball = zstd::stream::decode_all(plaintext.as_slice())
            .map_err(|e| CodecError::Corrupt(format!("decompression failed: {}", e)))?;

        let summary = extract(&tarball, dest, header.schema)?;
        debug!(
            schema = summary.schema_version,
            files = summary.files,
            bytes = summary.bytes,
            "Imported snapshot"
        );
        Ok(summary)
    }
}

fn derive_key(
    passphrase: &str,
    salt: &[u8; SALT_SIZE],
    kdf: &KdfParams,
) -> Result<[u8; KEY_SIZE], CodecError> {
    let params = Params::new(
        kdf.memory_kib,
        kdf.iterations,
        kdf.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| CodecError::Corrupt(format!("invalid Argon2 parameters: {}", e)))?;

    let mut key = [0u8; KEY_SIZE];
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| CodecError::Corrupt(format!("key derivation failed: {}", e)))?;
    Ok(key)
}

fn extract(tarball: &[u8], dest: &Path, header_schema: u32) -> Result<ImportSummary, CodecError> {
    fs::create_dir_all(dest)?;

    let mut archive = tar::Archive::new(tarball);
    let entries = archive
        .entries()
        .map_err(|e| CodecError::Corrupt(format!("cannot read entries: {}", e)))?;

    let mut metadata: Option<SnapshotMetadata> = None;
    let mut files = 0u64;
    let mut bytes = 0u64;

    for entry in entries {
        let mut entry = entry.map_err(|e| CodecError::Corrupt(format!("entry read failed: {}", e)))?;
        let path = entry
            .path()
            .map_err(|e| CodecError::Corrupt(format!("path read failed: {}", e)))?
            .into_owned();

        if path == Path::new(METADATA_ENTRY) {
            let mut content = String::new();
            entry
                .read_to_string(&mut content)
                .map_err(|e| CodecError::Corrupt(format!("metadata read failed: {}", e)))?;
            metadata = Some(
                serde_json::from_str(&content)
                    .map_err(|e| CodecError::Corrupt(format!("metadata parse failed: {}", e)))?,
            );
            continue;
        }

        let rel = path
            .strip_prefix(DB_PREFIX)
            .map_err(|_| CodecError::Corrupt(format!("unexpected entry {}", path.display())))?;
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(CodecError::Corrupt(format!(
                "unsafe entry path {}",
                path.display()
            )));
        }

        let entry_type = entry.header().entry_type();
        let dest_path = dest.join(rel);
        if entry_type.is_dir() {
            fs::create_dir_all(&dest_path)?;
        } else if entry_type.is_file() {
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut output = File::create(&dest_path)?;
            bytes += std::io::copy(&mut entry, &mut output)?;
            output.sync_all()?;
            files += 1;
        } else {
            return Err(CodecError::Corrupt(format!(
                "unsupported entry type for {}",
                path.display()
            )));
        }
    }

    let metadata =
        metadata.ok_or_else(|| CodecError::Corrupt("no metadata.json in snapshot".to_string()))?;
    if metadata.schema_version != header_schema {
        return Err(CodecError::Corrupt(format!(
            "metadata schema {} does not match header schema {}",
            metadata.schema_version, header_schema
        )));
    }

    Ok(ImportSummary {
        schema_version: metadata.schema_version,
        files,
        bytes,
    })
}

/// Relative paths of every regular file under `dir`.
fn collect_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            collect_files(root, &path, out)?;
        } else if file_type.is_file() {
            if let Ok(rel) = path.strip_prefix(root) {
                out.push(rel.to_path_buf());
            }
        }
    }
    Ok(())
}

fn add_bytes_to_archive<W: Write>(
    archive: &mut tar::Builder<W>,
    name: &str,
    data: &[u8],
) -> std::io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_path(name)?;
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
    );
    header.set_cksum();
    archive.append(&header, data)
}
