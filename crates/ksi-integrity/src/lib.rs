//! ksi-integrity
//!
//! Size, SHA-256 and MIME type of persisted artifacts, turned into
//! file-movement rows. Callers treat failures here as non-fatal.

use ksi_schemas::{FileRole, NewFileMovement};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Read size for hashing.
pub const HASH_CHUNK_BYTES: usize = 1024 * 1024;

#[derive(Debug)]
pub struct IntegrityRecordError {
    pub path: PathBuf,
    pub source: io::Error,
}

impl fmt::Display for IntegrityRecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot inspect {}: {}", self.path.display(), self.source)
    }
}

impl std::error::Error for IntegrityRecordError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

fn err(path: &Path, source: io::Error) -> IntegrityRecordError {
    IntegrityRecordError {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub size_bytes: u64,
    /// Lowercase hex.
    pub sha256: String,
    pub mime_type: Option<String>,
}

/// Byte count and SHA-256 (lowercase hex) of everything `src` yields.
/// `path` only labels errors.
pub fn digest_reader(path: &Path, src: &mut dyn Read) -> Result<(u64, String), IntegrityRecordError> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK_BYTES];
    let mut size = 0u64;
    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(err(path, e)),
        };
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((size, hex::encode(hasher.finalize())))
}

/// Streaming SHA-256 of a file, lowercase hex.
pub fn file_sha256(path: &Path) -> Result<String, IntegrityRecordError> {
    let mut f = File::open(path).map_err(|e| err(path, e))?;
    Ok(digest_reader(path, &mut f)?.1)
}

pub fn file_size(path: &Path) -> Result<u64, IntegrityRecordError> {
    fs::metadata(path).map(|m| m.len()).map_err(|e| err(path, e))
}

/// MIME type from the file extension. `None` when the extension is unknown.
pub fn guess_mime(path: &Path) -> Option<String> {
    mime_guess::from_path(path).first().map(|m| m.to_string())
}

pub fn inspect(path: &Path) -> Result<FileMeta, IntegrityRecordError> {
    Ok(FileMeta {
        size_bytes: file_size(path)?,
        sha256: file_sha256(path)?,
        mime_type: guess_mime(path),
    })
}

/// Inspect the local file at `path` and build the file-movement row for it.
pub fn file_movement(
    role: FileRole,
    file_name: &str,
    path: &Path,
) -> Result<NewFileMovement, IntegrityRecordError> {
    let mut f = File::open(path).map_err(|e| err(path, e))?;
    movement_from_reader(role, file_name, path, &mut f)
}

/// File-movement row for a file stored at `path`, read through `src`.
pub fn movement_from_reader(
    role: FileRole,
    file_name: &str,
    path: &Path,
    src: &mut dyn Read,
) -> Result<NewFileMovement, IntegrityRecordError> {
    let (size_bytes, sha256) = digest_reader(path, src)?;
    Ok(NewFileMovement {
        file_role: role,
        file_name: file_name.to_string(),
        file_path: path.to_string_lossy().into_owned(),
        mime_type: guess_mime(path),
        size_bytes: i64::try_from(size_bytes).ok(),
        sha256: Some(sha256),
    })
}
