//! ksi-storage
//!
//! Blob storage boundary for job inputs and split output, plus the job folder
//! layout: `<upload_root>/<SERVICE>/<actor>/<job_id>/`.
//!
//! Every operation is safe to repeat after a crash between steps:
//! directory creation is a no-op when the directory exists, and removal of a
//! missing directory succeeds.

use ksi_schemas::ServiceType;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Directory / file I/O failure while persisting inputs or split output.
#[derive(Debug)]
pub struct StorageError {
    pub op: &'static str,
    pub path: PathBuf,
    pub source: io::Error,
}

impl StorageError {
    pub fn new(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            op,
            path: path.into(),
            source,
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}: {}", self.op, self.path.display(), self.source)
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Operations the pipeline needs from blob storage.
///
/// Object safe so the pipeline can hold an `Arc<dyn BlobStore>`.
pub trait BlobStore: Send + Sync {
    /// Create `path` and its parents. No-op if it already exists.
    fn create_dir(&self, path: &Path) -> Result<(), StorageError>;

    /// Stream `src` into `path`, creating parents. Returns bytes written.
    fn write_file(&self, path: &Path, src: &mut dyn Read) -> Result<u64, StorageError>;

    /// Open a stored file for reading.
    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>, StorageError>;

    /// Rename a directory. `to` must not exist.
    fn move_dir(&self, from: &Path, to: &Path) -> Result<(), StorageError>;

    /// Remove a directory and everything below it. Missing is not an error.
    fn remove_dir_all(&self, path: &Path) -> Result<(), StorageError>;

    /// Entries directly under `path`, sorted.
    fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>, StorageError>;

    fn exists(&self, path: &Path) -> bool;
}

/// Local filesystem implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalBlobStore;

impl BlobStore for LocalBlobStore {
    fn create_dir(&self, path: &Path) -> Result<(), StorageError> {
        fs::create_dir_all(path).map_err(|e| StorageError::new("create_dir_all", path, e))
    }

    fn write_file(&self, path: &Path, src: &mut dyn Read) -> Result<u64, StorageError> {
        if let Some(parent) = path.parent() {
            self.create_dir(parent)?;
        }
        let mut f = File::create(path).map_err(|e| StorageError::new("create file", path, e))?;
        let n = io::copy(src, &mut f).map_err(|e| StorageError::new("write file", path, e))?;
        f.flush().map_err(|e| StorageError::new("flush file", path, e))?;
        Ok(n)
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>, StorageError> {
        let f = File::open(path).map_err(|e| StorageError::new("open file", path, e))?;
        Ok(Box::new(f))
    }

    fn move_dir(&self, from: &Path, to: &Path) -> Result<(), StorageError> {
        if let Some(parent) = to.parent() {
            self.create_dir(parent)?;
        }
        fs::rename(from, to).map_err(|e| StorageError::new("rename dir", from, e))
    }

    fn remove_dir_all(&self, path: &Path) -> Result<(), StorageError> {
        match fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::new("remove_dir_all", path, e)),
        }
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>, StorageError> {
        let rd = fs::read_dir(path).map_err(|e| StorageError::new("read_dir", path, e))?;
        let mut out = Vec::new();
        for entry in rd {
            let entry = entry.map_err(|e| StorageError::new("read_dir entry", path, e))?;
            out.push(entry.path());
        }
        out.sort();
        Ok(out)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Path-safe rendering of a free-form name: anything outside
/// `[A-Za-z0-9_-]` becomes `_`; blank input becomes `anonymous`.
pub fn safe_segment(s: &str) -> String {
    let t = s.trim();
    if t.is_empty() {
        return "anonymous".to_string();
    }
    t.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `<upload_root>/<SERVICE>/<actor>/<job_id>`
pub fn job_dir(upload_root: &Path, service: ServiceType, actor: &str, job_id: Uuid) -> PathBuf {
    upload_root
        .join(service.as_str())
        .join(safe_segment(actor))
        .join(job_id.to_string())
}

/// Create (or reuse) the folder for one job and return it.
pub fn allocate_job_folder(
    blobs: &dyn BlobStore,
    upload_root: &Path,
    service: ServiceType,
    actor: &str,
    job_id: Uuid,
) -> Result<PathBuf, StorageError> {
    let dir = job_dir(upload_root, service, actor, job_id);
    blobs.create_dir(&dir)?;
    Ok(dir)
}
