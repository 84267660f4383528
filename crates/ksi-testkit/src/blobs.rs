use ksi_storage::{BlobStore, LocalBlobStore, StorageError};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Local disk store with injected failures.
#[derive(Debug, Default)]
pub struct FailingBlobStore {
    inner: LocalBlobStore,
    /// Fail `write_file` when the file name starts with this.
    fail_write_prefix: Option<String>,
    /// Report `write_file` as done without storing anything when the file
    /// name starts with this.
    drop_write_prefix: Option<String>,
    fail_create_dir: bool,
    fail_move: bool,
    writes: AtomicUsize,
}

impl FailingBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes_named(mut self, prefix: &str) -> Self {
        self.fail_write_prefix = Some(prefix.to_string());
        self
    }

    pub fn drop_writes_named(mut self, prefix: &str) -> Self {
        self.drop_write_prefix = Some(prefix.to_string());
        self
    }

    pub fn fail_create_dir(mut self) -> Self {
        self.fail_create_dir = true;
        self
    }

    pub fn fail_move(mut self) -> Self {
        self.fail_move = true;
        self
    }

    /// Successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

fn injected(op: &'static str, path: &Path) -> StorageError {
    StorageError::new(op, path, io::Error::new(io::ErrorKind::Other, "injected failure"))
}

impl BlobStore for FailingBlobStore {
    fn create_dir(&self, path: &Path) -> Result<(), StorageError> {
        if self.fail_create_dir {
            return Err(injected("create_dir_all", path));
        }
        self.inner.create_dir(path)
    }

    fn write_file(&self, path: &Path, src: &mut dyn Read) -> Result<u64, StorageError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let named = |p: &Option<String>| p.as_deref().is_some_and(|p| name.starts_with(p));
        if named(&self.fail_write_prefix) {
            return Err(injected("write", path));
        }
        if named(&self.drop_write_prefix) {
            return io::copy(src, &mut io::sink()).map_err(|e| StorageError::new("write", path, e));
        }
        let n = self.inner.write_file(path, src)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(n)
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>, StorageError> {
        self.inner.open_read(path)
    }

    fn move_dir(&self, from: &Path, to: &Path) -> Result<(), StorageError> {
        if self.fail_move {
            return Err(injected("rename", from));
        }
        self.inner.move_dir(from, to)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<(), StorageError> {
        self.inner.remove_dir_all(path)
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>, StorageError> {
        self.inner.list_dir(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }
}
