//! Where TFTP transfers read and write files.

use std::fs::OpenOptions;
use std::path::{Component, Path, PathBuf};

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::StoreError;

pub type FileReader = Box<dyn AsyncRead + Send + Unpin>;
pub type FileWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Backing storage for the TFTP server.
pub trait FileStore: Send + Sync {
    /// Open `filename` for reading and report its size in bytes.
    fn open(&self, filename: &str) -> Result<(FileReader, u64), StoreError>;

    /// Create `filename` for writing. Fails if it already exists.
    fn create(&self, filename: &str) -> Result<FileWriter, StoreError>;
}

/// Serves files from a directory tree.
///
/// Requested names are relative to the root; a leading `/` is ignored.
/// Names that climb out of the root, directly or through a symlink, are
/// refused.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join `filename` onto the root, rejecting anything but plain names.
    fn join(&self, filename: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(filename.trim_start_matches('/'));

        if relative.as_os_str().is_empty() || filename.contains('\0') {
            return Err(StoreError::NotFound);
        }
        let plain = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
        if !plain {
            return Err(StoreError::AccessDenied);
        }

        Ok(self.root.join(relative))
    }

    /// Ensure an existing path resolves inside the root.
    fn contain(&self, path: &Path) -> Result<PathBuf, StoreError> {
        let root = self.root.canonicalize()?;
        let resolved = path.canonicalize()?;
        if !resolved.starts_with(&root) {
            return Err(StoreError::AccessDenied);
        }
        Ok(resolved)
    }
}

impl FileStore for DirectoryStore {
    fn open(&self, filename: &str) -> Result<(FileReader, u64), StoreError> {
        let path = self.contain(&self.join(filename)?)?;

        let file = std::fs::File::open(&path)?;
        let metadata = file.metadata()?;
        if !metadata.is_file() {
            return Err(StoreError::NotFound);
        }

        let reader: FileReader = Box::new(tokio::fs::File::from_std(file));
        Ok((reader, metadata.len()))
    }

    fn create(&self, filename: &str) -> Result<FileWriter, StoreError> {
        let path = self.join(filename)?;
        let parent = path.parent().ok_or(StoreError::AccessDenied)?;
        let parent = self.contain(parent)?;
        let name = path.file_name().ok_or(StoreError::AccessDenied)?;

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(parent.join(name))?;

        Ok(Box::new(tokio::fs::File::from_std(file)))
    }
}
