//! On-disk storage collaborator: an opaque filename → bytes store rooted at
//! a single directory. The protocol core only calls [`FileStore::write`]
//! after every verification step has passed, and [`FileStore::read`] before
//! encrypting a download response. Concurrent writes to the same filename
//! are a caller-level race; the store does no locking of its own.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Longest accepted stored file name
const MAX_FILENAME_LENGTH: usize = 255;

/// Fallback name for inputs that sanitize away to nothing
const FALLBACK_NAME: &str = "unnamed_file";

/// Reduce an untrusted file name to a safe single path component.
///
/// Takes the last component of any `/`- or `\`-separated path, strips
/// control characters, and refuses `.`/`..`/empty results, so a hostile
/// metadata filename can never escape the storage root.
pub fn sanitize_file_name(file_name: &str) -> String {
    let last = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(FALLBACK_NAME);

    let mut clean: String = last.chars().filter(|c| !c.is_control()).collect();

    if clean.is_empty() || clean == "." || clean == ".." {
        return FALLBACK_NAME.to_string();
    }

    if clean.len() > MAX_FILENAME_LENGTH {
        let mut cutoff = MAX_FILENAME_LENGTH;
        while !clean.is_char_boundary(cutoff) {
            cutoff -= 1;
        }
        clean.truncate(cutoff);
    }

    clean
}

/// Filename → bytes store over one root directory
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory if it does not exist yet
    pub async fn ensure_root(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    fn path_for(&self, filename: &str) -> PathBuf {
        self.root.join(sanitize_file_name(filename))
    }

    /// Persist `bytes` under the sanitized `filename`
    pub async fn write(&self, filename: &str, bytes: &[u8]) -> Result<()> {
        self.ensure_root().await?;
        tokio::fs::write(self.path_for(filename), bytes).await?;
        Ok(())
    }

    /// Read the bytes stored under `filename`; a missing file is reported
    /// as [`Error::NotFound`], distinct from other I/O failures
    pub async fn read(&self, filename: &str) -> Result<Vec<u8>> {
        match tokio::fs::read(self.path_for(filename)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(filename.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Whether `filename` currently exists in the store
    pub async fn contains(&self, filename: &str) -> bool {
        tokio::fs::try_exists(self.path_for(filename))
            .await
            .unwrap_or(false)
    }
}
