//! Files waiting to be written.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::io::AsyncReadExt;

use crate::storage::StorageError;

/// Where queued content lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    /// Already in memory.
    Memory(Bytes),
    /// On disk; opened only while it is being written.
    Disk(PathBuf),
}

/// A file queued for one style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedFile {
    source: FileSource,
    filename: String,
    content_type: String,
}

impl QueuedFile {
    /// In-memory content. The content type is guessed from `filename`.
    #[must_use]
    pub fn from_bytes(filename: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let filename = filename.into();
        Self {
            content_type: guess_content_type(&filename),
            source: FileSource::Memory(bytes.into()),
            filename,
        }
    }

    /// Content on disk. The content type is guessed from the file name.
    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            content_type: guess_content_type(&filename),
            source: FileSource::Disk(path),
            filename,
        }
    }

    /// Override the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Original file name.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// MIME type sent with the write.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Content source.
    #[must_use]
    pub fn source(&self) -> &FileSource {
        &self.source
    }

    /// Size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if a file on disk cannot be inspected.
    pub async fn size(&self) -> Result<u64, StorageError> {
        match &self.source {
            FileSource::Memory(bytes) => Ok(bytes.len() as u64),
            FileSource::Disk(path) => tokio::fs::metadata(path)
                .await
                .map(|meta| meta.len())
                .map_err(|e| StorageError::io(display(path), e)),
        }
    }

    /// Read the content. A file on disk is opened and closed within the call.
    pub(crate) async fn read(&self) -> Result<Bytes, StorageError> {
        match &self.source {
            FileSource::Memory(bytes) => Ok(bytes.clone()),
            FileSource::Disk(path) => {
                let mut file = tokio::fs::File::open(path)
                    .await
                    .map_err(|e| StorageError::io(display(path), e))?;
                let mut buffer = Vec::new();
                file.read_to_end(&mut buffer)
                    .await
                    .map_err(|e| StorageError::io(display(path), e))?;
                Ok(Bytes::from(buffer))
            }
        }
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Guess content type from filename.
fn guess_content_type(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_or_octet_stream()
        .to_string()
}
