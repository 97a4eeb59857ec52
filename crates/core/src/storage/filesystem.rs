//! Local disk backend.

use std::io::ErrorKind;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::{debug, instrument};

use super::backend::BackendStrategy;
use super::config::BackendKind;
use super::error::StorageError;
use crate::attachment::Attachment;

/// Stores each style as a file at its interpolated path.
#[derive(Debug, Clone, Default)]
pub struct FilesystemBackend;

impl FilesystemBackend {
    /// URL pattern for files served from `public/`.
    pub const DEFAULT_URL: &'static str = "/system/:class/:attachment/:id_partition/:style/:filename";

    /// Create a filesystem backend.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BackendStrategy for FilesystemBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Filesystem
    }

    fn default_url_pattern(&self) -> &str {
        Self::DEFAULT_URL
    }

    #[instrument(skip(self, _attachment, body), fields(storage = "filesystem"))]
    async fn write(
        &self,
        _attachment: &Attachment,
        style: &str,
        key: &str,
        body: Bytes,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        let path = Path::new(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::write(key, e.to_string()))?;
        }
        fs::write(path, &body)
            .await
            .map_err(|e| StorageError::write(key, e.to_string()))?;

        debug!(size = body.len(), "file written");
        Ok(())
    }

    #[instrument(skip(self, _attachment), fields(storage = "filesystem"))]
    async fn delete(&self, _attachment: &Attachment, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(key).await {
            Ok(()) => {
                debug!("file deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::delete(key, e.to_string())),
        }
    }

    async fn exists(&self, _attachment: &Attachment, key: &str) -> Result<bool, StorageError> {
        fs::try_exists(key)
            .await
            .map_err(|e| StorageError::io(key, e))
    }
}
