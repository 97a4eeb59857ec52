//! Backend strategy interface.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::cloud::CloudBackend;
use super::config::BackendKind;
use super::error::StorageError;
use super::filesystem::FilesystemBackend;
use super::s3::S3Backend;
use crate::attachment::{Attachment, AttachmentOptions};

/// One storage medium.
///
/// Keys handed to a backend are already interpolated and normalized through
/// [`key_for`](Self::key_for).
#[async_trait]
pub trait BackendStrategy: Send + Sync + fmt::Debug {
    /// Which kind of backend this is.
    fn kind(&self) -> BackendKind;

    /// Turn an interpolated path into the key this backend stores under.
    fn key_for(&self, path: &str) -> String {
        path.to_string()
    }

    /// URL pattern used when the attachment sets none.
    fn default_url_pattern(&self) -> &str;

    /// Backend-specific URL token for `key`, such as `:s3_domain_url`.
    fn url_token(
        &self,
        _token: &str,
        _attachment: &Attachment,
        _style: &str,
        _key: &str,
    ) -> Option<String> {
        None
    }

    /// Create or replace the object at `key`.
    async fn write(
        &self,
        attachment: &Attachment,
        style: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// Remove the object at `key`. An absent object is not an error.
    async fn delete(&self, attachment: &Attachment, key: &str) -> Result<(), StorageError>;

    /// Whether an object exists at `key`.
    async fn exists(&self, attachment: &Attachment, key: &str) -> Result<bool, StorageError>;

    /// Time-limited signed URL for `key`, always over TLS.
    async fn expiring_url(
        &self,
        _attachment: &Attachment,
        _key: &str,
        _expires_in: Duration,
    ) -> Result<String, StorageError> {
        Err(StorageError::PresignNotSupported)
    }
}

/// Pass `url` through only if it is served over TLS.
///
/// # Errors
///
/// Returns `Configuration` for any scheme other than `https`.
pub fn require_tls(url: String) -> Result<String, StorageError> {
    if url.get(..8).is_some_and(|scheme| scheme.eq_ignore_ascii_case("https://")) {
        Ok(url)
    } else {
        Err(StorageError::configuration(format!(
            "signed URLs must use https, got {}",
            url.split('?').next().unwrap_or_default()
        )))
    }
}

/// Build the backend named by `options.storage`.
///
/// # Errors
///
/// Returns `UnknownStorageBackend` for unrecognized names, or the backend's
/// own configuration error.
pub fn build_backend(options: &AttachmentOptions) -> Result<Box<dyn BackendStrategy>, StorageError> {
    let backend: Box<dyn BackendStrategy> = match BackendKind::parse(&options.storage)? {
        BackendKind::Filesystem => Box::new(FilesystemBackend::new()),
        BackendKind::S3 => Box::new(S3Backend::from_options(&options.s3, &options.stage)?),
        BackendKind::Cloud => Box::new(CloudBackend::from_options(&options.cloud, &options.stage)?),
    };
    Ok(backend)
}
