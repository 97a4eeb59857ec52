//! Storage vault: queues writes and deletes for one attachment and commits
//! them against the configured backend.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use super::upload::QueuedFile;
use crate::attachment::{Attachment, AttachmentOptions, ORIGINAL_STYLE};
use crate::interpolation::Interpolator;
use crate::storage::{BackendStrategy, StorageError, build_backend};
use crate::url::{UrlGenerator, UrlOptions};

/// Write and delete queues for one attachment.
///
/// Mutating calls take `&mut self`, so at most one commit is in flight per
/// vault. Share a vault between tasks behind a `tokio::sync::Mutex`.
#[derive(Debug)]
pub struct Vault {
    attachment: Attachment,
    options: Arc<AttachmentOptions>,
    backend: Box<dyn BackendStrategy>,
    interpolator: Interpolator,
    urls: UrlGenerator,
    queued_for_write: Vec<(String, QueuedFile)>,
    queued_for_delete: VecDeque<String>,
}

impl Vault {
    /// Build a vault with the backend named in `options`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStorageBackend` for an unrecognized backend name, or
    /// the backend's configuration error.
    pub fn new(
        attachment: Attachment,
        options: impl Into<Arc<AttachmentOptions>>,
    ) -> Result<Self, StorageError> {
        let options = options.into();
        let backend = build_backend(&options)?;
        Ok(Self::with_backend(attachment, options, backend))
    }

    /// Build a vault around an existing backend.
    #[must_use]
    pub fn with_backend(
        attachment: Attachment,
        options: impl Into<Arc<AttachmentOptions>>,
        backend: Box<dyn BackendStrategy>,
    ) -> Self {
        let options = options.into();
        let urls = UrlGenerator::new(Arc::clone(&options), backend.default_url_pattern());
        Self {
            attachment,
            interpolator: Interpolator::new(&options),
            options,
            backend,
            urls,
            queued_for_write: Vec::new(),
            queued_for_delete: VecDeque::new(),
        }
    }

    /// The attachment.
    #[must_use]
    pub fn attachment(&self) -> &Attachment {
        &self.attachment
    }

    /// The attachment, for host-side updates.
    pub fn attachment_mut(&mut self) -> &mut Attachment {
        &mut self.attachment
    }

    /// The configuration snapshot.
    #[must_use]
    pub fn options(&self) -> &AttachmentOptions {
        &self.options
    }

    /// The backend.
    #[must_use]
    pub fn backend(&self) -> &dyn BackendStrategy {
        self.backend.as_ref()
    }

    /// Pending writes, in the order they were queued.
    #[must_use]
    pub fn queued_for_write(&self) -> &[(String, QueuedFile)] {
        &self.queued_for_write
    }

    /// Pending deletes, oldest first.
    #[must_use]
    pub fn queued_for_delete(&self) -> &VecDeque<String> {
        &self.queued_for_delete
    }

    fn style_or_default<'a>(&'a self, style: Option<&'a str>) -> &'a str {
        style.unwrap_or(&self.options.default_style)
    }

    /// Storage key for `style`, whether or not a file is assigned.
    #[must_use]
    pub fn key_for_style(&self, style: &str) -> String {
        key_for(&self.attachment, &self.options, &self.interpolator, self.backend.as_ref(), style)
    }

    /// Storage path for `style`, or `None` when no file is assigned.
    #[must_use]
    pub fn path(&self, style: Option<&str>) -> Option<String> {
        self.attachment
            .is_present()
            .then(|| self.key_for_style(self.style_or_default(style)))
    }

    /// Public URL for `style`.
    #[must_use]
    pub fn url(&self, style: Option<&str>, options: UrlOptions) -> String {
        let style = self.style_or_default(style);
        let tokens = |token: &str, attachment: &Attachment, style: &str| -> Option<String> {
            let key = key_for(attachment, &self.options, &self.interpolator, self.backend.as_ref(), style);
            self.backend.url_token(token, attachment, style, &key)
        };
        self.urls.url_for_with(&self.attachment, style, options, &tokens)
    }

    /// Signed URL valid for `expires_in`.
    ///
    /// Falls back to [`url`](Self::url) when no file is assigned or the
    /// backend cannot sign.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails for a reason other than lack of
    /// support.
    #[instrument(skip(self), fields(attachment = %self.attachment.name))]
    pub async fn expiring_url(
        &self,
        expires_in: Duration,
        style: Option<&str>,
    ) -> Result<String, StorageError> {
        let Some(key) = self.path(style) else {
            return Ok(self.url(style, UrlOptions::default()));
        };
        match self
            .backend
            .expiring_url(&self.attachment, &key, expires_in)
            .await
        {
            Err(StorageError::PresignNotSupported) => {
                debug!("backend cannot sign, using public url");
                Ok(self.url(style, UrlOptions::default()))
            }
            other => other,
        }
    }

    /// Whether the file for `style` exists in storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be queried.
    pub async fn exists(&self, style: Option<&str>) -> Result<bool, StorageError> {
        match self.path(style) {
            Some(key) => self.backend.exists(&self.attachment, &key).await,
            None => Ok(false),
        }
    }

    /// Queue `file` for `style`, replacing any file already queued for it.
    pub fn store(&mut self, style: impl Into<String>, file: QueuedFile) {
        let style = style.into();
        debug!(style = %style, filename = file.filename(), "queued for write");
        match self.queued_for_write.iter_mut().find(|(queued, _)| *queued == style) {
            Some((_, slot)) => *slot = file,
            None => self.queued_for_write.push((style, file)),
        }
    }

    /// Queue the stored files of the original and `styles` for deletion and
    /// drop pending writes.
    ///
    /// Only files that currently exist are queued.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be queried.
    pub async fn clear(&mut self, styles: &[&str]) -> Result<(), StorageError> {
        let mut seen = BTreeSet::new();
        for style in std::iter::once(ORIGINAL_STYLE).chain(styles.iter().copied()) {
            if !seen.insert(style) {
                continue;
            }
            if !self.exists(Some(style)).await? {
                continue;
            }
            let key = self.key_for_style(style);
            debug!(style, key = %key, "queued for delete");
            self.queued_for_delete.push_back(key);
        }
        self.queued_for_write.clear();
        Ok(())
    }

    /// [`clear`](Self::clear) every declared style.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be queried.
    pub async fn clear_all(&mut self) -> Result<(), StorageError> {
        let styles: Vec<String> = self.attachment.style_names().map(str::to_string).collect();
        let styles: Vec<&str> = styles.iter().map(String::as_str).collect();
        self.clear(&styles).await
    }

    /// Replace the current file: queue the old files for deletion, record
    /// the new file on the attachment and queue it as the original.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be queried or a file on disk
    /// cannot be inspected.
    pub async fn assign(&mut self, file: QueuedFile) -> Result<(), StorageError> {
        let size = file.size().await?;
        self.clear_all().await?;
        self.attachment
            .assign(file.filename(), file.content_type(), size, Utc::now());
        self.store(ORIGINAL_STYLE, file);
        Ok(())
    }

    /// Flush deletes, then writes.
    ///
    /// Deletes are skipped with `keep_old_files`. A delete never removes a
    /// key that is about to be written. Each entry leaves its queue once it
    /// succeeds, so after a failure the remaining entries stay queued for a
    /// retry. A write that failed after the bucket-creation retry is dropped.
    ///
    /// # Errors
    ///
    /// Returns the first backend failure.
    #[instrument(skip(self), fields(attachment = %self.attachment.name, storage = self.backend.kind().name()))]
    pub async fn save(&mut self) -> Result<(), StorageError> {
        if self.options.keep_old_files {
            if !self.queued_for_delete.is_empty() {
                debug!(count = self.queued_for_delete.len(), "keeping old files");
            }
            self.queued_for_delete.clear();
        } else {
            self.flush_deletes().await?;
        }
        self.flush_writes().await
    }

    /// [`clear`](Self::clear) then [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// Returns the first backend failure.
    #[instrument(skip(self), fields(attachment = %self.attachment.name))]
    pub async fn destroy(&mut self, styles: &[&str]) -> Result<(), StorageError> {
        self.clear(styles).await?;
        self.save().await
    }

    /// [`destroy`](Self::destroy) every declared style.
    ///
    /// # Errors
    ///
    /// Returns the first backend failure.
    pub async fn destroy_all(&mut self) -> Result<(), StorageError> {
        self.clear_all().await?;
        self.save().await
    }

    async fn flush_deletes(&mut self) -> Result<(), StorageError> {
        let pending: BTreeSet<String> = self
            .queued_for_write
            .iter()
            .map(|(style, _)| self.key_for_style(style))
            .collect();

        while let Some(key) = self.queued_for_delete.front() {
            if pending.contains(key) {
                warn!(key = %key, "not deleting a key that is about to be written");
            } else {
                self.backend.delete(&self.attachment, key).await?;
                info!(key = %key, "deleted");
            }
            self.queued_for_delete.pop_front();
        }
        Ok(())
    }

    async fn flush_writes(&mut self) -> Result<(), StorageError> {
        while let Some((style, file)) = self.queued_for_write.first() {
            let key = self.key_for_style(style);
            let result = match file.read().await {
                Ok(body) => {
                    self.backend
                        .write(&self.attachment, style, &key, body, file.content_type())
                        .await
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {
                    info!(style = %style, key = %key, "written");
                    self.queued_for_write.remove(0);
                }
                Err(e) => {
                    if e.consumes_entry() {
                        warn!(style = %style, key = %key, "dropping write that failed after retry");
                        self.queued_for_write.remove(0);
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

fn key_for(
    attachment: &Attachment,
    options: &AttachmentOptions,
    interpolator: &Interpolator,
    backend: &dyn BackendStrategy,
    style: &str,
) -> String {
    let pattern = options.path.resolve(attachment);
    backend.key_for(&interpolator.interpolate(&pattern, attachment, style))
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::attachment::{RecordRef, StyleDescriptor};
    use crate::storage::s3::mock::MemoryObjectClient;
    use crate::storage::{CloudOptions, FilesystemBackend, S3Backend, S3Options};

    const PATH: &str = ":attachment/:style/:basename.:extension";

    fn attachment() -> Attachment {
        Attachment::new("avatar", RecordRef::new("Dummy").with_id(1))
            .with_style("thumb", StyleDescriptor::new("80x80#"))
            .with_style("medium", StyleDescriptor::new("300x300>"))
            .with_file("5k.png")
    }

    fn options() -> AttachmentOptions {
        AttachmentOptions::default()
            .with_storage("s3")
            .with_path(PATH)
            .with_s3(S3Options::default().with_bucket("bucket"))
    }

    fn s3_vault(options: AttachmentOptions, client: &Arc<MemoryObjectClient>) -> Vault {
        let backend = S3Backend::with_client(&options.s3, &options.stage, client.clone())
            .expect("backend");
        Vault::with_backend(attachment(), options, Box::new(backend))
    }

    fn png() -> QueuedFile {
        QueuedFile::from_bytes("5k.png", Bytes::from_static(b"\x89PNG"))
    }

    #[test]
    fn test_keys_follow_path_pattern() {
        let client = Arc::new(MemoryObjectClient::with_bucket("bucket"));
        let vault = s3_vault(options(), &client);

        assert_eq!(vault.key_for_style("original"), "avatars/original/5k.png");
        assert_eq!(vault.key_for_style("thumb"), "avatars/thumb/5k.png");
        assert_eq!(vault.path(None).as_deref(), Some("avatars/original/5k.png"));
    }

    #[test]
    fn test_unknown_backend_fails_construction() {
        let err = Vault::new(attachment(), AttachmentOptions::default().with_storage("ftp"))
            .unwrap_err();
        assert!(matches!(err, StorageError::UnknownStorageBackend { .. }));
    }

    #[test]
    fn test_path_none_and_default_url_without_file() {
        let client = Arc::new(MemoryObjectClient::with_bucket("bucket"));
        let mut vault = s3_vault(options(), &client);
        vault.attachment_mut().unassign();

        assert_eq!(vault.path(Some("thumb")), None);
        assert_eq!(vault.url(Some("thumb"), UrlOptions::default()), "/avatars/thumb/missing.png");
    }

    #[test]
    fn test_url_uses_backend_default_pattern() {
        let client = Arc::new(MemoryObjectClient::with_bucket("bucket"));
        let vault = s3_vault(options(), &client);

        assert_eq!(
            vault.url(Some("thumb"), UrlOptions::default()),
            "https://bucket.s3.amazonaws.com/avatars/thumb/5k.png"
        );
    }

    #[test]
    fn test_url_with_backend_token_in_custom_pattern() {
        let client = Arc::new(MemoryObjectClient::with_bucket("bucket"));
        let vault = s3_vault(options().with_url(":s3_path_url"), &client);

        assert_eq!(
            vault.url(None, UrlOptions::default()),
            "https://s3.amazonaws.com/bucket/avatars/original/5k.png"
        );
    }

    #[tokio::test]
    async fn test_store_then_save_writes_each_style_once() {
        let client = Arc::new(MemoryObjectClient::with_bucket("bucket"));
        let mut vault = s3_vault(options(), &client);

        vault.store("original", png());
        vault.store("thumb", png());
        vault.store("thumb", QueuedFile::from_bytes("5k.png", Bytes::from_static(b"thumb")));
        assert_eq!(vault.queued_for_write().len(), 2);

        vault.save().await.expect("save");

        assert!(vault.queued_for_write().is_empty());
        assert!(vault.queued_for_delete().is_empty());
        assert_eq!(
            client.calls(),
            vec!["put avatars/original/5k.png", "put avatars/thumb/5k.png"]
        );
        let thumb = client.object("bucket", "avatars/thumb/5k.png").expect("thumb");
        assert_eq!(thumb.body, Bytes::from_static(b"thumb"));
        assert_eq!(thumb.content_type, "image/png");
    }

    #[tokio::test]
    async fn test_clear_queues_only_existing_files() {
        let client = Arc::new(MemoryObjectClient::with_bucket("bucket"));
        client.insert("bucket", "avatars/original/5k.png");
        client.insert("bucket", "avatars/thumb/5k.png");
        let mut vault = s3_vault(options(), &client);
        vault.store("original", png());

        vault.clear(&["thumb", "medium", "thumb"]).await.expect("clear");

        assert!(vault.queued_for_write().is_empty());
        assert_eq!(
            vault.queued_for_delete().iter().collect::<Vec<_>>(),
            vec!["avatars/original/5k.png", "avatars/thumb/5k.png"]
        );

        vault.save().await.expect("save");
        assert!(client.keys().is_empty());
        assert!(vault.queued_for_delete().is_empty());
    }

    #[tokio::test]
    async fn test_destroy_removes_all_styles() {
        let client = Arc::new(MemoryObjectClient::with_bucket("bucket"));
        for style in ["original", "thumb", "medium"] {
            client.insert("bucket", &format!("avatars/{style}/5k.png"));
        }
        let mut vault = s3_vault(options(), &client);

        vault.destroy_all().await.expect("destroy");

        assert!(client.keys().is_empty());
    }

    #[tokio::test]
    async fn test_delete_never_removes_pending_write_key() {
        let client = Arc::new(MemoryObjectClient::with_bucket("bucket"));
        client.insert("bucket", "avatars/original/5k.png");
        let mut vault = s3_vault(options(), &client);

        vault.assign(png()).await.expect("assign");
        assert_eq!(vault.queued_for_delete().len(), 1);

        vault.save().await.expect("save");

        assert!(!client.calls().iter().any(|c| c.starts_with("delete")));
        let stored = client.object("bucket", "avatars/original/5k.png").expect("stored");
        assert_eq!(stored.body, Bytes::from_static(b"\x89PNG"));
    }

    #[tokio::test]
    async fn test_replacing_file_deletes_old_keys() {
        let client = Arc::new(MemoryObjectClient::with_bucket("bucket"));
        client.insert("bucket", "avatars/original/5k.png");
        client.insert("bucket", "avatars/thumb/5k.png");
        let mut vault = s3_vault(options(), &client);

        vault
            .assign(QueuedFile::from_bytes("new.jpg", Bytes::from_static(b"jpg")))
            .await
            .expect("assign");
        vault.save().await.expect("save");

        assert_eq!(client.keys(), vec!["avatars/original/new.jpg"]);
        assert_eq!(vault.attachment().original_filename.as_deref(), Some("new.jpg"));
        assert_eq!(vault.attachment().content_type.as_deref(), Some("image/jpeg"));
    }

    #[tokio::test]
    async fn test_keep_old_files_skips_deletes() {
        let client = Arc::new(MemoryObjectClient::with_bucket("bucket"));
        client.insert("bucket", "avatars/original/5k.png");
        let mut vault = s3_vault(options().with_keep_old_files(true), &client);

        vault.destroy(&[]).await.expect("destroy");

        assert_eq!(client.keys(), vec!["avatars/original/5k.png"]);
        assert!(vault.queued_for_delete().is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_keeps_remaining_entries() {
        let client = Arc::new(MemoryObjectClient::with_bucket("bucket"));
        client.fail_put("avatars/thumb/5k.png");
        let mut vault = s3_vault(options(), &client);
        vault.store("original", png());
        vault.store("thumb", png());

        let err = vault.save().await.unwrap_err();

        assert!(matches!(err, StorageError::BackendWrite { retried: false, .. }));
        let pending: Vec<&str> = vault.queued_for_write().iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(pending, vec!["thumb"]);
        assert!(client.object("bucket", "avatars/original/5k.png").is_some());
    }

    #[tokio::test]
    async fn test_write_failure_after_bucket_retry_is_consumed() {
        let client = Arc::new(MemoryObjectClient::default());
        client.fail_create_bucket();
        let mut vault = s3_vault(options(), &client);
        vault.store("original", png());
        vault.store("thumb", png());

        let err = vault.save().await.unwrap_err();

        assert!(err.consumes_entry());
        let pending: Vec<&str> = vault.queued_for_write().iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(pending, vec!["thumb"]);
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_queue_and_skips_writes() {
        let client = Arc::new(MemoryObjectClient::with_bucket("bucket"));
        client.insert("bucket", "avatars/original/5k.png");
        client.fail_delete("avatars/original/5k.png");
        let mut vault = s3_vault(options(), &client);

        vault.clear(&[]).await.expect("clear");
        vault.store("thumb", png());
        let err = vault.save().await.unwrap_err();

        assert!(matches!(err, StorageError::BackendDelete { .. }));
        assert_eq!(vault.queued_for_delete().len(), 1);
        assert_eq!(vault.queued_for_write().len(), 1);
        assert!(client.object("bucket", "avatars/thumb/5k.png").is_none());
    }

    #[tokio::test]
    async fn test_exists_and_expiring_url() {
        let client = Arc::new(MemoryObjectClient::with_bucket("bucket"));
        client.insert("bucket", "avatars/original/5k.png");
        let vault = s3_vault(options(), &client);

        assert!(vault.exists(None).await.expect("exists"));
        assert!(!vault.exists(Some("thumb")).await.expect("exists"));

        let url = vault
            .expiring_url(Duration::from_secs(3600), None)
            .await
            .expect("signed");
        assert!(url.starts_with("https://bucket.s3.amazonaws.com/avatars/original/5k.png"));
    }

    #[tokio::test]
    async fn test_filesystem_lifecycle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().to_str().expect("utf-8 path").to_string();
        let options = AttachmentOptions::default().with_root(root.clone()).with_use_timestamp(false);
        let mut vault = Vault::new(attachment(), options).expect("vault");
        assert_eq!(vault.backend().kind(), crate::storage::BackendKind::Filesystem);

        vault.store("original", png());
        vault.store("thumb", png());
        vault.save().await.expect("save");

        let original = format!("{root}/public/system/dummies/avatars/000/000/001/original/5k.png");
        assert_eq!(vault.path(None).as_deref(), Some(original.as_str()));
        assert!(std::path::Path::new(&original).exists());
        assert!(vault.exists(Some("thumb")).await.expect("exists"));
        assert_eq!(
            vault.url(Some("thumb"), UrlOptions::default()),
            "/system/dummies/avatars/000/000/001/thumb/5k.png"
        );

        let url = vault
            .expiring_url(Duration::from_secs(60), None)
            .await
            .expect("fallback url");
        assert_eq!(url, "/system/dummies/avatars/000/000/001/original/5k.png");

        vault.destroy_all().await.expect("destroy");
        assert!(!std::path::Path::new(&original).exists());
        assert!(!vault.exists(Some("thumb")).await.expect("exists"));
    }

    #[tokio::test]
    async fn test_with_backend_accepts_any_strategy() {
        let vault = Vault::with_backend(attachment(), options(), Box::new(FilesystemBackend::new()));
        assert_eq!(vault.key_for_style("thumb"), "avatars/thumb/5k.png");
        assert!(!vault.exists(Some("medium")).await.expect("exists"));
    }

    #[tokio::test]
    async fn test_expiring_url_falls_back_when_cloud_provider_cannot_sign() {
        let options = AttachmentOptions::default()
            .with_storage("cloud")
            .with_path(PATH)
            .with_use_timestamp(false)
            .with_cloud(CloudOptions::default().with_provider("memory").with_directory("pics"));
        let mut vault = Vault::new(attachment(), options).expect("vault");
        vault.store("original", png());
        vault.save().await.expect("save");

        let url = vault
            .expiring_url(Duration::from_secs(60), None)
            .await
            .expect("fallback url");
        assert_eq!(url, "/avatars/original/5k.png");
    }

    #[tokio::test]
    async fn test_expiring_url_does_not_hide_signing_errors() {
        let client = Arc::new(MemoryObjectClient::with_bucket("bucket"));
        client.sign_from("http://minio.local:9000");
        let vault = s3_vault(options(), &client);

        let err = vault
            .expiring_url(Duration::from_secs(60), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Configuration(_)));
    }
}
