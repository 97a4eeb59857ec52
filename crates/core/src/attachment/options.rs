//! Attachment configuration.
//!
//! Options are merged once, when an attachment is declared: deployment
//! defaults from [`StorageSettings`] first, then per-attachment builder calls.
//! The result is frozen behind an `Arc` and handed to the vault.

use std::fmt;
use std::sync::Arc;

use clipvault_shared::config::StorageSettings;

use super::types::{Attachment, ORIGINAL_STYLE};
use crate::storage::{CloudOptions, S3Options};

/// A configuration value that is either fixed or computed from the attachment.
///
/// Computed values are evaluated at the point of use, never when the
/// configuration is loaded.
pub enum Deferred<T> {
    /// Fixed value.
    Literal(T),
    /// Value computed from the attachment on every use.
    Computed(Arc<dyn Fn(&Attachment) -> T + Send + Sync>),
}

impl<T> Deferred<T> {
    /// Wrap a closure evaluated against the attachment.
    pub fn computed(f: impl Fn(&Attachment) -> T + Send + Sync + 'static) -> Self {
        Self::Computed(Arc::new(f))
    }
}

impl<T: Clone> Deferred<T> {
    /// Evaluate against an attachment.
    #[must_use]
    pub fn resolve(&self, attachment: &Attachment) -> T {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Computed(f) => f(attachment),
        }
    }
}

impl<T: Clone> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Literal(value) => Self::Literal(value.clone()),
            Self::Computed(f) => Self::Computed(Arc::clone(f)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Computed(_) => f.write_str("Computed(<fn>)"),
        }
    }
}

impl<T: Default> Default for Deferred<T> {
    fn default() -> Self {
        Self::Literal(T::default())
    }
}

impl From<&str> for Deferred<String> {
    fn from(value: &str) -> Self {
        Self::Literal(value.to_owned())
    }
}

impl From<String> for Deferred<String> {
    fn from(value: String) -> Self {
        Self::Literal(value)
    }
}

/// Where the URL of an attachment without a file comes from.
#[derive(Debug, Clone)]
pub enum DefaultUrl {
    /// Pattern, possibly computed from the attachment.
    Pattern(Deferred<String>),
    /// Name of a host record attribute holding the pattern.
    Attribute(String),
}

impl DefaultUrl {
    /// Resolve to the pattern to interpolate.
    ///
    /// A missing record attribute resolves to an empty pattern.
    #[must_use]
    pub fn resolve(&self, attachment: &Attachment) -> String {
        match self {
            Self::Pattern(pattern) => pattern.resolve(attachment),
            Self::Attribute(name) => attachment
                .record
                .attribute(name)
                .unwrap_or_default()
                .to_owned(),
        }
    }
}

impl From<&str> for DefaultUrl {
    fn from(value: &str) -> Self {
        Self::Pattern(value.into())
    }
}

impl From<String> for DefaultUrl {
    fn from(value: String) -> Self {
        Self::Pattern(value.into())
    }
}

impl From<Deferred<String>> for DefaultUrl {
    fn from(value: Deferred<String>) -> Self {
        Self::Pattern(value)
    }
}

/// Immutable configuration snapshot for one attachment.
#[derive(Debug, Clone)]
pub struct AttachmentOptions {
    /// Backend name (`filesystem`, `s3`, `cloud`).
    pub storage: String,
    /// Storage path pattern.
    pub path: Deferred<String>,
    /// URL pattern; `None` uses the backend's default.
    pub url: Option<Deferred<String>>,
    /// Pattern used when no file is assigned.
    pub default_url: DefaultUrl,
    /// Style used when none is given.
    pub default_style: String,
    /// Append `updated_at` to URLs by default.
    pub use_timestamp: bool,
    /// Never delete replaced files.
    pub keep_old_files: bool,
    /// Value of `:root`.
    pub root: String,
    /// Deployment stage, for `:stage` and credential selection.
    pub stage: String,
    /// Secret for `:hash`; the token stays literal without one.
    pub hash_secret: Option<String>,
    /// Pattern hashed by `:hash`.
    pub hash_data: String,
    /// Object storage options.
    pub s3: S3Options,
    /// Cloud storage options.
    pub cloud: CloudOptions,
}

impl AttachmentOptions {
    /// Default storage path pattern.
    pub const DEFAULT_PATH: &'static str =
        ":root/public/system/:class/:attachment/:id_partition/:style/:filename";
    /// Default URL for attachments without a file.
    pub const DEFAULT_MISSING_URL: &'static str = "/:attachment/:style/missing.png";
    /// Default `:hash` input.
    pub const DEFAULT_HASH_DATA: &'static str = ":class/:attachment/:id/:style/:updated_at";

    /// Build options from deployment settings.
    #[must_use]
    pub fn from_settings(settings: &StorageSettings, stage: impl Into<String>) -> Self {
        let mut options = Self::default()
            .with_storage(settings.backend.clone())
            .with_use_timestamp(settings.use_timestamp)
            .with_keep_old_files(settings.keep_old_files)
            .with_root(settings.root.clone())
            .with_stage(stage)
            .with_default_style(settings.default_style.clone());

        if let Some(path) = &settings.path {
            options = options.with_path(path.as_str());
        }
        if let Some(url) = &settings.url {
            options = options.with_url(url.as_str());
        }
        if let Some(default_url) = &settings.default_url {
            options = options.with_default_url(default_url.as_str());
        }
        if let Some(secret) = &settings.hash_secret {
            options = options.with_hash_secret(secret.clone());
        }
        if let Some(hash_data) = &settings.hash_data {
            options.hash_data.clone_from(hash_data);
        }
        if let Some(s3) = &settings.s3 {
            options.s3 = S3Options::from_settings(s3);
        }
        if let Some(cloud) = &settings.cloud {
            options.cloud = CloudOptions::from_settings(cloud);
        }
        options
    }

    /// Set the backend name.
    #[must_use]
    pub fn with_storage(mut self, storage: impl Into<String>) -> Self {
        self.storage = storage.into();
        self
    }

    /// Set the path pattern.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<Deferred<String>>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the URL pattern.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<Deferred<String>>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the default URL.
    #[must_use]
    pub fn with_default_url(mut self, default_url: impl Into<DefaultUrl>) -> Self {
        self.default_url = default_url.into();
        self
    }

    /// Set the default style.
    #[must_use]
    pub fn with_default_style(mut self, style: impl Into<String>) -> Self {
        self.default_style = style.into();
        self
    }

    /// Enable or disable timestamps on URLs by default.
    #[must_use]
    pub fn with_use_timestamp(mut self, use_timestamp: bool) -> Self {
        self.use_timestamp = use_timestamp;
        self
    }

    /// Keep replaced files instead of deleting them.
    #[must_use]
    pub fn with_keep_old_files(mut self, keep_old_files: bool) -> Self {
        self.keep_old_files = keep_old_files;
        self
    }

    /// Set the value of `:root`.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    /// Set the deployment stage.
    #[must_use]
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = stage.into();
        self
    }

    /// Set the `:hash` secret.
    #[must_use]
    pub fn with_hash_secret(mut self, secret: impl Into<String>) -> Self {
        self.hash_secret = Some(secret.into());
        self
    }

    /// Set object storage options.
    #[must_use]
    pub fn with_s3(mut self, s3: S3Options) -> Self {
        self.s3 = s3;
        self
    }

    /// Set cloud storage options.
    #[must_use]
    pub fn with_cloud(mut self, cloud: CloudOptions) -> Self {
        self.cloud = cloud;
        self
    }
}

impl Default for AttachmentOptions {
    fn default() -> Self {
        Self {
            storage: "filesystem".to_owned(),
            path: Self::DEFAULT_PATH.into(),
            url: None,
            default_url: Self::DEFAULT_MISSING_URL.into(),
            default_style: ORIGINAL_STYLE.to_owned(),
            use_timestamp: true,
            keep_old_files: false,
            root: ".".to_owned(),
            stage: "development".to_owned(),
            hash_secret: None,
            hash_data: Self::DEFAULT_HASH_DATA.to_owned(),
            s3: S3Options::default(),
            cloud: CloudOptions::default(),
        }
    }
}
