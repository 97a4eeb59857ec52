//! Storage configuration types.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use clipvault_shared::config::{CloudSettings, HttpProxySettings, S3Settings};
use tracing::warn;

use super::error::StorageError;
use crate::attachment::{Attachment, Deferred};
use crate::credentials::{CredentialMap, Credentials, CredentialsSource};

/// Storage backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Local disk.
    Filesystem,
    /// S3-compatible object storage.
    S3,
    /// Provider-agnostic cloud storage.
    Cloud,
}

impl BackendKind {
    /// Parse a configured backend name.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStorageBackend` for unrecognized names.
    pub fn parse(name: &str) -> Result<Self, StorageError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "filesystem" | "fs" | "local" => Ok(Self::Filesystem),
            "s3" => Ok(Self::S3),
            "cloud" | "fog" => Ok(Self::Cloud),
            _ => Err(StorageError::unknown_backend(name)),
        }
    }

    /// Canonical backend name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Filesystem => "filesystem",
            Self::S3 => "s3",
            Self::Cloud => "cloud",
        }
    }
}

/// Canned object ACL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Owner only.
    Private,
    /// Anyone may read.
    PublicRead,
    /// Anyone may read and write.
    PublicReadWrite,
    /// Any authenticated principal may read.
    AuthenticatedRead,
    /// Bucket owner may read.
    BucketOwnerRead,
    /// Bucket owner has full control.
    BucketOwnerFullControl,
}

impl Permission {
    /// Parse `public-read`, `public_read` or `:public_read`.
    #[must_use]
    pub fn from_acl(value: &str) -> Option<Self> {
        let normalized = value.trim().trim_start_matches(':').replace('_', "-");
        match normalized.as_str() {
            "private" => Some(Self::Private),
            "public-read" => Some(Self::PublicRead),
            "public-read-write" => Some(Self::PublicReadWrite),
            "authenticated-read" => Some(Self::AuthenticatedRead),
            "bucket-owner-read" => Some(Self::BucketOwnerRead),
            "bucket-owner-full-control" => Some(Self::BucketOwnerFullControl),
            _ => None,
        }
    }

    /// Wire value of the canned ACL.
    #[must_use]
    pub fn as_acl(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::PublicRead => "public-read",
            Self::PublicReadWrite => "public-read-write",
            Self::AuthenticatedRead => "authenticated-read",
            Self::BucketOwnerRead => "bucket-owner-read",
            Self::BucketOwnerFullControl => "bucket-owner-full-control",
        }
    }
}

/// Per-style ACL selection, resolved at write time.
#[derive(Clone)]
pub enum Permissions {
    /// Same ACL for every style.
    Constant(Permission),
    /// ACL per style name, with a fallback for unlisted styles.
    ByStyle {
        /// Style name to ACL.
        styles: HashMap<String, Permission>,
        /// ACL for styles not listed.
        fallback: Permission,
    },
    /// ACL computed from the attachment and style name.
    Computed(Arc<dyn Fn(&Attachment, &str) -> Permission + Send + Sync>),
}

impl Permissions {
    /// Wrap a closure.
    pub fn computed(f: impl Fn(&Attachment, &str) -> Permission + Send + Sync + 'static) -> Self {
        Self::Computed(Arc::new(f))
    }

    /// Resolve the ACL for one style.
    #[must_use]
    pub fn resolve(&self, attachment: &Attachment, style: &str) -> Permission {
        match self {
            Self::Constant(permission) => *permission,
            Self::ByStyle { styles, fallback } => styles.get(style).copied().unwrap_or(*fallback),
            Self::Computed(f) => f(attachment, style),
        }
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::Constant(Permission::PublicRead)
    }
}

impl From<Permission> for Permissions {
    fn from(permission: Permission) -> Self {
        Self::Constant(permission)
    }
}

impl fmt::Debug for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(p) => f.debug_tuple("Constant").field(p).finish(),
            Self::ByStyle { styles, fallback } => f
                .debug_struct("ByStyle")
                .field("styles", styles)
                .field("fallback", fallback)
                .finish(),
            Self::Computed(_) => f.write_str("Computed(<fn>)"),
        }
    }
}

/// Object storage options.
#[derive(Debug, Clone)]
pub struct S3Options {
    /// Bucket; falls back to `bucket` in the credentials.
    pub bucket: Option<Deferred<String>>,
    /// Credential source, flat or stage-keyed.
    pub credentials: CredentialsSource,
    /// ACL per style.
    pub permissions: Permissions,
    /// Extra request headers.
    pub headers: BTreeMap<String, String>,
    /// Object metadata.
    pub metadata: BTreeMap<String, String>,
    /// Storage class; wins over an `x-amz-storage-class` header.
    pub storage_class: Option<String>,
    /// CNAME serving the bucket.
    pub host_alias: Option<Deferred<String>>,
    /// Service domain; falls back to `s3_host_name` in the credentials.
    pub host_name: Option<String>,
    /// Public base URL in front of the bucket.
    pub public_host: Option<String>,
    /// URL protocol.
    pub protocol: Deferred<String>,
    /// Region; falls back to `region` in the credentials.
    pub region: Option<String>,
    /// API endpoint override for S3-compatible services.
    pub endpoint_url: Option<String>,
    /// Proxy for every request to the object store.
    pub http_proxy: Option<HttpProxy>,
}

impl Default for S3Options {
    fn default() -> Self {
        Self {
            bucket: None,
            credentials: CredentialsSource::default(),
            permissions: Permissions::default(),
            headers: BTreeMap::new(),
            metadata: BTreeMap::new(),
            storage_class: None,
            host_alias: None,
            host_name: None,
            public_host: None,
            protocol: "https".into(),
            region: None,
            endpoint_url: None,
            http_proxy: None,
        }
    }
}

impl S3Options {
    /// Build options from deployment settings.
    ///
    /// Unknown ACL names are logged and the default kept.
    #[must_use]
    pub fn from_settings(settings: &S3Settings) -> Self {
        let mut options = Self {
            bucket: settings.bucket.as_deref().map(Deferred::from),
            credentials: credentials_source(settings.credentials_file.as_ref(), &settings.credentials),
            headers: settings.headers.clone().into_iter().collect(),
            metadata: settings.metadata.clone().into_iter().collect(),
            storage_class: settings.storage_class.clone(),
            host_alias: settings.host_alias.as_deref().map(Deferred::from),
            host_name: settings.host_name.clone(),
            public_host: settings.public_host.clone(),
            region: settings.region.clone(),
            endpoint_url: settings.endpoint_url.clone(),
            http_proxy: settings.http_proxy.as_ref().map(HttpProxy::from),
            ..Self::default()
        };
        if let Some(protocol) = &settings.protocol {
            options.protocol = protocol.as_str().into();
        }
        if let Some(acl) = &settings.permissions {
            match Permission::from_acl(acl) {
                Some(permission) => options.permissions = permission.into(),
                None => warn!(acl = %acl, "unknown permission, keeping public-read"),
            }
        }
        options
    }

    /// Set the bucket.
    #[must_use]
    pub fn with_bucket(mut self, bucket: impl Into<Deferred<String>>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Set the credential source.
    #[must_use]
    pub fn with_credentials(mut self, credentials: impl Into<CredentialsSource>) -> Self {
        self.credentials = credentials.into();
        self
    }

    /// Set permissions.
    #[must_use]
    pub fn with_permissions(mut self, permissions: impl Into<Permissions>) -> Self {
        self.permissions = permissions.into();
        self
    }

    /// Add a request header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Add an object metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set the storage class.
    #[must_use]
    pub fn with_storage_class(mut self, class: impl Into<String>) -> Self {
        self.storage_class = Some(class.into());
        self
    }

    /// Set the host alias.
    #[must_use]
    pub fn with_host_alias(mut self, alias: impl Into<Deferred<String>>) -> Self {
        self.host_alias = Some(alias.into());
        self
    }

    /// Set the service domain.
    #[must_use]
    pub fn with_host_name(mut self, host_name: impl Into<String>) -> Self {
        self.host_name = Some(host_name.into());
        self
    }

    /// Set the public host.
    #[must_use]
    pub fn with_public_host(mut self, host: impl Into<String>) -> Self {
        self.public_host = Some(host.into());
        self
    }

    /// Set the URL protocol.
    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<Deferred<String>>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Set the region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set the API endpoint.
    #[must_use]
    pub fn with_endpoint_url(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint.into());
        self
    }

    /// Route requests through a proxy.
    #[must_use]
    pub fn with_http_proxy(mut self, proxy: HttpProxy) -> Self {
        self.http_proxy = Some(proxy);
        self
    }

    /// Whether requests go through a proxy.
    #[must_use]
    pub fn using_http_proxy(&self) -> bool {
        self.http_proxy.is_some()
    }
}

/// HTTP proxy in front of the object store.
#[derive(Clone, PartialEq, Eq)]
pub struct HttpProxy {
    /// Host, with or without a scheme.
    pub host: String,
    /// Port.
    pub port: Option<u16>,
    /// Basic auth user.
    pub user: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
}

impl HttpProxy {
    /// Proxy at `host`.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            user: None,
            password: None,
        }
    }

    /// Set the port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Authenticate with basic auth.
    #[must_use]
    pub fn with_basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    /// Proxy URI. The scheme defaults to `http`.
    #[must_use]
    pub fn uri(&self) -> String {
        let base = if self.host.contains("://") {
            self.host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", self.host.trim_end_matches('/'))
        };
        match self.port {
            Some(port) => format!("{base}:{port}"),
            None => base,
        }
    }
}

impl From<&HttpProxySettings> for HttpProxy {
    fn from(settings: &HttpProxySettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            user: settings.user.clone(),
            password: settings.password.clone(),
        }
    }
}

impl fmt::Debug for HttpProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpProxy")
            .field("uri", &self.uri())
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Cloud storage options.
#[derive(Debug, Clone)]
pub struct CloudOptions {
    /// Provider name; falls back to `provider` in the credentials.
    pub provider: Option<String>,
    /// Bucket or container.
    pub directory: Option<Deferred<String>>,
    /// Whether files are meant to be publicly readable.
    pub public: bool,
    /// Public host; `%d` is replaced by a shard number in `0..=3`.
    pub host: Option<String>,
    /// Credential source, flat or stage-keyed.
    pub credentials: CredentialsSource,
    /// `Cache-Control` for written files.
    pub cache_control: Option<String>,
    /// `Content-Disposition` for written files.
    pub content_disposition: Option<String>,
}

impl Default for CloudOptions {
    fn default() -> Self {
        Self {
            provider: None,
            directory: None,
            public: true,
            host: None,
            credentials: CredentialsSource::default(),
            cache_control: None,
            content_disposition: None,
        }
    }
}

impl CloudOptions {
    /// Build options from deployment settings.
    #[must_use]
    pub fn from_settings(settings: &CloudSettings) -> Self {
        Self {
            provider: settings.provider.clone(),
            directory: settings.directory.as_deref().map(Deferred::from),
            host: settings.host.clone(),
            credentials: credentials_source(settings.credentials_file.as_ref(), &settings.credentials),
            cache_control: settings.cache_control.clone(),
            content_disposition: settings.content_disposition.clone(),
            ..Self::default()
        }
    }

    /// Set the provider.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Set the directory.
    #[must_use]
    pub fn with_directory(mut self, directory: impl Into<Deferred<String>>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Mark files public or private.
    #[must_use]
    pub fn with_public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    /// Set the public host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the credential source.
    #[must_use]
    pub fn with_credentials(mut self, credentials: impl Into<CredentialsSource>) -> Self {
        self.credentials = credentials.into();
        self
    }

    /// Set `Cache-Control` for written files.
    #[must_use]
    pub fn with_cache_control(mut self, value: impl Into<String>) -> Self {
        self.cache_control = Some(value.into());
        self
    }

    /// Set `Content-Disposition` for written files.
    #[must_use]
    pub fn with_content_disposition(mut self, value: impl Into<String>) -> Self {
        self.content_disposition = Some(value.into());
        self
    }
}

fn credentials_source(file: Option<&PathBuf>, inline: &CredentialMap) -> CredentialsSource {
    file.map_or_else(
        || CredentialsSource::Inline(inline.clone()),
        |path| CredentialsSource::File(path.clone()),
    )
}

/// Cloud storage provider connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudProvider {
    /// S3-compatible storage: AWS S3, Cloudflare R2, MinIO.
    S3 {
        /// Endpoint URL, `None` for AWS.
        endpoint: Option<String>,
        /// Access key ID.
        access_key_id: Option<String>,
        /// Secret access key.
        secret_access_key: Option<String>,
        /// Region.
        region: String,
    },
    /// Azure Blob Storage.
    AzureBlob {
        /// Storage account name.
        account: String,
        /// Storage access key.
        access_key: String,
    },
    /// Local filesystem (development only).
    LocalFs {
        /// Root directory path.
        root: PathBuf,
    },
    /// In-process memory (tests only).
    Memory,
}

impl CloudProvider {
    /// Build a provider from its name and resolved credentials.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown providers or missing Azure account keys.
    pub fn from_credentials(name: &str, credentials: &Credentials) -> Result<Self, StorageError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "aws" | "s3" => Ok(Self::S3 {
                endpoint: credentials.get("endpoint"),
                access_key_id: credentials.get("aws_access_key_id"),
                secret_access_key: credentials.get("aws_secret_access_key"),
                region: credentials
                    .get("region")
                    .unwrap_or_else(|| "us-east-1".to_string()),
            }),
            "azure" | "azureblob" => Ok(Self::AzureBlob {
                account: credentials
                    .get("azure_storage_account_name")
                    .ok_or_else(|| StorageError::missing_option("azure_storage_account_name"))?,
                access_key: credentials
                    .get("azure_storage_access_key")
                    .ok_or_else(|| StorageError::missing_option("azure_storage_access_key"))?,
            }),
            "local" => Ok(Self::LocalFs {
                root: credentials
                    .get("local_root")
                    .ok_or_else(|| StorageError::missing_option("local_root"))?
                    .into(),
            }),
            "memory" => Ok(Self::Memory),
            other => Err(StorageError::configuration(format!(
                "unknown cloud provider '{other}'"
            ))),
        }
    }

    /// Provider name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::S3 { .. } => "aws",
            Self::AzureBlob { .. } => "azure",
            Self::LocalFs { .. } => "local",
            Self::Memory => "memory",
        }
    }
}
