//! Provider-agnostic cloud storage backend using Apache OpenDAL.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Apache OpenDAL                              │
//! │                   (Unified Storage API)                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ op.write_with("key", data) │ op.presign_read("key", duration)   │
//! │ op.delete("key")           │ op.stat("key")                     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! One operator is built per directory and reused. For AWS, a native object
//! client creates a missing bucket before one retried write and applies the
//! public or private ACL after each write.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use opendal::{ErrorKind, Operator, services};
use tracing::{debug, info, instrument};

use super::backend::{BackendStrategy, require_tls};
use super::config::{BackendKind, CloudOptions, CloudProvider, Permission};
use super::error::StorageError;
use super::s3::{ClientSettings, ObjectClient, SdkClient, is_valid_subdomain_bucket};
use crate::attachment::{Attachment, Deferred};
use crate::credentials::CredentialResolver;

/// Number of hosts a `%d` wildcard expands over.
const HOST_SHARDS: u32 = 4;

/// Cloud storage backend.
#[derive(Debug)]
pub struct CloudBackend {
    provider: CloudProvider,
    directory: Deferred<String>,
    public: bool,
    host: Option<String>,
    cache_control: Option<String>,
    content_disposition: Option<String>,
    operators: Mutex<HashMap<String, Operator>>,
    buckets: Option<Arc<dyn ObjectClient>>,
}

impl CloudBackend {
    /// URL pattern used when the attachment sets none.
    pub const DEFAULT_URL: &'static str = ":cloud_url";

    /// Resolve credentials for `stage` and select the provider.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials cannot be loaded, or the provider or
    /// directory is missing.
    pub fn from_options(options: &CloudOptions, stage: &str) -> Result<Self, StorageError> {
        let credentials = CredentialResolver::new().resolve(&options.credentials, stage)?;

        let provider_name = options
            .provider
            .clone()
            .or_else(|| credentials.get("provider"))
            .ok_or_else(|| StorageError::missing_option("provider"))?;
        let provider = CloudProvider::from_credentials(&provider_name, &credentials)?;

        let directory = options
            .directory
            .clone()
            .or_else(|| credentials.get("directory").map(Deferred::Literal))
            .ok_or_else(|| StorageError::missing_option("directory"))?;

        let buckets = match &provider {
            CloudProvider::S3 {
                endpoint,
                access_key_id,
                secret_access_key,
                region,
            } => {
                let settings = ClientSettings {
                    region: region.clone(),
                    endpoint_url: endpoint.clone(),
                    access_key_id: access_key_id.clone(),
                    secret_access_key: secret_access_key.clone(),
                    ..ClientSettings::default()
                };
                Some(Arc::new(SdkClient::new(&settings)?) as Arc<dyn ObjectClient>)
            }
            _ => None,
        };

        debug!(provider = provider.name(), buckets = buckets.is_some(), "cloud backend configured");
        Ok(Self {
            provider,
            directory,
            public: options.public,
            host: options.host.clone(),
            cache_control: options.cache_control.clone(),
            content_disposition: options.content_disposition.clone(),
            operators: Mutex::new(HashMap::new()),
            buckets,
        })
    }

    /// Use `client` for bucket creation and ACLs.
    #[must_use]
    pub fn with_bucket_client(mut self, client: Arc<dyn ObjectClient>) -> Self {
        self.buckets = Some(client);
        self
    }

    /// Whether written files are made publicly readable.
    ///
    /// Enforced per object where a bucket client exists; elsewhere the
    /// container policy decides.
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.public
    }

    fn acl(&self) -> Permission {
        if self.public {
            Permission::PublicRead
        } else {
            Permission::Private
        }
    }

    async fn put(
        &self,
        op: &Operator,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> opendal::Result<()> {
        let capability = op.info().full_capability();

        let mut write = op.write_with(key, body);
        if capability.write_with_content_type {
            write = write.content_type(content_type);
        }
        if capability.write_with_cache_control
            && let Some(value) = &self.cache_control
        {
            write = write.cache_control(value);
        }
        if capability.write_with_content_disposition
            && let Some(value) = &self.content_disposition
        {
            write = write.content_disposition(value);
        }
        write.await.map(|_| ())
    }

    /// Directory for `attachment`.
    ///
    /// # Errors
    ///
    /// Returns `MissingRequiredOption` if a computed directory comes back empty.
    pub fn directory_name(&self, attachment: &Attachment) -> Result<String, StorageError> {
        let directory = self.directory.resolve(attachment);
        if directory.is_empty() {
            return Err(StorageError::missing_option("directory"));
        }
        Ok(directory)
    }

    fn operator(&self, directory: &str) -> Result<Operator, StorageError> {
        let mut operators = self
            .operators
            .lock()
            .map_err(|_| StorageError::operation("operator cache poisoned"))?;
        if let Some(op) = operators.get(directory) {
            return Ok(op.clone());
        }
        let op = create_operator(&self.provider, directory)?;
        operators.insert(directory.to_string(), op.clone());
        Ok(op)
    }

    fn public_url(&self, directory: &str, key: &str) -> String {
        if let Some(host) = &self.host {
            let host = if host.contains("%d") {
                host.replace("%d", &shard(key).to_string())
            } else {
                host.clone()
            };
            return format!("{}/{key}", host.trim_end_matches('/'));
        }
        match &self.provider {
            CloudProvider::S3 {
                endpoint: Some(endpoint),
                ..
            } => format!("{}/{directory}/{key}", endpoint.trim_end_matches('/')),
            CloudProvider::S3 { endpoint: None, .. } if is_valid_subdomain_bucket(directory) => {
                format!("https://{directory}.s3.amazonaws.com/{key}")
            }
            CloudProvider::S3 { endpoint: None, .. } => {
                format!("https://s3.amazonaws.com/{directory}/{key}")
            }
            CloudProvider::AzureBlob { account, .. } => {
                format!("https://{account}.blob.core.windows.net/{directory}/{key}")
            }
            CloudProvider::LocalFs { .. } | CloudProvider::Memory => format!("/{key}"),
        }
    }
}

/// Settle a first write attempt.
///
/// A `NotFound` failure with a bucket client creates `bucket` and runs
/// `retry` once; errors on that path are marked as retried.
async fn create_and_retry<F, Fut>(
    key: &str,
    first: opendal::Result<()>,
    buckets: Option<(&dyn ObjectClient, &str)>,
    retry: F,
) -> Result<(), StorageError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = opendal::Result<()>>,
{
    match (first, buckets) {
        (Ok(()), _) => Ok(()),
        (Err(e), Some((client, bucket))) if e.kind() == ErrorKind::NotFound => {
            info!(bucket = %bucket, "bucket missing, creating it");
            client
                .create_bucket(bucket)
                .await
                .map_err(|e| StorageError::write_after_retry(key, e.to_string()))?;
            retry()
                .await
                .map_err(|e| StorageError::write_after_retry(key, e.to_string()))
        }
        (Err(e), _) => Err(StorageError::write(key, e.to_string())),
    }
}

/// Deterministic shard for a `%d` host wildcard.
fn shard(key: &str) -> u32 {
    key.bytes().map(u32::from).sum::<u32>() % HOST_SHARDS
}

/// Create OpenDAL operator for one directory.
fn create_operator(provider: &CloudProvider, directory: &str) -> Result<Operator, StorageError> {
    let op = match provider {
        CloudProvider::S3 {
            endpoint,
            access_key_id,
            secret_access_key,
            region,
        } => {
            let mut builder = services::S3::default().bucket(directory).region(region);
            if let Some(endpoint) = endpoint {
                builder = builder.endpoint(endpoint);
            }
            if let Some(id) = access_key_id {
                builder = builder.access_key_id(id);
            }
            if let Some(secret) = secret_access_key {
                builder = builder.secret_access_key(secret);
            }
            Operator::new(builder)
                .map_err(|e| StorageError::configuration(e.to_string()))?
                .finish()
        }
        CloudProvider::AzureBlob {
            account,
            access_key,
        } => {
            let builder = services::Azblob::default()
                .account_name(account)
                .account_key(access_key)
                .container(directory)
                .endpoint(&format!("https://{account}.blob.core.windows.net"));

            Operator::new(builder)
                .map_err(|e| StorageError::configuration(e.to_string()))?
                .finish()
        }
        CloudProvider::LocalFs { root } => {
            let root = root.join(directory);
            let builder = services::Fs::default().root(
                root.to_str()
                    .ok_or_else(|| StorageError::configuration("invalid path"))?,
            );

            Operator::new(builder)
                .map_err(|e| StorageError::configuration(e.to_string()))?
                .finish()
        }
        CloudProvider::Memory => Operator::new(services::Memory::default())
            .map_err(|e| StorageError::configuration(e.to_string()))?
            .finish(),
    };
    Ok(op)
}

#[async_trait]
impl BackendStrategy for CloudBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cloud
    }

    fn key_for(&self, path: &str) -> String {
        path.trim_start_matches('/').to_string()
    }

    fn default_url_pattern(&self) -> &str {
        Self::DEFAULT_URL
    }

    fn url_token(
        &self,
        token: &str,
        attachment: &Attachment,
        _style: &str,
        key: &str,
    ) -> Option<String> {
        if token != "cloud_url" {
            return None;
        }
        let directory = self.directory.resolve(attachment);
        Some(self.public_url(&directory, key))
    }

    #[instrument(skip(self, attachment, body), fields(storage = "cloud"))]
    async fn write(
        &self,
        attachment: &Attachment,
        style: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let directory = self.directory_name(attachment)?;
        let op = self.operator(&directory)?;

        let first = self.put(&op, key, body.clone(), content_type).await;
        let buckets = self.buckets.as_deref().map(|client| (client, directory.as_str()));
        create_and_retry(key, first, buckets, || self.put(&op, key, body, content_type)).await?;

        if let Some(client) = &self.buckets {
            let acl = self.acl();
            client
                .put_object_acl(&directory, key, acl)
                .await
                .map_err(|e| StorageError::write(key, e.to_string()))?;
            debug!(acl = acl.as_acl(), "acl applied");
        }

        info!(directory = %directory, "object written");
        Ok(())
    }

    #[instrument(skip(self, attachment), fields(storage = "cloud"))]
    async fn delete(&self, attachment: &Attachment, key: &str) -> Result<(), StorageError> {
        let directory = self.directory_name(attachment)?;
        let op = self.operator(&directory)?;
        match op.delete(key).await {
            Ok(()) => {
                info!(directory = %directory, "object deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::delete(key, e.to_string())),
        }
    }

    async fn exists(&self, attachment: &Attachment, key: &str) -> Result<bool, StorageError> {
        let directory = self.directory_name(attachment)?;
        let op = self.operator(&directory)?;
        match op.stat(key).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::from(e)),
        }
    }

    #[instrument(skip(self, attachment), fields(storage = "cloud"))]
    async fn expiring_url(
        &self,
        attachment: &Attachment,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        let directory = self.directory_name(attachment)?;
        let op = self.operator(&directory)?;
        let presigned = op
            .presign_read(key, expires_in)
            .await
            .map_err(StorageError::from)?;
        require_tls(presigned.uri().to_string())
    }
}
