//! S3-compatible object storage backend.
//!
//! Bucket, host and permissions are resolved per attachment and style at the
//! point of use. A write into a missing bucket creates the bucket and retries
//! the write once.

mod client;
mod headers;
mod host;

#[cfg(test)]
pub(crate) mod mock;

#[cfg(test)]
mod host_props;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, instrument, warn};

pub use client::{ClientError, ClientSettings, ObjectClient, PutObject, SdkClient};
pub use headers::WriteHeaders;
pub use host::is_valid_subdomain_bucket;

use super::backend::{BackendStrategy, require_tls};
use super::config::{BackendKind, Permissions, S3Options};
use super::error::StorageError;
use crate::attachment::{Attachment, Deferred};
use crate::credentials::{CredentialResolver, Credentials};

/// S3 backend.
#[derive(Debug)]
pub struct S3Backend {
    client: Arc<dyn ObjectClient>,
    bucket: Deferred<String>,
    permissions: Permissions,
    headers: WriteHeaders,
    host_alias: Option<Deferred<String>>,
    host_name: String,
    public_host: Option<String>,
    protocol: Deferred<String>,
}

impl S3Backend {
    /// Service domain used when none is configured.
    pub const DEFAULT_HOST_NAME: &'static str = "s3.amazonaws.com";
    /// Region used when none is configured.
    pub const DEFAULT_REGION: &'static str = "us-east-1";
    /// URL pattern used when the attachment sets none.
    pub const DEFAULT_URL: &'static str = ":s3_url";

    /// Resolve credentials for `stage` and connect through the AWS SDK.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials cannot be loaded or no bucket is
    /// configured.
    pub fn from_options(options: &S3Options, stage: &str) -> Result<Self, StorageError> {
        let credentials = CredentialResolver::new().resolve(&options.credentials, stage)?;
        let settings = ClientSettings {
            region: options
                .region
                .clone()
                .or_else(|| credentials.get("region"))
                .unwrap_or_else(|| Self::DEFAULT_REGION.to_string()),
            endpoint_url: options
                .endpoint_url
                .clone()
                .or_else(|| credentials.get("endpoint")),
            access_key_id: credentials.get("access_key_id"),
            secret_access_key: credentials.get("secret_access_key"),
            session_token: credentials.get("session_token"),
            http_proxy: options.http_proxy.clone(),
        };
        debug!(?settings, "connecting s3 backend");
        let client = Arc::new(SdkClient::new(&settings)?);
        Self::build(options, &credentials, client)
    }

    /// Use an existing client.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials cannot be loaded or no bucket is
    /// configured.
    pub fn with_client(
        options: &S3Options,
        stage: &str,
        client: Arc<dyn ObjectClient>,
    ) -> Result<Self, StorageError> {
        let credentials = CredentialResolver::new().resolve(&options.credentials, stage)?;
        Self::build(options, &credentials, client)
    }

    fn build(
        options: &S3Options,
        credentials: &Credentials,
        client: Arc<dyn ObjectClient>,
    ) -> Result<Self, StorageError> {
        let bucket = options
            .bucket
            .clone()
            .or_else(|| credentials.get("bucket").map(Deferred::Literal))
            .ok_or_else(|| StorageError::missing_option("bucket"))?;

        let host_name = options
            .host_name
            .clone()
            .or_else(|| credentials.get("s3_host_name"))
            .unwrap_or_else(|| Self::DEFAULT_HOST_NAME.to_string());

        Ok(Self {
            client,
            bucket,
            permissions: options.permissions.clone(),
            headers: WriteHeaders::normalize(
                &options.headers,
                &options.metadata,
                options.storage_class.as_deref(),
            ),
            host_alias: options.host_alias.clone(),
            host_name,
            public_host: options.public_host.clone(),
            protocol: options.protocol.clone(),
        })
    }

    /// Bucket for `attachment`.
    ///
    /// # Errors
    ///
    /// Returns `MissingRequiredOption` if a computed bucket comes back empty.
    pub fn bucket_name(&self, attachment: &Attachment) -> Result<String, StorageError> {
        let bucket = self.bucket.resolve(attachment);
        if bucket.is_empty() {
            return Err(StorageError::missing_option("bucket"));
        }
        Ok(bucket)
    }

    /// Service domain.
    #[must_use]
    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    /// URL in the highest-priority form available: host alias, public host,
    /// bucket subdomain, then path style.
    fn auto_url(&self, attachment: &Attachment, bucket: &str, key: &str) -> String {
        let protocol = self.protocol.resolve(attachment);
        if let Some(alias) = &self.host_alias {
            return host::alias_url(&protocol, &alias.resolve(attachment), key);
        }
        if let Some(public_host) = &self.public_host {
            return host::public_host_url(&protocol, public_host, key);
        }
        if is_valid_subdomain_bucket(bucket) {
            host::domain_url(&protocol, &self.host_name, bucket, key)
        } else {
            host::path_url(&protocol, &self.host_name, bucket, key)
        }
    }

    async fn put(&self, request: PutObject) -> Result<(), StorageError> {
        let key = request.key.clone();
        let bucket = request.bucket.clone();

        match self.client.put_object(request.clone()).await {
            Ok(()) => Ok(()),
            Err(ClientError::NoSuchBucket) => {
                info!(bucket = %bucket, "bucket missing, creating it");
                self.client
                    .create_bucket(&bucket)
                    .await
                    .map_err(|e| StorageError::write_after_retry(&key, e.to_string()))?;
                self.client
                    .put_object(request)
                    .await
                    .map_err(|e| StorageError::write_after_retry(&key, e.to_string()))
            }
            Err(e) => Err(StorageError::write(&key, e.to_string())),
        }
    }
}

#[async_trait]
impl BackendStrategy for S3Backend {
    fn kind(&self) -> BackendKind {
        BackendKind::S3
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
        let protocol = || self.protocol.resolve(attachment);
        let bucket = || self.bucket.resolve(attachment);
        match token {
            "s3_url" => Some(self.auto_url(attachment, &bucket(), key)),
            "s3_path_url" => Some(host::path_url(&protocol(), &self.host_name, &bucket(), key)),
            "s3_domain_url" => Some(host::domain_url(&protocol(), &self.host_name, &bucket(), key)),
            "s3_alias_url" => {
                let alias = self.host_alias.as_ref()?.resolve(attachment);
                Some(host::alias_url(&protocol(), &alias, key))
            }
            "asset_host" => Some(key.to_string()),
            _ => None,
        }
    }

    #[instrument(skip(self, attachment, body), fields(storage = "s3"))]
    async fn write(
        &self,
        attachment: &Attachment,
        style: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let bucket = self.bucket_name(attachment)?;
        let mut request = PutObject {
            bucket: bucket.clone(),
            key: key.to_string(),
            body,
            content_type: content_type.to_string(),
            acl: self.permissions.resolve(attachment, style),
            cache_control: None,
            content_disposition: None,
            content_encoding: None,
            content_language: None,
            expires: None,
            metadata: std::collections::BTreeMap::new(),
            storage_class: None,
        };
        self.headers.apply(&mut request);
        debug!(bucket = %bucket, acl = request.acl.as_acl(), "writing object");

        self.put(request).await?;
        info!(bucket = %bucket, "object written");
        Ok(())
    }

    #[instrument(skip(self, attachment), fields(storage = "s3"))]
    async fn delete(&self, attachment: &Attachment, key: &str) -> Result<(), StorageError> {
        let bucket = self.bucket_name(attachment)?;
        match self.client.delete_object(&bucket, key).await {
            Ok(()) => {
                info!(bucket = %bucket, "object deleted");
                Ok(())
            }
            Err(ClientError::NotFound | ClientError::NoSuchBucket) => {
                warn!(bucket = %bucket, "object already absent");
                Ok(())
            }
            Err(e) => Err(StorageError::delete(key, e.to_string())),
        }
    }

    async fn exists(&self, attachment: &Attachment, key: &str) -> Result<bool, StorageError> {
        let bucket = self.bucket_name(attachment)?;
        match self.client.head_object(&bucket, key).await {
            Ok(found) => Ok(found),
            Err(ClientError::NotFound | ClientError::NoSuchBucket) => Ok(false),
            Err(e) => Err(StorageError::operation(e.to_string())),
        }
    }

    #[instrument(skip(self, attachment), fields(storage = "s3"))]
    async fn expiring_url(
        &self,
        attachment: &Attachment,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        let bucket = self.bucket_name(attachment)?;
        let url = self
            .client
            .presign_get(&bucket, key, expires_in)
            .await
            .map_err(|e| StorageError::operation(e.to_string()))?;
        require_tls(url)
    }
}
