//! Object storage client boundary.
//!
//! [`ObjectClient`] is the capability set the object-storage backends need:
//! write, delete, exists, ACL updates, signing and bucket creation.
//! [`SdkClient`] implements it over the AWS SDK.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials as AwsCredentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::{ByteStream, DateTime, DateTimeFormat};
use aws_sdk_s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, ObjectCannedAcl, StorageClass,
};
use aws_smithy_http_client::proxy::ProxyConfig;
use aws_smithy_http_client::{Connector, tls};
use aws_smithy_runtime_api::client::http::{SharedHttpClient, SharedHttpConnector, http_client_fn};
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::storage::config::{HttpProxy, Permission};
use crate::storage::error::StorageError;

/// Object client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The bucket does not exist.
    #[error("bucket does not exist")]
    NoSuchBucket,

    /// The object does not exist.
    #[error("object does not exist")]
    NotFound,

    /// Any other service or transport failure.
    #[error("{0}")]
    Service(String),
}

/// One object write.
#[derive(Debug, Clone, PartialEq)]
pub struct PutObject {
    /// Bucket.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Content.
    pub body: Bytes,
    /// `Content-Type`.
    pub content_type: String,
    /// Canned ACL.
    pub acl: Permission,
    /// `Cache-Control`.
    pub cache_control: Option<String>,
    /// `Content-Disposition`.
    pub content_disposition: Option<String>,
    /// `Content-Encoding`.
    pub content_encoding: Option<String>,
    /// `Content-Language`.
    pub content_language: Option<String>,
    /// `Expires`, as an HTTP date.
    pub expires: Option<String>,
    /// User metadata.
    pub metadata: BTreeMap<String, String>,
    /// Storage class.
    pub storage_class: Option<String>,
}

/// Capabilities the S3 backend uses.
#[async_trait]
pub trait ObjectClient: Send + Sync + fmt::Debug {
    /// Write an object.
    async fn put_object(&self, request: PutObject) -> Result<(), ClientError>;

    /// Delete an object.
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), ClientError>;

    /// Whether an object exists.
    async fn head_object(&self, bucket: &str, key: &str) -> Result<bool, ClientError>;

    /// Create a bucket.
    async fn create_bucket(&self, bucket: &str) -> Result<(), ClientError>;

    /// Replace an existing object's canned ACL.
    async fn put_object_acl(
        &self,
        bucket: &str,
        key: &str,
        acl: Permission,
    ) -> Result<(), ClientError>;

    /// Signed GET URL.
    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, ClientError>;
}

/// Connection parameters for [`SdkClient`].
#[derive(Clone, Default)]
pub struct ClientSettings {
    /// Region.
    pub region: String,
    /// Endpoint override; enables path-style addressing.
    pub endpoint_url: Option<String>,
    /// Access key ID; the default provider chain is used when absent.
    pub access_key_id: Option<String>,
    /// Secret access key.
    pub secret_access_key: Option<String>,
    /// Session token.
    pub session_token: Option<String>,
    /// Proxy every request goes through.
    pub http_proxy: Option<HttpProxy>,
}

impl fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSettings")
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .field("access_key_id", &self.access_key_id.as_ref().map(|_| "[REDACTED]"))
            .field("http_proxy", &self.http_proxy)
            .finish_non_exhaustive()
    }
}

/// [`ObjectClient`] over the AWS SDK.
///
/// The SDK configuration is resolved on first use. Static keys win; without
/// them the default provider chain applies (environment, profile, web
/// identity, container and instance metadata).
pub struct SdkClient {
    settings: ClientSettings,
    proxy: Option<ProxyConfig>,
    shared: OnceCell<SdkConfig>,
    client: OnceCell<aws_sdk_s3::Client>,
    presigner: OnceCell<aws_sdk_s3::Client>,
}

impl fmt::Debug for SdkClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkClient")
            .field("region", &self.settings.region)
            .field("endpoint_url", &self.settings.endpoint_url)
            .field("proxied", &self.proxy.is_some())
            .finish_non_exhaustive()
    }
}

impl SdkClient {
    /// Build a client. No network call is made.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the proxy address is not a valid URI.
    pub fn new(settings: &ClientSettings) -> Result<Self, StorageError> {
        let proxy = settings.http_proxy.as_ref().map(proxy_config).transpose()?;
        Ok(Self {
            settings: settings.clone(),
            proxy,
            shared: OnceCell::new(),
            client: OnceCell::new(),
            presigner: OnceCell::new(),
        })
    }

    async fn shared_config(&self) -> &SdkConfig {
        self.shared
            .get_or_init(|| async {
                let mut loader = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(self.settings.region.clone()));

                if let (Some(id), Some(secret)) =
                    (&self.settings.access_key_id, &self.settings.secret_access_key)
                {
                    loader = loader.credentials_provider(AwsCredentials::new(
                        id,
                        secret,
                        self.settings.session_token.clone(),
                        None,
                        "clipvault",
                    ));
                }
                if let Some(proxy) = &self.proxy {
                    loader = loader.http_client(proxied_http_client(proxy.clone()));
                }

                loader.load().await
            })
            .await
    }

    async fn client(&self) -> &aws_sdk_s3::Client {
        self.client
            .get_or_init(|| async {
                s3_client(self.shared_config().await, self.settings.endpoint_url.clone())
            })
            .await
    }

    /// Client used for signing; its endpoint is always https.
    async fn presigner(&self) -> &aws_sdk_s3::Client {
        self.presigner
            .get_or_init(|| async {
                let endpoint = self.settings.endpoint_url.as_deref().map(force_https);
                s3_client(self.shared_config().await, endpoint)
            })
            .await
    }
}

fn s3_client(shared: &SdkConfig, endpoint: Option<String>) -> aws_sdk_s3::Client {
    let mut builder = aws_sdk_s3::config::Builder::from(shared);
    if let Some(endpoint) = endpoint {
        builder = builder.endpoint_url(endpoint).force_path_style(true);
    }
    aws_sdk_s3::Client::from_conf(builder.build())
}

/// `endpoint` with its scheme replaced by `https`.
fn force_https(endpoint: &str) -> String {
    match endpoint.split_once("://") {
        Some((_, rest)) => format!("https://{rest}"),
        None => format!("https://{endpoint}"),
    }
}

fn proxy_config(proxy: &HttpProxy) -> Result<ProxyConfig, StorageError> {
    let config = ProxyConfig::all(proxy.uri()).map_err(|e| {
        StorageError::configuration(format!("invalid http_proxy {}: {e}", proxy.host))
    })?;
    Ok(match (&proxy.user, &proxy.password) {
        (Some(user), Some(password)) => config.with_basic_auth(user, password),
        _ => config,
    })
}

/// HTTP client whose connectors route through `proxy`.
fn proxied_http_client(proxy: ProxyConfig) -> SharedHttpClient {
    http_client_fn(move |settings, components| {
        let mut builder = Connector::builder()
            .connector_settings(settings.clone())
            .proxy_config(proxy.clone());
        if let Some(sleep) = components.sleep_impl() {
            builder = builder.sleep_impl(sleep);
        }
        SharedHttpConnector::new(
            builder
                .tls_provider(tls::Provider::Rustls(tls::rustls_provider::CryptoMode::AwsLc))
                .build(),
        )
    })
}

#[async_trait]
impl ObjectClient for SdkClient {
    async fn put_object(&self, request: PutObject) -> Result<(), ClientError> {
        let mut call = self
            .client()
            .await
            .put_object()
            .bucket(&request.bucket)
            .key(&request.key)
            .content_type(&request.content_type)
            .acl(ObjectCannedAcl::from(request.acl.as_acl()))
            .body(ByteStream::from(request.body));

        if let Some(value) = &request.cache_control {
            call = call.cache_control(value);
        }
        if let Some(value) = &request.content_disposition {
            call = call.content_disposition(value);
        }
        if let Some(value) = &request.content_encoding {
            call = call.content_encoding(value);
        }
        if let Some(value) = &request.content_language {
            call = call.content_language(value);
        }
        if let Some(value) = &request.expires {
            match DateTime::from_str(value, DateTimeFormat::HttpDate) {
                Ok(expires) => call = call.expires(expires),
                Err(e) => warn!(value = %value, error = %e, "ignoring unparseable Expires header"),
            }
        }
        if let Some(class) = &request.storage_class {
            call = call.storage_class(StorageClass::from(class.to_ascii_uppercase().as_str()));
        }
        for (key, value) in &request.metadata {
            call = call.metadata(key, value);
        }

        call.send().await.map(|_| ()).map_err(classify)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), ClientError> {
        self.client()
            .await
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map(|_| ())
            .map_err(classify)
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<bool, ClientError> {
        match self.client().await.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(classify(err)),
        }
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), ClientError> {
        let region = self.settings.region.as_str();
        let mut call = self.client().await.create_bucket().bucket(bucket);
        if region != "us-east-1" {
            call = call.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }
        call.send().await.map(|_| ()).map_err(classify)
    }

    async fn put_object_acl(
        &self,
        bucket: &str,
        key: &str,
        acl: Permission,
    ) -> Result<(), ClientError> {
        self.client()
            .await
            .put_object_acl()
            .bucket(bucket)
            .key(key)
            .acl(ObjectCannedAcl::from(acl.as_acl()))
            .send()
            .await
            .map(|_| ())
            .map_err(classify)
    }

    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, ClientError> {
        let config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| ClientError::Service(e.to_string()))?;
        let request = self
            .presigner()
            .await
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(classify)?;
        Ok(request.uri().to_string())
    }
}

fn classify<E, R>(err: SdkError<E, R>) -> ClientError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: fmt::Debug,
{
    match err.code() {
        Some("NoSuchBucket") => ClientError::NoSuchBucket,
        Some("NoSuchKey" | "NotFound") => ClientError::NotFound,
        code => {
            let message = DisplayErrorContext(&err).to_string();
            debug!(code = ?code, error = %message, "object storage call failed");
            ClientError::Service(message)
        }
    }
}
