//! Application configuration management.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Deployment stage used to pick credential sets.
    #[serde(default = "default_stage")]
    pub stage: String,
    /// Attachment storage defaults.
    #[serde(default)]
    pub storage: StorageSettings,
}

fn default_stage() -> String {
    "development".to_string()
}

/// Deployment-wide attachment defaults.
///
/// Every attachment starts from these and may override any of them.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Backend name.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Storage path pattern.
    pub path: Option<String>,
    /// URL pattern.
    pub url: Option<String>,
    /// URL pattern for attachments without a file.
    pub default_url: Option<String>,
    /// Style used when none is given.
    #[serde(default = "default_style")]
    pub default_style: String,
    /// Append `updated_at` to URLs.
    #[serde(default = "default_true")]
    pub use_timestamp: bool,
    /// Never delete replaced files.
    #[serde(default)]
    pub keep_old_files: bool,
    /// Value of the `:root` token.
    #[serde(default = "default_root")]
    pub root: String,
    /// Secret for the `:hash` token.
    pub hash_secret: Option<String>,
    /// Pattern hashed by the `:hash` token.
    pub hash_data: Option<String>,
    /// Object storage section.
    pub s3: Option<S3Settings>,
    /// Cloud storage section.
    pub cloud: Option<CloudSettings>,
}

fn default_backend() -> String {
    "filesystem".to_string()
}

fn default_style() -> String {
    "original".to_string()
}

fn default_true() -> bool {
    true
}

fn default_root() -> String {
    ".".to_string()
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: None,
            url: None,
            default_url: None,
            default_style: default_style(),
            use_timestamp: true,
            keep_old_files: false,
            root: default_root(),
            hash_secret: None,
            hash_data: None,
            s3: None,
            cloud: None,
        }
    }
}

/// Object storage settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct S3Settings {
    /// Bucket name. Falls back to `bucket` in the credentials.
    pub bucket: Option<String>,
    /// Credentials file (YAML, optionally stage-scoped).
    pub credentials_file: Option<PathBuf>,
    /// Inline credentials, optionally keyed by stage.
    #[serde(default)]
    pub credentials: Map<String, Value>,
    /// Canned ACL applied to every style.
    pub permissions: Option<String>,
    /// Extra headers sent with every write.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Object metadata sent with every write.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Storage class.
    pub storage_class: Option<String>,
    /// CNAME serving the bucket.
    pub host_alias: Option<String>,
    /// Service domain (e.g. `s3-ap-northeast-1.amazonaws.com`).
    pub host_name: Option<String>,
    /// Public base URL in front of the bucket.
    pub public_host: Option<String>,
    /// URL protocol.
    pub protocol: Option<String>,
    /// Region.
    pub region: Option<String>,
    /// API endpoint override.
    pub endpoint_url: Option<String>,
    /// Proxy for every request to the object store.
    pub http_proxy: Option<HttpProxySettings>,
}

/// HTTP proxy in front of the object store.
#[derive(Clone, Default, Deserialize)]
pub struct HttpProxySettings {
    /// Proxy host, with or without a scheme.
    pub host: String,
    /// Proxy port.
    pub port: Option<u16>,
    /// Basic auth user.
    pub user: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
}

impl std::fmt::Debug for HttpProxySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProxySettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Cloud storage settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloudSettings {
    /// Provider name (`aws`, `azure`, `local`, `memory`).
    pub provider: Option<String>,
    /// Bucket or container.
    pub directory: Option<String>,
    /// Public host, `%d` is replaced by a shard number.
    pub host: Option<String>,
    /// Credentials file (YAML, optionally stage-scoped).
    pub credentials_file: Option<PathBuf>,
    /// Inline credentials, optionally keyed by stage.
    #[serde(default)]
    pub credentials: Map<String, Value>,
    /// `Cache-Control` sent with every write.
    pub cache_control: Option<String>,
    /// `Content-Disposition` sent with every write.
    pub content_disposition: Option<String>,
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| default_stage());

        let config = config::Config::builder()
            .set_default("stage", run_mode.clone())?
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("CLIPVAULT").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
