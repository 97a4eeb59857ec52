//! Storage error types.

use thiserror::Error;

use crate::credentials::CredentialsError;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend name not recognized.
    #[error("cannot load storage backend '{name}'")]
    UnknownStorageBackend {
        /// The configured backend name.
        name: String,
    },

    /// A required option could not be resolved.
    #[error("missing required option: {option}")]
    MissingRequiredOption {
        /// Option name.
        option: String,
    },

    /// Credentials could not be loaded.
    #[error(transparent)]
    Credentials(#[from] CredentialsError),

    /// Write failed.
    #[error("failed to write '{key}': {message}")]
    BackendWrite {
        /// Storage key.
        key: String,
        /// Backend message.
        message: String,
        /// Whether the write already went through the bucket-creation retry.
        retried: bool,
    },

    /// Delete failed for a reason other than the target being absent.
    #[error("failed to delete '{key}': {message}")]
    BackendDelete {
        /// Storage key.
        key: String,
        /// Backend message.
        message: String,
    },

    /// Presign operation not supported by provider.
    #[error("presign operation not supported by storage provider")]
    PresignNotSupported,

    /// Local I/O error.
    #[error("i/o error on '{path}': {source}")]
    Io {
        /// Path being accessed.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Storage provider configuration error.
    #[error("storage configuration error: {0}")]
    Configuration(String),

    /// OpenDAL operation error.
    #[error("storage operation failed: {0}")]
    Operation(String),
}

impl StorageError {
    /// Create an unknown backend error.
    #[must_use]
    pub fn unknown_backend(name: impl Into<String>) -> Self {
        Self::UnknownStorageBackend { name: name.into() }
    }

    /// Create a missing option error.
    #[must_use]
    pub fn missing_option(option: impl Into<String>) -> Self {
        Self::MissingRequiredOption {
            option: option.into(),
        }
    }

    /// Create a write error.
    #[must_use]
    pub fn write(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendWrite {
            key: key.into(),
            message: message.into(),
            retried: false,
        }
    }

    /// Create a write error raised after the bucket-creation retry.
    #[must_use]
    pub fn write_after_retry(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendWrite {
            key: key.into(),
            message: message.into(),
            retried: true,
        }
    }

    /// Create a delete error.
    #[must_use]
    pub fn delete(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendDelete {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error.
    #[must_use]
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an operation error.
    #[must_use]
    pub fn operation(msg: impl Into<String>) -> Self {
        Self::Operation(msg.into())
    }

    /// Whether the queued write that raised this error must not be retried.
    #[must_use]
    pub fn consumes_entry(&self) -> bool {
        matches!(self, Self::BackendWrite { retried: true, .. })
    }
}

impl From<opendal::Error> for StorageError {
    fn from(err: opendal::Error) -> Self {
        match err.kind() {
            opendal::ErrorKind::Unsupported => Self::PresignNotSupported,
            opendal::ErrorKind::ConfigInvalid => Self::Configuration(err.to_string()),
            _ => Self::Operation(err.to_string()),
        }
    }
}
