//! Credential loading errors.

use std::path::PathBuf;

use thiserror::Error;

/// Raised when a credential source cannot be read or parsed.
///
/// A missing stage entry is never an error.
#[derive(Debug, Error)]
pub enum CredentialsError {
    /// Credentials file unreadable.
    #[error("cannot read credentials file {}: {source}", path.display())]
    Read {
        /// File location.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Credentials file is not valid YAML.
    #[error("cannot parse credentials file {}: {message}", path.display())]
    Parse {
        /// File location.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// Credentials file parsed to something other than a mapping.
    #[error("credentials file {} does not contain a mapping", path.display())]
    NotAMapping {
        /// File location.
        path: PathBuf,
    },
}

impl CredentialsError {
    /// Create a read error.
    #[must_use]
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    /// Create a parse error.
    #[must_use]
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }
}
