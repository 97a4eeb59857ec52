//! Credential resolution.
//!
//! Backends take their connection parameters from a credential source: an
//! inline mapping or a YAML file. Either may be keyed by deployment stage, in
//! which case the entry for the active stage is selected and merged over the
//! top-level defaults.

mod error;
mod resolver;

pub use error::CredentialsError;
pub use resolver::{CredentialMap, CredentialResolver, Credentials, CredentialsSource};
