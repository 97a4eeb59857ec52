//! Storage backends for attachments.
//!
//! One [`BackendStrategy`] per storage medium, selected by name when a vault
//! is built:
//! - `filesystem`: local disk
//! - `s3`: S3-compatible object storage through the AWS SDK
//! - `cloud`: AWS, Azure Blob, local or in-memory storage through Apache OpenDAL

mod backend;
mod cloud;
mod config;
mod error;
mod filesystem;
pub mod s3;

pub use backend::{BackendStrategy, build_backend};
pub use cloud::CloudBackend;
pub use config::{
    BackendKind, CloudOptions, CloudProvider, HttpProxy, Permission, Permissions, S3Options,
};
pub use error::StorageError;
pub use filesystem::FilesystemBackend;
pub use s3::S3Backend;
