//! Attachment storage core for Clipvault.
//!
//! This crate turns an attachment (a file slot on a host record) into storage
//! keys and URLs, and commits queued writes and deletes to a storage backend.
//! It has no web or database dependencies.
//!
//! # Modules
//!
//! - `attachment` - Attachment model and declaration options
//! - `interpolation` - `:token` pattern expansion for paths and URLs
//! - `credentials` - Stage-aware credential loading
//! - `url` - Public URL generation and escaping
//! - `storage` - Backend strategies: filesystem, S3 and cloud
//! - `vault` - Write/delete queues and commits

pub mod attachment;
pub mod credentials;
pub mod interpolation;
pub mod storage;
pub mod url;
pub mod vault;

pub use attachment::{Attachment, AttachmentOptions, RecordRef, StyleDescriptor};
pub use storage::{BackendStrategy, StorageError};
pub use url::{UrlGenerator, UrlOptions};
pub use vault::{QueuedFile, Vault};
