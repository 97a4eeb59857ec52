//! Attachment model and configuration.
//!
//! An attachment is a file slot on a host record: an original file plus any
//! number of named derived styles. This module holds what the storage core
//! reads from the host and the options an attachment is declared with.

mod options;
mod types;

pub use options::{AttachmentOptions, Deferred, DefaultUrl};
pub use types::{Attachment, ORIGINAL_STYLE, RecordRef, StyleDescriptor};
