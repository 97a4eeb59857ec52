//! Storage vault.
//!
//! A [`Vault`] owns the write and delete queues of one attachment and
//! commits them through its [`BackendStrategy`](crate::storage::BackendStrategy):
//!
//! ```text
//! assign(file) ──► clear old styles ──► queued_for_delete
//!              └─► store("original") ─► queued_for_write
//! save()       ──► flush deletes ──► flush writes
//! ```

mod service;
mod upload;

pub use service::Vault;
pub use upload::{FileSource, QueuedFile};
