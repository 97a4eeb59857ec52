//! Shared configuration for Clipvault.
//!
//! This crate provides the deployment settings every other crate starts from:
//! - The active deployment stage
//! - Attachment storage defaults (backend, patterns, object and cloud storage)

pub mod config;

pub use config::{AppConfig, CloudSettings, HttpProxySettings, S3Settings, StorageSettings};
