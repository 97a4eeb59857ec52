//! User-facing URLs.
//!
//! Chooses between the real URL pattern and the default URL, appends the
//! `updated_at` cache buster and escapes unsafe characters.

mod generator;

#[cfg(test)]
mod generator_props;

pub use generator::{UrlGenerator, UrlOptions, escape_url};
