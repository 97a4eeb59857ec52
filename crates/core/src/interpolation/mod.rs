//! Pattern interpolation.
//!
//! Every path, key and URL is produced by expanding a pattern such as
//! `:attachment/:style/:filename` against an attachment and a style name.
//! Expansion is pure: the same inputs always yield the same string, and the
//! result is never escaped.

mod inflect;
mod interpolator;

#[cfg(test)]
mod interpolator_props;

pub use interpolator::{Interpolator, TokenSource};
