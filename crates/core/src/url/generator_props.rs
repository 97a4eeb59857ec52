//! Property-based tests for URL generation.
//!
//! - Attachments without a file always get the default URL
//! - Escaping is idempotent
//! - Escaped URLs contain no spaces

use std::sync::Arc;

use proptest::prelude::*;

use super::generator::{UrlGenerator, UrlOptions, escape_url};
use crate::attachment::{Attachment, AttachmentOptions, RecordRef};

proptest! {
    #[test]
    fn prop_missing_file_never_uses_real_pattern(
        timestamp in proptest::option::of(any::<bool>()),
        escape in proptest::option::of(any::<bool>()),
        style in "[a-z]{1,8}",
    ) {
        let options = AttachmentOptions::default()
            .with_url("/real/:style")
            .with_default_url("/fallback/:style.png");
        let generator = UrlGenerator::new(Arc::new(options), "/backend/:style");
        let attachment = Attachment::new("avatar", RecordRef::new("Dummy"));

        let url = generator.url_for(&attachment, &style, UrlOptions { timestamp, escape });

        prop_assert_eq!(url, format!("/fallback/{style}.png"));
    }

    #[test]
    fn prop_escape_idempotent(input in "\\PC{0,40}") {
        let once = escape_url(&input);
        prop_assert_eq!(escape_url(&once), once);
    }

    #[test]
    fn prop_escaped_has_no_spaces(input in "[a-z %/?&=]{0,40}") {
        prop_assert!(!escape_url(&input).contains(' '));
    }
}
