//! Property-based tests for the interpolator.
//!
//! - Patterns without a colon come back unchanged
//! - Expansion is deterministic
//! - `:style` always expands to the requested style

use proptest::prelude::*;

use super::interpolator::Interpolator;
use crate::attachment::{Attachment, AttachmentOptions, RecordRef};

fn style_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,11}"
}

fn attachment(filename: &str) -> Attachment {
    Attachment::new("avatar", RecordRef::new("Dummy").with_id(42)).with_file(filename)
}

proptest! {
    #[test]
    fn prop_colon_free_patterns_unchanged(pattern in "[^:]{0,64}") {
        let interpolator = Interpolator::new(&AttachmentOptions::default());
        let out = interpolator.interpolate(&pattern, &attachment("a.png"), "original");
        prop_assert_eq!(out, pattern);
    }

    #[test]
    fn prop_deterministic(
        pattern in "[a-z:/._]{0,48}",
        style in style_name(),
        filename in "[a-z0-9]{1,10}\\.[a-z]{2,4}",
    ) {
        let interpolator = Interpolator::new(
            &AttachmentOptions::default().with_hash_secret("secret"),
        );
        let attachment = attachment(&filename);
        let first = interpolator.interpolate(&pattern, &attachment, &style);
        let second = interpolator.interpolate(&pattern, &attachment, &style);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_style_token_expands_to_style(style in style_name()) {
        let interpolator = Interpolator::new(&AttachmentOptions::default());
        let out = interpolator.interpolate("/:style/", &attachment("a.png"), &style);
        prop_assert_eq!(out, format!("/{style}/"));
    }

    #[test]
    fn prop_filename_keeps_original_name(
        base in "[a-z0-9]{1,12}",
        ext in "[a-z]{2,4}",
    ) {
        let interpolator = Interpolator::new(&AttachmentOptions::default());
        let filename = format!("{base}.{ext}");
        let out = interpolator.interpolate(":filename", &attachment(&filename), "original");
        prop_assert_eq!(out, filename);
    }
}
