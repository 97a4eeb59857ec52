//! URL generation for attachment styles.

use std::sync::Arc;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use tracing::debug;

use crate::attachment::{Attachment, AttachmentOptions};
use crate::interpolation::{Interpolator, TokenSource};

/// Characters escaped in generated URLs. Reserved URL characters are kept.
const URL_UNSAFE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'\\')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Per-call URL options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UrlOptions {
    /// Append `updated_at`; `None` uses the attachment's `use_timestamp`.
    pub timestamp: Option<bool>,
    /// Percent-encode unsafe characters; `None` means `true`.
    pub escape: Option<bool>,
}

impl UrlOptions {
    /// Force the timestamp on or off.
    #[must_use]
    pub fn timestamp(mut self, timestamp: bool) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Force escaping on or off.
    #[must_use]
    pub fn escape(mut self, escape: bool) -> Self {
        self.escape = Some(escape);
        self
    }
}

/// Builds user-facing URLs.
#[derive(Debug, Clone)]
pub struct UrlGenerator {
    options: Arc<AttachmentOptions>,
    interpolator: Interpolator,
    backend_default: String,
}

impl UrlGenerator {
    /// Generator using `backend_default` when no URL pattern is configured.
    #[must_use]
    pub fn new(options: Arc<AttachmentOptions>, backend_default: impl Into<String>) -> Self {
        let interpolator = Interpolator::new(&options);
        Self {
            options,
            interpolator,
            backend_default: backend_default.into(),
        }
    }

    /// URL for `style`. Never fails; attachments without a file get the
    /// default URL.
    #[must_use]
    pub fn url_for(&self, attachment: &Attachment, style: &str, options: UrlOptions) -> String {
        let no_tokens = |_: &str, _: &Attachment, _: &str| -> Option<String> { None };
        self.url_for_with(attachment, style, options, &no_tokens)
    }

    /// Like [`url_for`](Self::url_for), with extra interpolation tokens.
    #[must_use]
    pub fn url_for_with(
        &self,
        attachment: &Attachment,
        style: &str,
        options: UrlOptions,
        tokens: &dyn TokenSource,
    ) -> String {
        let pattern = self.pattern(attachment);
        let mut url = self
            .interpolator
            .interpolate_with(&pattern, attachment, style, tokens);

        if options.timestamp.unwrap_or(self.options.use_timestamp) {
            url = append_timestamp(url, attachment);
        }
        if options.escape.unwrap_or(true) {
            url = escape_url(&url);
        }
        url
    }

    fn pattern(&self, attachment: &Attachment) -> String {
        if !attachment.is_present() {
            debug!(attachment = %attachment.name, "no file assigned, using default url");
            return self.options.default_url.resolve(attachment);
        }
        self.options.url.as_ref().map_or_else(
            || self.backend_default.clone(),
            |url| url.resolve(attachment),
        )
    }
}

fn append_timestamp(url: String, attachment: &Attachment) -> String {
    match attachment.updated_at {
        Some(updated_at) => {
            let delimiter = if url.contains('?') { '&' } else { '?' };
            format!("{url}{delimiter}{}", updated_at.timestamp())
        }
        None => url,
    }
}

/// Percent-encode unsafe characters without touching existing escapes.
///
/// A `%` followed by two hex digits is kept; a bare `%` becomes `%25`.
#[must_use]
pub fn escape_url(url: &str) -> String {
    let mut pieces = url.split('%');
    let mut out: String = pieces
        .next()
        .map(|first| utf8_percent_encode(first, URL_UNSAFE).to_string())
        .unwrap_or_default();

    for piece in pieces {
        let escaped = piece.len() >= 2 && piece.as_bytes()[..2].iter().all(u8::is_ascii_hexdigit);
        out.push_str(if escaped { "%" } else { "%25" });
        out.extend(utf8_percent_encode(piece, URL_UNSAFE));
    }
    out
}
