//! Token expansion for path and URL patterns.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::inflect::{pluralize, underscore};
use crate::attachment::{Attachment, AttachmentOptions};

type HmacSha256 = Hmac<Sha256>;

/// Additional tokens offered on top of the built-in vocabulary.
///
/// Backends use this for URL tokens such as `:s3_domain_url`.
pub trait TokenSource {
    /// Value for `token` (without the leading colon), or `None` if unknown.
    fn token(&self, token: &str, attachment: &Attachment, style: &str) -> Option<String>;
}

impl<F> TokenSource for F
where
    F: Fn(&str, &Attachment, &str) -> Option<String>,
{
    fn token(&self, token: &str, attachment: &Attachment, style: &str) -> Option<String> {
        self(token, attachment, style)
    }
}

struct NoTokens;

impl TokenSource for NoTokens {
    fn token(&self, _: &str, _: &Attachment, _: &str) -> Option<String> {
        None
    }
}

/// Expands `:token` patterns against an attachment.
///
/// Recognized tokens: `:root`, `:stage`, `:class`, `:attachment`, `:style`,
/// `:id`, `:id_partition`, `:basename`, `:extension`, `:filename`, `:hash`,
/// `:updated_at`, `:timestamp` and `:fingerprint`. The longest matching token
/// wins, so `:id_partition` is never read as `:id` followed by `_partition`.
/// Unknown tokens are left as written. Substituted values are not rescanned.
#[derive(Debug, Clone)]
pub struct Interpolator {
    root: String,
    stage: String,
    hash_secret: Option<String>,
    hash_data: String,
}

impl Interpolator {
    /// Interpolator for one attachment configuration.
    #[must_use]
    pub fn new(options: &AttachmentOptions) -> Self {
        Self {
            root: options.root.clone(),
            stage: options.stage.clone(),
            hash_secret: options.hash_secret.clone(),
            hash_data: options.hash_data.clone(),
        }
    }

    /// Expand `pattern` for `style`.
    #[must_use]
    pub fn interpolate(&self, pattern: &str, attachment: &Attachment, style: &str) -> String {
        self.interpolate_with(pattern, attachment, style, &NoTokens)
    }

    /// Expand `pattern`, consulting `extra` for tokens outside the built-in set.
    #[must_use]
    pub fn interpolate_with(
        &self,
        pattern: &str,
        attachment: &Attachment,
        style: &str,
        extra: &dyn TokenSource,
    ) -> String {
        self.expand(pattern, attachment, style, extra, true)
    }

    fn expand(
        &self,
        pattern: &str,
        attachment: &Attachment,
        style: &str,
        extra: &dyn TokenSource,
        allow_hash: bool,
    ) -> String {
        let mut out = String::with_capacity(pattern.len() * 2);
        let mut rest = pattern;

        while let Some(pos) = rest.find(':') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];
            let ident_len = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());

            let matched = (1..=ident_len).rev().find_map(|len| {
                let token = &after[..len];
                let value = self
                    .builtin(token, attachment, style, allow_hash)
                    .or_else(|| extra.token(token, attachment, style))?;
                Some((len, value))
            });

            match matched {
                Some((len, value)) => {
                    out.push_str(&value);
                    rest = &after[len..];
                }
                None => {
                    out.push(':');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }

    fn builtin(
        &self,
        token: &str,
        attachment: &Attachment,
        style: &str,
        allow_hash: bool,
    ) -> Option<String> {
        let value = match token {
            "root" => self.root.clone(),
            "stage" => self.stage.clone(),
            "class" => pluralize(&underscore(&attachment.record.class_name)),
            "attachment" => pluralize(&underscore(&attachment.name)),
            "style" => style.to_string(),
            "id" => attachment.record.id.clone().unwrap_or_default(),
            "id_partition" => id_partition(attachment.record.id.as_deref().unwrap_or_default()),
            "basename" => basename(attachment),
            "extension" => extension(attachment, style),
            "filename" => {
                let base = basename(attachment);
                match extension(attachment, style) {
                    ext if ext.is_empty() => base,
                    ext => format!("{base}.{ext}"),
                }
            }
            "hash" if allow_hash => self.hash(attachment, style)?,
            "updated_at" => attachment
                .updated_at
                .map(|t| t.timestamp().to_string())
                .unwrap_or_default(),
            "timestamp" => attachment
                .updated_at
                .map(|t| t.to_string())
                .unwrap_or_default(),
            "fingerprint" => attachment.fingerprint.clone().unwrap_or_default(),
            _ => return None,
        };
        Some(value)
    }

    /// HMAC-SHA256 of the interpolated hash data, hex encoded.
    fn hash(&self, attachment: &Attachment, style: &str) -> Option<String> {
        let secret = self.hash_secret.as_deref()?;
        let data = self.expand(&self.hash_data, attachment, style, &NoTokens, false);

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
        mac.update(data.as_bytes());
        Some(hex::encode(mac.finalize().into_bytes()))
    }
}

fn split_filename(attachment: &Attachment) -> (&str, &str) {
    let name = attachment.original_filename.as_deref().unwrap_or_default();
    let name = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(dot) => (&name[..dot], &name[dot + 1..]),
    }
}

fn basename(attachment: &Attachment) -> String {
    split_filename(attachment).0.to_string()
}

/// The style's target format if it has one, else the original extension.
fn extension(attachment: &Attachment, style: &str) -> String {
    attachment
        .style(style)
        .and_then(|s| s.format.clone())
        .unwrap_or_else(|| split_filename(attachment).1.to_string())
}

/// `12345` becomes `000/012/345`; other ids are cut into 3-char segments.
fn id_partition(id: &str) -> String {
    if id.is_empty() {
        return String::new();
    }
    let digits = if id.bytes().all(|b| b.is_ascii_digit()) {
        format!("{id:0>9}")
    } else {
        id.chars().take(9).collect()
    };
    digits
        .chars()
        .collect::<Vec<_>>()
        .chunks(3)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("/")
}
