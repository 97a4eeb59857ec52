//! Mapping of configured HTTP headers onto native write fields.

use std::collections::BTreeMap;

use tracing::warn;

use super::client::PutObject;

const META_PREFIX: &str = "x-amz-meta-";

/// Write fields derived from `headers`, `metadata` and `storage_class`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteHeaders {
    /// `Cache-Control`.
    pub cache_control: Option<String>,
    /// `Content-Disposition`.
    pub content_disposition: Option<String>,
    /// `Content-Encoding`.
    pub content_encoding: Option<String>,
    /// `Content-Language`.
    pub content_language: Option<String>,
    /// `Content-Type` override.
    pub content_type: Option<String>,
    /// `Expires`.
    pub expires: Option<String>,
    /// User metadata.
    pub metadata: BTreeMap<String, String>,
    /// Storage class.
    pub storage_class: Option<String>,
}

impl WriteHeaders {
    /// Normalize configured headers.
    ///
    /// `x-amz-meta-*` headers become metadata, with the `metadata` option
    /// taking precedence on collisions. An explicit `storage_class` wins over
    /// an `x-amz-storage-class` header. Unrecognized headers are logged and
    /// dropped.
    #[must_use]
    pub fn normalize(
        headers: &BTreeMap<String, String>,
        metadata: &BTreeMap<String, String>,
        storage_class: Option<&str>,
    ) -> Self {
        let mut out = Self::default();

        for (name, value) in headers {
            let lower = name.to_ascii_lowercase();
            let slot = match lower.as_str() {
                "cache-control" => &mut out.cache_control,
                "content-disposition" => &mut out.content_disposition,
                "content-encoding" => &mut out.content_encoding,
                "content-language" => &mut out.content_language,
                "content-type" => &mut out.content_type,
                "expires" => &mut out.expires,
                "x-amz-storage-class" => &mut out.storage_class,
                _ => {
                    if let Some(meta) = lower.strip_prefix(META_PREFIX) {
                        out.metadata.insert(meta.to_string(), value.clone());
                    } else {
                        warn!(header = %name, "unsupported header, ignoring");
                    }
                    continue;
                }
            };
            *slot = Some(value.clone());
        }

        out.metadata
            .extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        if let Some(class) = storage_class {
            out.storage_class = Some(class.to_string());
        }
        out
    }

    /// Copy the fields onto a write request.
    pub fn apply(&self, request: &mut PutObject) {
        if let Some(content_type) = &self.content_type {
            request.content_type.clone_from(content_type);
        }
        request.cache_control.clone_from(&self.cache_control);
        request.content_disposition.clone_from(&self.content_disposition);
        request.content_encoding.clone_from(&self.content_encoding);
        request.content_language.clone_from(&self.content_language);
        request.expires.clone_from(&self.expires);
        request.metadata.clone_from(&self.metadata);
        request.storage_class.clone_from(&self.storage_class);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_native_fields_case_insensitive() {
        let headers = map(&[
            ("Cache-Control", "max-age=3600"),
            ("content-disposition", "attachment"),
            ("Content-Type", "image/webp"),
        ]);

        let out = WriteHeaders::normalize(&headers, &BTreeMap::new(), None);

        assert_eq!(out.cache_control.as_deref(), Some("max-age=3600"));
        assert_eq!(out.content_disposition.as_deref(), Some("attachment"));
        assert_eq!(out.content_type.as_deref(), Some("image/webp"));
    }

    #[test]
    fn test_meta_headers_and_metadata_option() {
        let headers = map(&[("x-amz-meta-owner", "header"), ("X-Amz-Meta-Color", "red")]);
        let metadata = map(&[("owner", "option")]);

        let out = WriteHeaders::normalize(&headers, &metadata, None);

        assert_eq!(out.metadata, map(&[("color", "red"), ("owner", "option")]));
    }

    #[test]
    fn test_storage_class_option_wins_over_header() {
        let headers = map(&[("x-amz-storage-class", "STANDARD_IA")]);

        let header_only = WriteHeaders::normalize(&headers, &BTreeMap::new(), None);
        let both = WriteHeaders::normalize(&headers, &BTreeMap::new(), Some("REDUCED_REDUNDANCY"));

        assert_eq!(header_only.storage_class.as_deref(), Some("STANDARD_IA"));
        assert_eq!(both.storage_class.as_deref(), Some("REDUCED_REDUNDANCY"));
    }

    #[test]
    fn test_unknown_headers_dropped() {
        let out = WriteHeaders::normalize(&map(&[("X-Custom", "1")]), &BTreeMap::new(), None);
        assert_eq!(out, WriteHeaders::default());
    }
}
