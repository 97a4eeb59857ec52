//! Attachment types and data structures.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the style holding the unprocessed upload.
pub const ORIGINAL_STYLE: &str = "original";

/// Description of a derived style.
///
/// The geometry is opaque to the storage core; only `format` matters here
/// because it changes the extension a style is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StyleDescriptor {
    /// Transform geometry (e.g. `"80x80>"`).
    pub geometry: String,
    /// Target file format (e.g. `"jpg"`), if the style converts.
    pub format: Option<String>,
}

impl StyleDescriptor {
    /// Create a style that keeps the original format.
    #[must_use]
    pub fn new(geometry: impl Into<String>) -> Self {
        Self {
            geometry: geometry.into(),
            format: None,
        }
    }

    /// Set the target format.
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

/// The host record an attachment belongs to.
///
/// Only the attributes the storage core reads are carried: the record's type
/// name, its id, and any named attributes a default URL may refer to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordRef {
    /// Type name of the record (e.g. `"Dummy"`, `"Admin::User"`).
    pub class_name: String,
    /// Record id, if persisted.
    pub id: Option<String>,
    /// Named record attributes.
    pub attributes: BTreeMap<String, String>,
}

impl RecordRef {
    /// Create a record reference with the given type name.
    #[must_use]
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            id: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Set the record id.
    #[must_use]
    pub fn with_id(mut self, id: impl ToString) -> Self {
        self.id = Some(id.to_string());
        self
    }

    /// Add a named attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Look up a named attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// A logical file slot on a host record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Attachment name on the record (e.g. `"avatar"`).
    pub name: String,
    /// Owning record.
    pub record: RecordRef,
    /// Name of the assigned file. `None` means no file is assigned.
    pub original_filename: Option<String>,
    /// MIME type of the assigned file.
    pub content_type: Option<String>,
    /// Size of the assigned file in bytes.
    pub file_size: Option<u64>,
    /// Content fingerprint supplied by the host.
    pub fingerprint: Option<String>,
    /// Last assignment time, used for cache busting.
    pub updated_at: Option<DateTime<Utc>>,
    /// Derived styles in declaration order.
    pub styles: Vec<(String, StyleDescriptor)>,
}

impl Attachment {
    /// Create an empty attachment slot.
    #[must_use]
    pub fn new(name: impl Into<String>, record: RecordRef) -> Self {
        Self {
            name: name.into(),
            record,
            original_filename: None,
            content_type: None,
            file_size: None,
            fingerprint: None,
            updated_at: None,
            styles: Vec::new(),
        }
    }

    /// Declare a style, replacing an existing style of the same name in place.
    #[must_use]
    pub fn with_style(mut self, name: impl Into<String>, descriptor: StyleDescriptor) -> Self {
        let name = name.into();
        match self.styles.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = descriptor,
            None => self.styles.push((name, descriptor)),
        }
        self
    }

    /// Set the assigned file name.
    #[must_use]
    pub fn with_file(mut self, filename: impl Into<String>) -> Self {
        self.original_filename = Some(filename.into());
        self
    }

    /// Set the last assignment time.
    #[must_use]
    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    /// Record a newly assigned file.
    pub fn assign(
        &mut self,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        file_size: u64,
        updated_at: DateTime<Utc>,
    ) {
        self.original_filename = Some(filename.into());
        self.content_type = Some(content_type.into());
        self.file_size = Some(file_size);
        self.updated_at = Some(updated_at);
    }

    /// Forget the assigned file.
    pub fn unassign(&mut self) {
        self.original_filename = None;
        self.content_type = None;
        self.file_size = None;
        self.fingerprint = None;
        self.updated_at = None;
    }

    /// Whether a file is currently assigned.
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.original_filename.is_some()
    }

    /// Look up a style descriptor.
    #[must_use]
    pub fn style(&self, name: &str) -> Option<&StyleDescriptor> {
        self.styles
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, descriptor)| descriptor)
    }

    /// Names of the declared styles, in order.
    pub fn style_names(&self) -> impl Iterator<Item = &str> {
        self.styles.iter().map(|(name, _)| name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_style_replaces_in_place() {
        let attachment = Attachment::new("avatar", RecordRef::new("Dummy"))
            .with_style("thumb", StyleDescriptor::new("80x80>"))
            .with_style("large", StyleDescriptor::new("500x500#"))
            .with_style("thumb", StyleDescriptor::new("100x100>"));

        let names: Vec<_> = attachment.style_names().collect();
        assert_eq!(names, vec!["thumb", "large"]);
        assert_eq!(
            attachment.style("thumb").map(|s| s.geometry.as_str()),
            Some("100x100>")
        );
    }

    #[test]
    fn test_assign_and_unassign() {
        let mut attachment = Attachment::new("avatar", RecordRef::new("Dummy"));
        assert!(!attachment.is_present());

        attachment.assign("5k.png", "image/png", 5_120, Utc::now());
        assert!(attachment.is_present());
        assert_eq!(attachment.file_size, Some(5_120));

        attachment.unassign();
        assert!(!attachment.is_present());
        assert!(attachment.updated_at.is_none());
    }

    #[test]
    fn test_record_attribute_lookup() {
        let record = RecordRef::new("User")
            .with_id(42)
            .with_attribute("avatar_fallback", "/images/none.png");
        assert_eq!(record.id.as_deref(), Some("42"));
        assert_eq!(record.attribute("avatar_fallback"), Some("/images/none.png"));
        assert_eq!(record.attribute("missing"), None);
    }
}
