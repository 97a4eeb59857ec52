//! Stage-aware credential resolver.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::error::CredentialsError;

/// Raw credential mapping.
pub type CredentialMap = serde_json::Map<String, Value>;

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Where credentials come from.
#[derive(Debug, Clone, PartialEq)]
pub enum CredentialsSource {
    /// Mapping given directly, flat or stage-keyed.
    Inline(CredentialMap),
    /// YAML file, flat or stage-keyed, with `${VAR}` placeholders.
    File(PathBuf),
}

impl Default for CredentialsSource {
    fn default() -> Self {
        Self::Inline(CredentialMap::new())
    }
}

impl From<CredentialMap> for CredentialsSource {
    fn from(map: CredentialMap) -> Self {
        Self::Inline(map)
    }
}

impl From<PathBuf> for CredentialsSource {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

/// Resolved flat credentials for one stage.
#[derive(Clone, Default, PartialEq)]
pub struct Credentials(CredentialMap);

impl Credentials {
    /// Look up a parameter, also trying the `:key` spelling.
    ///
    /// Scalars are rendered as strings; mappings and sequences are ignored.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        let value = self
            .0
            .get(key)
            .or_else(|| self.0.get(&format!(":{key}")))?;
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Whether no parameters are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the underlying mapping.
    #[must_use]
    pub fn as_map(&self) -> &CredentialMap {
        &self.0
    }
}

impl From<CredentialMap> for Credentials {
    fn from(map: CredentialMap) -> Self {
        Self(map)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

/// Resolves a [`CredentialsSource`] for a deployment stage.
#[derive(Clone)]
pub struct CredentialResolver {
    env: EnvLookup,
}

impl Default for CredentialResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialResolver").finish_non_exhaustive()
    }
}

impl CredentialResolver {
    /// Resolver reading placeholders from the process environment.
    #[must_use]
    pub fn new() -> Self {
        Self::with_env(|name| std::env::var(name).ok())
    }

    /// Resolver with a custom placeholder lookup.
    #[must_use]
    pub fn with_env(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            env: Arc::new(lookup),
        }
    }

    /// Resolve a source for `stage`.
    ///
    /// # Errors
    ///
    /// Returns an error if a credentials file cannot be read or parsed.
    pub fn resolve(
        &self,
        source: &CredentialsSource,
        stage: &str,
    ) -> Result<Credentials, CredentialsError> {
        let raw = match source {
            CredentialsSource::Inline(map) => map.clone(),
            CredentialsSource::File(path) => self.load_file(path)?,
        };
        Ok(Credentials(select_stage(raw, stage)))
    }

    fn load_file(&self, path: &Path) -> Result<CredentialMap, CredentialsError> {
        let text =
            std::fs::read_to_string(path).map_err(|e| CredentialsError::read(path, e))?;
        let text = substitute_env(&text, self.env.as_ref());

        let value: Value = serde_yaml::from_str(&text)
            .map_err(|e| CredentialsError::parse(path, e.to_string()))?;
        match value {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(CredentialMap::new()),
            _ => Err(CredentialsError::NotAMapping {
                path: path.to_path_buf(),
            }),
        }
    }
}

/// Pick the entry for `stage`, merged over top-level scalars.
///
/// Without a matching stage entry the mapping is returned unchanged.
fn select_stage(raw: CredentialMap, stage: &str) -> CredentialMap {
    let nested = raw
        .get(stage)
        .or_else(|| raw.get(&format!(":{stage}")))
        .and_then(Value::as_object)
        .cloned();

    let Some(nested) = nested else {
        debug!(stage, "no stage entry in credentials, using them as given");
        return raw;
    };

    let mut merged: CredentialMap = raw.into_iter().filter(|(_, v)| !v.is_object()).collect();
    merged.extend(nested);
    merged
}

/// Replace `${NAME}` placeholders. Unknown names become empty.
fn substitute_env(text: &str, lookup: &(dyn Fn(&str) -> Option<String> + Send + Sync)) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let name = &rest[start + 2..start + 2 + len];
        out.push_str(&lookup(name.trim()).unwrap_or_default());
        rest = &rest[start + 3 + len..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;

    use super::*;

    fn map(value: Value) -> CredentialMap {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_selects_stage_entry() {
        let raw = map(json!({
            "production": { "key": "12345" },
            "development": { "key": "54321" }
        }));

        let creds = CredentialResolver::new()
            .resolve(&CredentialsSource::Inline(raw), "production")
            .expect("resolve");

        assert_eq!(creds.as_map(), &map(json!({ "key": "12345" })));
    }

    #[test]
    fn test_no_stage_match_returns_input_unchanged() {
        let raw = map(json!({
            "production": { "key": "12345" },
            "development": { "key": "54321" }
        }));

        let creds = CredentialResolver::new()
            .resolve(&CredentialsSource::Inline(raw.clone()), "staging")
            .expect("resolve");

        assert_eq!(creds.as_map(), &raw);
    }

    #[test]
    fn test_flat_credentials_unchanged() {
        let raw = map(json!({ "bucket": "pics", "access_key_id": "id" }));
        let creds = CredentialResolver::new()
            .resolve(&raw.clone().into(), "production")
            .expect("resolve");
        assert_eq!(creds.as_map(), &raw);
    }

    #[test]
    fn test_stage_merges_over_top_level_defaults() {
        let raw = map(json!({
            "bucket": "shared",
            "region": "eu-west-1",
            ":production": { "bucket": "prod" },
            "development": { "bucket": "dev" }
        }));

        let creds = CredentialResolver::new()
            .resolve(&raw.into(), "production")
            .expect("resolve");

        assert_eq!(creds.get("bucket").as_deref(), Some("prod"));
        assert_eq!(creds.get("region").as_deref(), Some("eu-west-1"));
        assert!(creds.as_map().get("development").is_none());
    }

    #[test]
    fn test_get_accepts_symbol_keys_and_scalars() {
        let creds = Credentials::from(map(json!({ ":bucket": "b", "port": 9000, "ssl": true })));
        assert_eq!(creds.get("bucket").as_deref(), Some("b"));
        assert_eq!(creds.get("port").as_deref(), Some("9000"));
        assert_eq!(creds.get("ssl").as_deref(), Some("true"));
        assert_eq!(creds.get("missing"), None);
    }

    #[test]
    fn test_debug_hides_values() {
        let creds = Credentials::from(map(json!({ "secret_access_key": "hunter2" })));
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("secret_access_key"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_file_with_env_placeholders() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(
            file,
            "production:\n  bucket: ${{BUCKET}}\n  access_key_id: ${{MISSING_KEY}}\ndevelopment:\n  bucket: dev"
        )
        .expect("write");

        let resolver = CredentialResolver::with_env(|name| {
            (name == "BUCKET").then(|| "prod-bucket".to_string())
        });
        let creds = resolver
            .resolve(&file.path().to_path_buf().into(), "production")
            .expect("resolve");

        assert_eq!(creds.get("bucket").as_deref(), Some("prod-bucket"));
        assert_eq!(creds.get("access_key_id"), None);
    }

    #[test]
    fn test_file_placeholders_from_process_env() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "bucket: ${{CLIPVAULT_TEST_BUCKET}}").expect("write");
        let source = CredentialsSource::File(file.path().to_path_buf());

        temp_env::with_var("CLIPVAULT_TEST_BUCKET", Some("from-env"), || {
            let creds = CredentialResolver::new()
                .resolve(&source, "production")
                .expect("resolve");
            assert_eq!(creds.get("bucket").as_deref(), Some("from-env"));
        });
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = CredentialResolver::new()
            .resolve(
                &CredentialsSource::File(PathBuf::from("/nonexistent/creds.yml")),
                "production",
            )
            .unwrap_err();
        assert!(matches!(err, CredentialsError::Read { .. }));
    }

    #[test]
    fn test_unparseable_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "bucket: [unclosed").expect("write");

        let err = CredentialResolver::new()
            .resolve(&file.path().to_path_buf().into(), "production")
            .unwrap_err();
        assert!(matches!(err, CredentialsError::Parse { .. }));
    }

    #[test]
    fn test_scalar_file_is_not_a_mapping() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "just a string").expect("write");

        let err = CredentialResolver::new()
            .resolve(&file.path().to_path_buf().into(), "production")
            .unwrap_err();
        assert!(matches!(err, CredentialsError::NotAMapping { .. }));
    }

    #[test]
    fn test_substitute_env_leaves_unterminated_placeholder() {
        let lookup = |_: &str| Some("x".to_string());
        assert_eq!(substitute_env("a ${B} ${C", &lookup), "a x ${C");
    }
}
