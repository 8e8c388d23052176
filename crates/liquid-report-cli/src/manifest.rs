//! Template manifests.
//!
//! A manifest is a single file mapping template names to template bodies,
//! either as a JSON object or as a TOML table:
//!
//! ```toml
//! Header = "<h1>{{ Title }}</h1>"
//! Body = "{% include Header %}{{ Text }}"
//! ```
//!
//! Loading a manifest only seeds an in-memory [`TemplateRegistry`]; templates
//! are never looked up on disk by name.

use std::fmt;
use std::path::Path;

use liquid_report_core::ReportError;
use liquid_report_template::TemplateRegistry;
use serde::de::{self, Deserialize, Deserializer, MapAccess, Visitor};

/// The encoding of a manifest file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    /// A JSON object of strings.
    Json,
    /// A TOML table of strings.
    Toml,
}

impl ManifestFormat {
    /// Picks the format from a path's extension: `.toml` is TOML, anything
    /// else is JSON.
    pub fn from_path(path: &Path) -> Self {
        if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
        {
            Self::Toml
        } else {
            Self::Json
        }
    }
}

/// Reads a manifest file and builds a registry from it.
///
/// # Errors
///
/// `IoError` if the file cannot be read, `ConfigurationError` if it is not a
/// valid manifest, or `DuplicateNameError` from the registry.
pub fn load_manifest(path: impl AsRef<Path>) -> Result<TemplateRegistry, ReportError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    tracing::debug!(path = %path.display(), "Loading template manifest");
    parse_manifest(&text, ManifestFormat::from_path(path))
}

/// Parses manifest text and builds a registry from it.
///
/// # Errors
///
/// `ConfigurationError` if the text does not parse, its root is not a
/// table, or any value is not a string.
pub fn parse_manifest(text: &str, format: ManifestFormat) -> Result<TemplateRegistry, ReportError> {
    let entries = match format {
        ManifestFormat::Json => json_entries(text)?,
        ManifestFormat::Toml => toml_entries(text)?,
    };
    TemplateRegistry::create(entries)
}

fn json_entries(text: &str) -> Result<Vec<(String, String)>, ReportError> {
    let entries: JsonEntries = serde_json::from_str(text)
        .map_err(|e| ReportError::ConfigurationError(format!("Failed to parse manifest JSON: {e}")))?;
    Ok(entries.0)
}

/// The members of a JSON manifest object in document order, repeated names
/// included, so the registry sees every one of them.
struct JsonEntries(Vec<(String, String)>);

impl<'de> Deserialize<'de> for JsonEntries {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(JsonEntriesVisitor)
    }
}

struct JsonEntriesVisitor;

impl<'de> Visitor<'de> for JsonEntriesVisitor {
    type Value = JsonEntries;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON object of template bodies")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some(name) = map.next_key::<String>()? {
            match map.next_value::<serde_json::Value>()? {
                serde_json::Value::String(body) => entries.push((name, body)),
                _ => return Err(de::Error::custom(string_required(&name))),
            }
        }
        Ok(JsonEntries(entries))
    }
}

fn toml_entries(text: &str) -> Result<Vec<(String, String)>, ReportError> {
    let table: toml::Table = text
        .parse()
        .map_err(|e| ReportError::ConfigurationError(format!("Failed to parse manifest TOML: {e}")))?;
    table
        .into_iter()
        .map(|(name, body)| match body {
            toml::Value::String(body) => Ok((name, body)),
            _ => Err(not_a_string(&name)),
        })
        .collect()
}

fn string_required(name: &str) -> String {
    format!("Template '{name}' in manifest must be a string")
}

fn not_a_string(name: &str) -> ReportError {
    ReportError::ConfigurationError(string_required(name))
}

#[cfg(test)]
mod tests {
    use liquid_report_template::TemplateSource;

    use super::*;

    #[test]
    fn test_format_from_path() {
        assert_eq!(ManifestFormat::from_path(Path::new("t.toml")), ManifestFormat::Toml);
        assert_eq!(ManifestFormat::from_path(Path::new("t.TOML")), ManifestFormat::Toml);
        assert_eq!(ManifestFormat::from_path(Path::new("t.json")), ManifestFormat::Json);
        assert_eq!(ManifestFormat::from_path(Path::new("templates")), ManifestFormat::Json);
    }

    #[test]
    fn test_parse_json_manifest() {
        let registry = parse_manifest(
            r#"{"Header": "<h1>Hi</h1>", "Body": "{% include Header %}!"}"#,
            ManifestFormat::Json,
        )
        .unwrap();
        assert_eq!(registry.names(), vec!["Body", "Header"]);
        assert_eq!(registry.resolve("Header").unwrap(), "<h1>Hi</h1>");
    }

    #[test]
    fn test_parse_toml_manifest() {
        let text = "Header = \"<h1>Hi</h1>\"\nBody = '''\n{% include Header %}\n{{ Name }}'''\n";
        let registry = parse_manifest(text, ManifestFormat::Toml).unwrap();
        assert_eq!(registry.resolve("Body").unwrap(), "{% include Header %}\n{{ Name }}");
    }

    #[test]
    fn test_non_string_body_rejected() {
        for (text, format) in [
            (r#"{"A": 1}"#, ManifestFormat::Json),
            ("A = 1", ManifestFormat::Toml),
            ("[A]\nx = 'y'", ManifestFormat::Toml),
        ] {
            let err = parse_manifest(text, format).unwrap_err();
            assert!(
                matches!(err, ReportError::ConfigurationError(ref m) if m.contains("'A'")),
                "{text}"
            );
        }
    }

    #[test]
    fn test_repeated_json_name_rejected() {
        let err = parse_manifest(r#"{"Header": "one", "Header": "two"}"#, ManifestFormat::Json)
            .unwrap_err();
        assert!(matches!(err, ReportError::DuplicateNameError(ref n) if n == "Header"));
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_json_manifest_keeps_document_order() {
        let entries = json_entries(r#"{"Zeta": "z", "Alpha": "a", "Mid": "m"}"#).unwrap();
        let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["Zeta", "Alpha", "Mid"]);
    }

    #[test]
    fn test_non_object_json_rejected() {
        assert!(matches!(
            parse_manifest(r#"["A"]"#, ManifestFormat::Json),
            Err(ReportError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_malformed_manifest_rejected() {
        assert!(parse_manifest("{", ManifestFormat::Json).is_err());
        assert!(parse_manifest("A = ", ManifestFormat::Toml).is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_manifest("/nonexistent/templates.json").unwrap_err();
        assert!(matches!(err, ReportError::IoError(_)));
        assert_eq!(err.exit_code(), 2);
    }
}
