//! Settings loading from configuration files.
//!
//! Settings are resolved in three layers:
//!
//! 1. Start with default settings.
//! 2. Load from a TOML or JSON file (overriding defaults). The format is
//!    picked from the file extension; anything other than `.json` is TOML.
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `LIQUID_REPORT_DEBUG` | `debug` |
//! | `LIQUID_REPORT_LOG_LEVEL` | `log_level` |
//! | `LIQUID_REPORT_STRICT_VARIABLES` | `render.strict_variables` |
//! | `LIQUID_REPORT_MAX_INCLUDE_DEPTH` | `render.max_include_depth` |
//! | `LIQUID_REPORT_MAX_NESTING_DEPTH` | `render.max_nesting_depth` |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use liquid_report_core::settings_loader;
//!
//! let settings = settings_loader::from_file_with_env("config/report.toml").unwrap();
//! ```

use std::path::Path;

use crate::error::ReportError;
use crate::settings::Settings;

/// Loads settings from a TOML string. Missing keys keep their defaults.
///
/// # Errors
///
/// Returns a `ConfigurationError` if the TOML is malformed or has the wrong shape.
pub fn from_toml_str(toml_str: &str) -> Result<Settings, ReportError> {
    toml::from_str(toml_str)
        .map_err(|e| ReportError::ConfigurationError(format!("Failed to parse TOML: {e}")))
}

/// Loads settings from a JSON string. Missing keys keep their defaults.
///
/// # Errors
///
/// Returns a `ConfigurationError` if the JSON is malformed or has the wrong shape.
pub fn from_json_str(json_str: &str) -> Result<Settings, ReportError> {
    serde_json::from_str(json_str)
        .map_err(|e| ReportError::ConfigurationError(format!("Failed to parse JSON: {e}")))
}

/// Loads settings from a TOML or JSON file, chosen by extension.
///
/// # Errors
///
/// Returns a `ConfigurationError` if the file cannot be read or parsed.
pub fn from_file(path: impl AsRef<Path>) -> Result<Settings, ReportError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        ReportError::ConfigurationError(format!(
            "Failed to read settings file '{}': {e}",
            path.display()
        ))
    })?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        from_json_str(&content)
    } else {
        from_toml_str(&content)
    }
}

/// Loads settings from a file and then applies environment variable overrides.
///
/// # Errors
///
/// Returns a `ConfigurationError` if the file cannot be read or parsed, or if
/// an override variable holds an invalid value.
pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Settings, ReportError> {
    let mut settings = from_file(path)?;
    apply_env_overrides(&mut settings)?;
    Ok(settings)
}

/// Loads settings from just environment variables (starting from defaults).
///
/// # Errors
///
/// Returns a `ConfigurationError` if an override variable holds an invalid value.
pub fn from_env() -> Result<Settings, ReportError> {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings)?;
    Ok(settings)
}

/// Applies `LIQUID_REPORT_*` environment variable overrides.
///
/// # Errors
///
/// Returns a `ConfigurationError` if a numeric override does not parse.
pub fn apply_env_overrides(settings: &mut Settings) -> Result<(), ReportError> {
    apply_overrides_from(settings, |key| std::env::var(key).ok())
}

/// Applies overrides using an arbitrary variable lookup.
///
/// [`apply_env_overrides`] calls this with the process environment.
///
/// # Errors
///
/// Returns a `ConfigurationError` if a numeric override does not parse.
pub fn apply_overrides_from<F>(settings: &mut Settings, lookup: F) -> Result<(), ReportError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("LIQUID_REPORT_DEBUG") {
        settings.debug = parse_flag(&val);
    }

    if let Some(val) = lookup("LIQUID_REPORT_LOG_LEVEL") {
        settings.log_level = val;
    }

    if let Some(val) = lookup("LIQUID_REPORT_STRICT_VARIABLES") {
        settings.render.strict_variables = parse_flag(&val);
    }

    if let Some(val) = lookup("LIQUID_REPORT_MAX_INCLUDE_DEPTH") {
        settings.render.max_include_depth = val.trim().parse().map_err(|e| {
            ReportError::ConfigurationError(format!(
                "LIQUID_REPORT_MAX_INCLUDE_DEPTH must be a positive integer, got '{val}': {e}"
            ))
        })?;
    }

    if let Some(val) = lookup("LIQUID_REPORT_MAX_NESTING_DEPTH") {
        settings.render.max_nesting_depth = val.trim().parse().map_err(|e| {
            ReportError::ConfigurationError(format!(
                "LIQUID_REPORT_MAX_NESTING_DEPTH must be a positive integer, got '{val}': {e}"
            ))
        })?;
    }

    Ok(())
}

fn parse_flag(val: &str) -> bool {
    matches!(val.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    // ── TOML loading ────────────────────────────────────────────────

    #[test]
    fn test_from_toml_str_basic() {
        let toml = r#"
            debug = true
            log_level = "debug"

            [render]
            strict_variables = true
        "#;

        let settings = from_toml_str(toml).unwrap();
        assert!(settings.debug);
        assert_eq!(settings.log_level, "debug");
        assert!(settings.render.strict_variables);
        // Defaults preserved
        assert_eq!(settings.render.max_include_depth, 64);
    }

    #[test]
    fn test_from_toml_str_empty() {
        let settings = from_toml_str("").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_from_toml_str_invalid() {
        let result = from_toml_str("[[invalid toml content");
        assert!(matches!(result, Err(ReportError::ConfigurationError(_))));
    }

    #[test]
    fn test_from_toml_str_wrong_type() {
        let result = from_toml_str("debug = \"sometimes\"");
        assert!(result.is_err());
    }

    // ── JSON loading ────────────────────────────────────────────────

    #[test]
    fn test_from_json_str_basic() {
        let json = r#"{"log_level": "warn", "render": {"max_include_depth": 8}}"#;
        let settings = from_json_str(json).unwrap();
        assert_eq!(settings.log_level, "warn");
        assert_eq!(settings.render.max_include_depth, 8);
        assert!(!settings.debug);
    }

    #[test]
    fn test_from_json_str_invalid() {
        assert!(from_json_str("{not json").is_err());
    }

    // ── Files ───────────────────────────────────────────────────────

    #[test]
    fn test_from_file_picks_format_by_extension() {
        let dir = std::env::temp_dir().join("liquid_report_settings_loader");
        let _ = std::fs::create_dir_all(&dir);

        let toml_path = dir.join("report.toml");
        std::fs::write(&toml_path, "log_level = \"trace\"").unwrap();
        assert_eq!(from_file(&toml_path).unwrap().log_level, "trace");

        let json_path = dir.join("report.json");
        std::fs::write(&json_path, r#"{"log_level": "error"}"#).unwrap();
        assert_eq!(from_file(&json_path).unwrap().log_level, "error");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_from_file_missing() {
        let result = from_file("/nonexistent/liquid-report.toml");
        assert!(matches!(result, Err(ReportError::ConfigurationError(_))));
    }

    // ── Overrides ───────────────────────────────────────────────────

    #[test]
    fn test_overrides_apply() {
        let mut settings = Settings::default();
        apply_overrides_from(
            &mut settings,
            lookup_from(&[
                ("LIQUID_REPORT_DEBUG", "yes"),
                ("LIQUID_REPORT_LOG_LEVEL", "debug"),
                ("LIQUID_REPORT_STRICT_VARIABLES", "1"),
                ("LIQUID_REPORT_MAX_INCLUDE_DEPTH", "12"),
                ("LIQUID_REPORT_MAX_NESTING_DEPTH", "20"),
            ]),
        )
        .unwrap();

        assert!(settings.debug);
        assert_eq!(settings.log_level, "debug");
        assert!(settings.render.strict_variables);
        assert_eq!(settings.render.max_include_depth, 12);
        assert_eq!(settings.render.max_nesting_depth, 20);
    }

    #[test]
    fn test_overrides_absent_keep_values() {
        let mut settings = Settings::default();
        apply_overrides_from(&mut settings, lookup_from(&[])).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_overrides_false_flag() {
        let mut settings = Settings {
            debug: true,
            ..Settings::default()
        };
        apply_overrides_from(&mut settings, lookup_from(&[("LIQUID_REPORT_DEBUG", "off")]))
            .unwrap();
        assert!(!settings.debug);
    }

    #[test]
    fn test_overrides_invalid_depth() {
        let mut settings = Settings::default();
        let result = apply_overrides_from(
            &mut settings,
            lookup_from(&[("LIQUID_REPORT_MAX_INCLUDE_DEPTH", "deep")]),
        );
        assert!(matches!(result, Err(ReportError::ConfigurationError(_))));

        let result = apply_overrides_from(
            &mut settings,
            lookup_from(&[("LIQUID_REPORT_MAX_NESTING_DEPTH", "-3")]),
        );
        assert!(matches!(result, Err(ReportError::ConfigurationError(_))));
    }
}
