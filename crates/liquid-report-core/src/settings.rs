//! Settings for liquid-report.
//!
//! [`Settings`] holds logging configuration and the [`RenderSettings`] that
//! tune the render pipeline. Every field has a default, so a settings file
//! only needs to name what it changes.

use serde::{Deserialize, Serialize};

/// Options that change how templates are compiled and executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Maximum nesting of `{% include %}` directives. Compilation fails with
    /// an execution error once a chain grows past this many templates.
    pub max_include_depth: usize,
    /// Maximum nesting of block tags (`if`, `unless`, `case`, `for`,
    /// `capture`) within one template. Deeper blocks are a syntax error.
    pub max_nesting_depth: usize,
    /// When `true`, referencing a variable that is not bound is an execution
    /// error instead of rendering as empty.
    pub strict_variables: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            max_include_depth: 64,
            max_nesting_depth: 100,
            strict_variables: false,
        }
    }
}

/// The complete set of liquid-report settings.
///
/// # Examples
///
/// ```
/// use liquid_report_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert!(!settings.debug);
/// assert_eq!(settings.log_level, "info");
/// assert_eq!(settings.render.max_include_depth, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // ── Logging ──────────────────────────────────────────────────────

    /// Whether debug mode is enabled (pretty, human-readable logs).
    pub debug: bool,
    /// The log level filter (e.g. "info", "debug", "liquid_report_template=trace").
    pub log_level: String,

    // ── Rendering ────────────────────────────────────────────────────

    /// Render pipeline options.
    pub render: RenderSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            log_level: "info".to_string(),
            render: RenderSettings::default(),
        }
    }
}
