//! Core error types for liquid-report.
//!
//! [`ReportError`] distinguishes every way a render can fail: a malformed
//! registry, a missing template, a bad input document, a template that cannot
//! be parsed, an include cycle, or a failure while executing a parsed template.
//! Callers are expected to match on the variant, never on the message text.

use thiserror::Error;

/// The primary error type for liquid-report.
///
/// Every variant is unrecoverable for the render call that produced it: the
/// pipeline never returns partial output alongside an error.
#[derive(Error, Debug)]
pub enum ReportError {
    // ── Registry ─────────────────────────────────────────────────────

    /// The same template name was supplied twice when building a registry.
    #[error("Duplicate template name: {0}")]
    DuplicateNameError(String),

    /// A requested or included template name is not in the registry.
    #[error("Template does not exist: {0}")]
    TemplateNotFoundError(String),

    // ── Input ────────────────────────────────────────────────────────

    /// The JSON document could not be decoded.
    #[error("Document decode error: {0}")]
    DocumentDecodeError(String),

    // ── Templates ────────────────────────────────────────────────────

    /// A template body does not conform to the template grammar.
    #[error("Template syntax error in '{template}'{}: {message}", line_suffix(.line))]
    TemplateSyntaxError {
        /// The name of the template being parsed.
        template: String,
        /// The 1-based line of the offending tag, when known.
        line: Option<usize>,
        /// A description of the problem.
        message: String,
    },

    /// The include graph contains a cycle. Holds the resolution chain,
    /// ending with the name that closed the cycle.
    #[error("Cyclic include: {}", .0.join(" -> "))]
    CyclicIncludeError(Vec<String>),

    /// A parsed template failed while being executed.
    #[error("Template execution error in '{template}': {message}")]
    TemplateExecutionError {
        /// The name of the template being executed.
        template: String,
        /// A description of the problem.
        message: String,
    },

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    // ── IO ───────────────────────────────────────────────────────────

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

fn line_suffix(line: &Option<usize>) -> String {
    line.map(|l| format!(" at line {l}")).unwrap_or_default()
}

impl ReportError {
    /// Builds a [`ReportError::TemplateSyntaxError`].
    pub fn syntax(
        template: impl Into<String>,
        line: Option<usize>,
        message: impl Into<String>,
    ) -> Self {
        Self::TemplateSyntaxError {
            template: template.into(),
            line,
            message: message.into(),
        }
    }

    /// Builds a [`ReportError::TemplateExecutionError`].
    pub fn execution(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TemplateExecutionError {
            template: template.into(),
            message: message.into(),
        }
    }

    /// Returns the process exit code the CLI uses for this error.
    ///
    /// - `ConfigurationError`, `IoError` -> 2
    /// - `DocumentDecodeError` -> 3
    /// - `TemplateNotFoundError`, `DuplicateNameError` -> 4
    /// - `TemplateSyntaxError`, `CyclicIncludeError` -> 5
    /// - `TemplateExecutionError` -> 6
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::ConfigurationError(_) | Self::IoError(_) => 2,
            Self::DocumentDecodeError(_) => 3,
            Self::TemplateNotFoundError(_) | Self::DuplicateNameError(_) => 4,
            Self::TemplateSyntaxError { .. } | Self::CyclicIncludeError(_) => 5,
            Self::TemplateExecutionError { .. } => 6,
        }
    }
}

/// A convenience type alias for `Result<T, ReportError>`.
pub type ReportResult<T> = Result<T, ReportError>;
