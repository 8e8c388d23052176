//! The render pipeline: JSON document in, report text out.
//!
//! [`RenderPipeline`] ties the pieces together. For each call it decodes the
//! document, converts it to a [`Binding`], compiles the entry template
//! (resolving includes against the registry), and executes it. Nothing is
//! cached between calls; the registry is the only shared state and it is
//! immutable.

use std::sync::Arc;

use liquid_report_core::error::ReportError;
use liquid_report_core::logging::render_span;
use liquid_report_core::settings::RenderSettings;

use crate::binding::{convert, Binding};
use crate::context::Context;
use crate::include::IncludeResolver;
use crate::parser::CompiledTemplate;
use crate::registry::TemplateRegistry;

/// Renders named templates from a shared registry.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use liquid_report_template::engine::RenderPipeline;
/// use liquid_report_template::registry::TemplateRegistry;
///
/// let registry = TemplateRegistry::create([
///     ("Header", "<h1>Hi</h1>"),
///     ("Body", "{% include Header %}{{ Name }}!"),
/// ]).unwrap();
///
/// let pipeline = RenderPipeline::new(Arc::new(registry));
/// let result = pipeline.render("Body", r#"{"Name": "Ann"}"#).unwrap();
/// assert_eq!(result, "<h1>Hi</h1>Ann!");
/// ```
#[derive(Debug, Clone)]
pub struct RenderPipeline {
    registry: Arc<TemplateRegistry>,
    settings: RenderSettings,
}

impl RenderPipeline {
    /// Creates a pipeline over the given registry with default settings.
    pub fn new(registry: Arc<TemplateRegistry>) -> Self {
        Self {
            registry,
            settings: RenderSettings::default(),
        }
    }

    /// Replaces the render settings.
    #[must_use]
    pub fn with_settings(mut self, settings: RenderSettings) -> Self {
        self.settings = settings;
        self
    }

    /// The registry templates are resolved against.
    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    /// The active render settings.
    pub const fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Renders the entry template against a JSON document.
    ///
    /// # Errors
    ///
    /// - `DocumentDecodeError` if `document_json` is malformed or its root is
    ///   not an object.
    /// - `TemplateNotFoundError` if the entry template or an include is missing.
    /// - `TemplateSyntaxError` or `CyclicIncludeError` if compilation fails.
    /// - `TemplateExecutionError` if evaluation fails.
    pub fn render(&self, entry: &str, document_json: &str) -> Result<String, ReportError> {
        let span = render_span(entry);
        let _guard = span.enter();

        let document: serde_json::Value = serde_json::from_str(document_json)
            .map_err(|e| ReportError::DocumentDecodeError(e.to_string()))?;
        self.render_document(entry, &document)
    }

    /// Renders the entry template against an already decoded document.
    ///
    /// # Errors
    ///
    /// The same as [`render`](Self::render), minus JSON syntax errors.
    pub fn render_value(&self, entry: &str, document: &serde_json::Value) -> Result<String, ReportError> {
        let span = render_span(entry);
        let _guard = span.enter();
        self.render_document(entry, document)
    }

    fn render_document(&self, entry: &str, document: &serde_json::Value) -> Result<String, ReportError> {
        if !document.is_object() {
            return Err(ReportError::DocumentDecodeError(format!(
                "document root must be a JSON object, got {}",
                json_kind(document)
            )));
        }
        let root: Binding = convert(document);

        let template = self.compile(entry)?;
        let mut context = Context::new(root).with_strict_variables(self.settings.strict_variables);
        let output = template.render(&mut context)?;

        tracing::debug!(bytes = output.len(), "Render complete");
        Ok(output)
    }

    /// Compiles the entry template and everything it includes.
    ///
    /// # Errors
    ///
    /// `TemplateNotFoundError`, `TemplateSyntaxError`, `CyclicIncludeError`,
    /// or `TemplateExecutionError` when includes nest too deeply.
    pub fn compile(&self, entry: &str) -> Result<Arc<CompiledTemplate>, ReportError> {
        IncludeResolver::new(self.registry.as_ref(), self.settings.max_include_depth)
            .with_max_nesting(self.settings.max_nesting_depth)
            .compile(entry)
    }

    /// Compiles every registered template and returns the failures, sorted
    /// by template name.
    pub fn check_all(&self) -> Vec<(String, ReportError)> {
        self.registry
            .names()
            .into_iter()
            .filter_map(|name| {
                self.compile(name).err().map(|e| {
                    tracing::warn!(template = name, error = %e, "Template failed to compile");
                    (name.to_string(), e)
                })
            })
            .collect()
    }
}

const fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
