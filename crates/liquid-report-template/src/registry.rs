//! The named-template registry.
//!
//! A [`TemplateRegistry`] is an immutable, in-memory mapping from template
//! name to template body. It is built once from a name/body mapping and is
//! read-only afterwards, so it can be shared across threads behind an `Arc`
//! without locking.
//!
//! The compiler only needs one capability from it, name lookup, which is
//! captured by the [`TemplateSource`] trait.

use std::collections::HashMap;

use liquid_report_core::error::ReportError;

/// Looks up raw template text by name.
///
/// This is the only capability the include resolver depends on.
pub trait TemplateSource: Send + Sync {
    /// Returns the body of the template with the given name.
    ///
    /// # Errors
    ///
    /// Returns `TemplateNotFoundError` if no template has this name.
    fn resolve(&self, name: &str) -> Result<&str, ReportError>;
}

/// A single named template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedTemplate {
    name: String,
    body: String,
}

impl NamedTemplate {
    /// Creates a named template.
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }

    /// The template's unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw template text.
    pub fn body(&self) -> &str {
        &self.body
    }
}

/// An immutable set of named templates.
///
/// # Examples
///
/// ```
/// use liquid_report_template::registry::{TemplateRegistry, TemplateSource};
///
/// let registry = TemplateRegistry::create([
///     ("Header", "<h1>Hi</h1>"),
///     ("Body", "{% include Header %}!"),
/// ]).unwrap();
///
/// assert_eq!(registry.resolve("Header").unwrap(), "<h1>Hi</h1>");
/// assert!(registry.resolve("Footer").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, NamedTemplate>,
}

impl TemplateRegistry {
    /// Builds a registry from name/body pairs.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateNameError` if the same name appears more than once.
    pub fn create<I, K, V>(mapping: I) -> Result<Self, ReportError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut templates = HashMap::new();
        for (name, body) in mapping {
            let template = NamedTemplate::new(name, body);
            if templates.contains_key(template.name()) {
                return Err(ReportError::DuplicateNameError(template.name));
            }
            templates.insert(template.name.clone(), template);
        }
        tracing::debug!(count = templates.len(), "Template registry created");
        Ok(Self { templates })
    }

    /// Returns the named template, if present.
    pub fn get(&self, name: &str) -> Option<&NamedTemplate> {
        self.templates.get(name)
    }

    /// Returns `true` if a template with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Returns all template names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of templates.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Returns `true` if the registry holds no templates.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl TemplateSource for TemplateRegistry {
    fn resolve(&self, name: &str) -> Result<&str, ReportError> {
        self.templates
            .get(name)
            .map(NamedTemplate::body)
            .ok_or_else(|| ReportError::TemplateNotFoundError(name.to_string()))
    }
}
