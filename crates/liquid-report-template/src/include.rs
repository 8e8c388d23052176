//! Parse-time resolution of `{% include %}` directives.
//!
//! Every `include Name` is resolved while its enclosing template is being
//! compiled: the [`IncludeResolver`] looks the name up in a
//! [`TemplateSource`], compiles that template on its own, and hands back a
//! shared [`CompiledTemplate`] for the include node to hold. Resolution is
//! depth-first and in source order.
//!
//! ## Cycles
//!
//! The resolver keeps the chain of templates currently being compiled.
//! Requesting a name that is already on the chain is a cycle and fails with
//! `CyclicIncludeError`, reporting the chain plus the repeated name:
//!
//! ```text
//! A includes B, B includes A  =>  CyclicIncludeError(["A", "B", "A"])
//! ```
//!
//! Including the same template several times without nesting (a header
//! used twice, say) is not a cycle. Finished templates are memoized by name
//! for the rest of the compilation, so each is parsed at most once.

use std::collections::HashMap;
use std::sync::Arc;

use liquid_report_core::error::ReportError;
use liquid_report_core::settings::RenderSettings;

use crate::parser::{self, CompiledTemplate};
use crate::registry::TemplateSource;

/// Compiles templates and their includes against a [`TemplateSource`].
pub struct IncludeResolver<'a> {
    source: &'a dyn TemplateSource,
    /// Names currently being compiled, outermost first.
    chain: Vec<String>,
    /// Fully compiled templates, by name.
    cache: HashMap<String, Arc<CompiledTemplate>>,
    max_depth: usize,
    max_nesting: usize,
}

impl<'a> IncludeResolver<'a> {
    /// Creates a resolver that allows includes to nest `max_depth` levels deep.
    pub fn new(source: &'a dyn TemplateSource, max_depth: usize) -> Self {
        Self {
            source,
            chain: Vec::new(),
            cache: HashMap::new(),
            max_depth,
            max_nesting: RenderSettings::default().max_nesting_depth,
        }
    }

    /// Sets how deeply block tags may nest inside any one template.
    #[must_use]
    pub fn with_max_nesting(mut self, max_nesting: usize) -> Self {
        self.max_nesting = max_nesting;
        self
    }

    /// The block nesting limit templates are parsed under.
    pub const fn max_nesting(&self) -> usize {
        self.max_nesting
    }

    /// Compiles the named template, resolving its includes recursively.
    ///
    /// # Errors
    ///
    /// - `TemplateNotFoundError` if the name (or any include) is not in the source.
    /// - `CyclicIncludeError` if the name is already being compiled.
    /// - `TemplateSyntaxError` if any template in the graph fails to parse.
    /// - `TemplateExecutionError` if includes nest deeper than the configured limit.
    pub fn compile(&mut self, name: &str) -> Result<Arc<CompiledTemplate>, ReportError> {
        if self.chain.iter().any(|n| n == name) {
            let mut cycle = self.chain.clone();
            cycle.push(name.to_string());
            tracing::debug!(chain = ?cycle, "Cyclic include detected");
            return Err(ReportError::CyclicIncludeError(cycle));
        }

        if let Some(done) = self.cache.get(name) {
            return Ok(Arc::clone(done));
        }

        if self.chain.len() > self.max_depth {
            let includer = self.chain.last().map_or(name, String::as_str);
            return Err(ReportError::execution(
                includer,
                format!(
                    "Include depth limit of {} exceeded while including '{name}'",
                    self.max_depth
                ),
            ));
        }

        let source = self.source;
        let body = source.resolve(name)?;

        tracing::debug!(template = name, depth = self.chain.len(), "Compiling template");
        self.chain.push(name.to_string());
        let parsed = parser::parse(name, body, self);
        self.chain.pop();

        let compiled = Arc::new(CompiledTemplate::new(name, parsed?));
        self.cache.insert(name.to_string(), Arc::clone(&compiled));
        Ok(compiled)
    }

    /// The names currently being compiled, outermost first.
    pub fn chain(&self) -> &[String] {
        &self.chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TemplateRegistry;

    fn registry(pairs: &[(&str, &str)]) -> TemplateRegistry {
        TemplateRegistry::create(pairs.iter().copied()).unwrap()
    }

    #[test]
    fn test_compile_without_includes() {
        let reg = registry(&[("A", "plain")]);
        let mut resolver = IncludeResolver::new(&reg, 64);
        let compiled = resolver.compile("A").unwrap();
        assert_eq!(compiled.name(), "A");
        assert!(resolver.chain().is_empty());
    }

    #[test]
    fn test_direct_cycle() {
        let reg = registry(&[("A", "{% include B %}"), ("B", "{% include A %}")]);
        let err = IncludeResolver::new(&reg, 64).compile("A").unwrap_err();
        assert!(matches!(err, ReportError::CyclicIncludeError(ref c) if c == &["A", "B", "A"]));
    }

    #[test]
    fn test_self_include_is_cycle() {
        let reg = registry(&[("A", "x{% include A %}")]);
        let err = IncludeResolver::new(&reg, 64).compile("A").unwrap_err();
        assert!(matches!(err, ReportError::CyclicIncludeError(ref c) if c == &["A", "A"]));
    }

    #[test]
    fn test_indirect_cycle_reports_full_chain() {
        let reg = registry(&[
            ("Top", "{% include Mid %}"),
            ("Mid", "{% include Leaf %}{% include Bottom %}"),
            ("Leaf", "ok"),
            ("Bottom", "{% include Mid %}"),
        ]);
        let err = IncludeResolver::new(&reg, 64).compile("Top").unwrap_err();
        assert!(matches!(
            err,
            ReportError::CyclicIncludeError(ref c) if c == &["Top", "Mid", "Bottom", "Mid"]
        ));
    }

    #[test]
    fn test_repeated_sibling_include_is_not_cycle() {
        let reg = registry(&[
            ("Report", "{% include Rule %}body{% include Rule %}"),
            ("Rule", "<hr/>"),
        ]);
        let compiled = IncludeResolver::new(&reg, 64).compile("Report").unwrap();
        assert_eq!(compiled.included_templates(), vec!["Rule", "Rule"]);
    }

    #[test]
    fn test_memoized_includes_share_compilation() {
        let reg = registry(&[("Report", "{% include Rule %}{% include Rule %}"), ("Rule", "-")]);
        let mut resolver = IncludeResolver::new(&reg, 64);
        resolver.compile("Report").unwrap();
        let first = resolver.compile("Rule").unwrap();
        let second = resolver.compile("Rule").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_missing_include() {
        let reg = registry(&[("Body", "{% include Missing %}")]);
        let err = IncludeResolver::new(&reg, 64).compile("Body").unwrap_err();
        assert!(matches!(err, ReportError::TemplateNotFoundError(ref n) if n == "Missing"));
    }

    #[test]
    fn test_syntax_error_in_include_names_included_template() {
        let reg = registry(&[("Body", "{% include Bad %}"), ("Bad", "{{ x | nope }}")]);
        let err = IncludeResolver::new(&reg, 64).compile("Body").unwrap_err();
        assert!(matches!(
            err,
            ReportError::TemplateSyntaxError { ref template, .. } if template == "Bad"
        ));
    }

    #[test]
    fn test_depth_limit() {
        let reg = registry(&[
            ("L0", "{% include L1 %}"),
            ("L1", "{% include L2 %}"),
            ("L2", "{% include L3 %}"),
            ("L3", "leaf"),
        ]);
        assert!(IncludeResolver::new(&reg, 3).compile("L0").is_ok());

        let err = IncludeResolver::new(&reg, 2).compile("L0").unwrap_err();
        assert!(matches!(
            err,
            ReportError::TemplateExecutionError { ref template, .. } if template == "L2"
        ));
    }

    #[test]
    fn test_chain_is_unwound_after_error() {
        let reg = registry(&[("A", "{% include Missing %}"), ("B", "fine")]);
        let mut resolver = IncludeResolver::new(&reg, 64);
        assert!(resolver.compile("A").is_err());
        assert!(resolver.chain().is_empty());
        assert!(resolver.compile("B").is_ok());
    }
}
