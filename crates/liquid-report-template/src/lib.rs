//! # liquid-report-template
//!
//! Renders reports from named Liquid templates and JSON documents.
//!
//! A [`TemplateRegistry`] holds the templates by name. A [`RenderPipeline`]
//! decodes a JSON document into a [`Binding`], compiles the entry template
//! (resolving every `{% include Name %}` against the registry while parsing,
//! with cycle detection), and renders it.
//!
//! ## Modules
//!
//! - [`binding`] - The recursive value tree a template is evaluated against
//! - [`context`] - Variable scopes and loop interrupts during rendering
//! - [`engine`] - The render pipeline
//! - [`expression`] - Expression, filter-chain, and condition parsing
//! - [`filters`] - Built-in filters
//! - [`include`] - Parse-time include resolution
//! - [`lexer`] - Template tokenizer
//! - [`parser`] - Node tree construction and rendering
//! - [`registry`] - The immutable named-template registry

pub mod binding;
pub mod context;
pub mod engine;
pub mod expression;
pub mod filters;
pub mod include;
pub mod lexer;
pub mod parser;
pub mod registry;

pub use binding::{convert, Binding};
pub use engine::RenderPipeline;
pub use parser::CompiledTemplate;
pub use registry::{NamedTemplate, TemplateRegistry, TemplateSource};
