//! # liquid-report-core
//!
//! Core types shared by every liquid-report crate. This crate has no
//! dependency on the template engine itself.
//!
//! ## Modules
//!
//! - [`error`] - The [`ReportError`] taxonomy and result alias
//! - [`settings`] - Render and logging settings with sensible defaults
//! - [`settings_loader`] - Loading settings from TOML, JSON, and the environment
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use error::{ReportError, ReportResult};
pub use settings::{RenderSettings, Settings};
