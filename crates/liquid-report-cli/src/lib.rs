//! # liquid-report-cli
//!
//! The `liquid-report` command-line front end.
//!
//! - `render` - render an entry template from a manifest against a JSON document
//! - `check` - compile every template in a manifest and report failures
//!
//! Settings come from `--config` (TOML or JSON) when given, otherwise from
//! defaults, with `LIQUID_REPORT_*` environment overrides applied on top.
//!
//! ## Quick Start
//!
//! ```rust
//! use liquid_report_cli::build_registry;
//!
//! let registry = build_registry();
//! assert_eq!(registry.list_commands(), vec!["check", "render"]);
//! ```

pub mod command;
pub mod commands;
pub mod manifest;

pub use command::{CommandIo, CommandRegistry, ReportCommand};
pub use manifest::{load_manifest, parse_manifest, ManifestFormat};

use liquid_report_core::logging::setup_logging;
use liquid_report_core::{settings_loader, ReportError, Settings};

/// Returns a registry holding every built-in command.
pub fn build_registry() -> CommandRegistry {
    let mut registry = CommandRegistry::new();
    commands::register_builtin_commands(&mut registry);
    registry
}

/// Resolves settings for a parsed command line.
///
/// # Errors
///
/// Returns `ConfigurationError` if the settings file cannot be read or
/// parsed, or an environment override is invalid.
pub fn load_settings(matches: &clap::ArgMatches) -> Result<Settings, ReportError> {
    match matches.get_one::<String>("config") {
        Some(path) => settings_loader::from_file_with_env(path),
        None => settings_loader::from_env(),
    }
}

/// Loads settings, installs logging, and runs the selected command.
///
/// # Errors
///
/// Returns any error from loading settings or from the command itself.
pub fn run(
    registry: &CommandRegistry,
    matches: &clap::ArgMatches,
    io: &mut CommandIo<'_>,
) -> Result<(), ReportError> {
    let settings = load_settings(matches)?;
    setup_logging(&settings);
    registry.execute(matches, &settings, io)
}
