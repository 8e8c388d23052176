//! Built-in sub-commands.
//!
//! Each command implements [`ReportCommand`](crate::command::ReportCommand).

pub mod check;
pub mod render;

pub use check::CheckCommand;
pub use render::RenderCommand;

use crate::command::CommandRegistry;

/// Registers every built-in command into the given registry.
pub fn register_builtin_commands(registry: &mut CommandRegistry) {
    registry.register(Box::new(RenderCommand));
    registry.register(Box::new(CheckCommand));
}

/// Adds the `--templates` manifest argument shared by every command.
pub(crate) fn templates_arg() -> clap::Arg {
    clap::Arg::new("templates")
        .long("templates")
        .short('t')
        .value_name("MANIFEST")
        .help("Template manifest: a JSON object or TOML table of name = body")
        .required(true)
}

/// Reads a required string argument.
pub(crate) fn required<'m>(
    matches: &'m clap::ArgMatches,
    id: &str,
) -> Result<&'m str, liquid_report_core::ReportError> {
    matches
        .get_one::<String>(id)
        .map(String::as_str)
        .ok_or_else(|| liquid_report_core::ReportError::ConfigurationError(format!("Missing --{id}")))
}
