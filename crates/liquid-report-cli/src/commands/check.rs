//! The `check` command.
//!
//! Compiles every template in a manifest, resolving includes, and reports
//! each one that fails. Nothing is rendered.

use std::io::Write;
use std::sync::Arc;

use liquid_report_core::{ReportError, Settings};
use liquid_report_template::RenderPipeline;

use super::{required, templates_arg};
use crate::command::{CommandIo, ReportCommand};
use crate::manifest::load_manifest;

/// Validates every template in a manifest.
pub struct CheckCommand;

impl ReportCommand for CheckCommand {
    fn name(&self) -> &'static str {
        "check"
    }

    fn help(&self) -> &'static str {
        "Compile every template in a manifest and report failures"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(templates_arg())
    }

    /// Writes one line per failing template, then a summary. Fails with the
    /// first failure (by template name) so the exit code reflects its kind.
    fn handle(
        &self,
        matches: &clap::ArgMatches,
        settings: &Settings,
        io: &mut CommandIo<'_>,
    ) -> Result<(), ReportError> {
        let registry = load_manifest(required(matches, "templates")?)?;
        let total = registry.len();

        let pipeline = RenderPipeline::new(Arc::new(registry)).with_settings(settings.render.clone());
        let failures = pipeline.check_all();

        for (name, error) in &failures {
            writeln!(io.stdout, "{name}: {error}")?;
        }
        writeln!(
            io.stdout,
            "{total} template(s) checked, {} failed",
            failures.len()
        )?;

        match failures.into_iter().next() {
            Some((_, error)) => Err(error),
            None => Ok(()),
        }
    }
}
