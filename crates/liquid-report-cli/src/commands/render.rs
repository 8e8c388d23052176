//! The `render` command.
//!
//! Loads a template manifest, reads a JSON document from `--data` or stdin,
//! renders the entry template, and writes the result to stdout unchanged.

use std::io::{Read, Write};
use std::sync::Arc;

use liquid_report_core::{ReportError, Settings};
use liquid_report_template::RenderPipeline;

use super::{required, templates_arg};
use crate::command::{CommandIo, ReportCommand};
use crate::manifest::load_manifest;

/// Renders one template against one JSON document.
pub struct RenderCommand;

impl ReportCommand for RenderCommand {
    fn name(&self) -> &'static str {
        "render"
    }

    fn help(&self) -> &'static str {
        "Render an entry template against a JSON document"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(templates_arg())
            .arg(
                clap::Arg::new("entry")
                    .long("entry")
                    .short('e')
                    .value_name("NAME")
                    .help("Name of the template to render")
                    .required(true),
            )
            .arg(
                clap::Arg::new("data")
                    .long("data")
                    .short('d')
                    .value_name("JSON_FILE")
                    .help("JSON document to render against; read from stdin when omitted"),
            )
    }

    fn handle(
        &self,
        matches: &clap::ArgMatches,
        settings: &Settings,
        io: &mut CommandIo<'_>,
    ) -> Result<(), ReportError> {
        let registry = load_manifest(required(matches, "templates")?)?;
        let entry = required(matches, "entry")?;

        let document = match matches.get_one::<String>("data") {
            Some(path) => std::fs::read_to_string(path)?,
            None => {
                let mut buf = String::new();
                io.stdin.read_to_string(&mut buf)?;
                buf
            }
        };

        let pipeline = RenderPipeline::new(Arc::new(registry)).with_settings(settings.render.clone());
        let output = pipeline.render(entry, &document)?;

        io.stdout.write_all(output.as_bytes())?;
        io.stdout.flush()?;
        Ok(())
    }
}
