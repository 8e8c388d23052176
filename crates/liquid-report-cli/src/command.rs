//! Sub-command framework for the `liquid-report` binary.
//!
//! Each sub-command implements [`ReportCommand`] and is registered in a
//! [`CommandRegistry`], which builds the clap command tree and dispatches
//! parsed arguments to the matching handler.
//!
//! Handlers read from and write to the [`CommandIo`] they are given rather
//! than the process streams, so they can be driven from tests.

use std::collections::HashMap;
use std::io::{Read, Write};

use liquid_report_core::{ReportError, Settings};

/// The input and output streams a command runs against.
pub struct CommandIo<'a> {
    /// Where a command reads a document from when none is given by path.
    pub stdin: &'a mut dyn Read,
    /// Where rendered output and reports are written.
    pub stdout: &'a mut dyn Write,
}

/// A sub-command of the `liquid-report` binary.
pub trait ReportCommand: Send + Sync {
    /// The name used to invoke the command.
    fn name(&self) -> &'static str;

    /// A short help description.
    fn help(&self) -> &'static str;

    /// Adds the command's arguments. The default adds none.
    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd
    }

    /// Runs the command.
    fn handle(
        &self,
        matches: &clap::ArgMatches,
        settings: &Settings,
        io: &mut CommandIo<'_>,
    ) -> Result<(), ReportError>;
}

/// A registry of sub-commands, keyed by name.
#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Box<dyn ReportCommand>>,
}

impl CommandRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a command, replacing any command with the same name.
    pub fn register(&mut self, command: Box<dyn ReportCommand>) {
        let name = command.name().to_string();
        self.commands.insert(name, command);
    }

    /// Returns the command with the given name, if registered.
    pub fn get(&self, name: &str) -> Option<&dyn ReportCommand> {
        self.commands.get(name).map(AsRef::as_ref)
    }

    /// Returns the registered command names, sorted.
    pub fn list_commands(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of registered commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if no commands are registered.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Builds the top-level clap command with one sub-command per entry.
    ///
    /// `--config` is global so it may appear before or after the sub-command.
    pub fn build_cli(&self) -> clap::Command {
        let mut app = clap::Command::new("liquid-report")
            .about("Render reports from named Liquid templates and JSON documents")
            .subcommand_required(true)
            .arg_required_else_help(true)
            .arg(
                clap::Arg::new("config")
                    .long("config")
                    .value_name("SETTINGS")
                    .help("Settings file (TOML, or JSON with a .json extension)")
                    .global(true),
            );

        let mut entries: Vec<_> = self.commands.values().collect();
        entries.sort_by(|a, b| a.name().cmp(b.name()));

        for cmd in entries {
            let subcmd = clap::Command::new(cmd.name()).about(cmd.help());
            app = app.subcommand(cmd.add_arguments(subcmd));
        }

        app
    }

    /// Dispatches parsed arguments to the selected sub-command.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if no known sub-command was selected,
    /// otherwise whatever the command's handler returns.
    pub fn execute(
        &self,
        matches: &clap::ArgMatches,
        settings: &Settings,
        io: &mut CommandIo<'_>,
    ) -> Result<(), ReportError> {
        let (name, sub_matches) = matches.subcommand().ok_or_else(|| {
            ReportError::ConfigurationError("No subcommand specified".to_string())
        })?;

        let cmd = self.get(name).ok_or_else(|| {
            ReportError::ConfigurationError(format!("Unknown command: {name}"))
        })?;

        tracing::debug!(command = name, "Running command");
        cmd.handle(sub_matches, settings, io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoCommand(&'static str);

    impl ReportCommand for EchoCommand {
        fn name(&self) -> &'static str {
            self.0
        }

        fn help(&self) -> &'static str {
            "Echoes its word"
        }

        fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
            cmd.arg(clap::Arg::new("word").long("word").required(true))
        }

        fn handle(
            &self,
            matches: &clap::ArgMatches,
            _settings: &Settings,
            io: &mut CommandIo<'_>,
        ) -> Result<(), ReportError> {
            let word = matches.get_one::<String>("word").map_or("", String::as_str);
            write!(io.stdout, "{word}")?;
            Ok(())
        }
    }

    struct FailingCommand;

    impl ReportCommand for FailingCommand {
        fn name(&self) -> &'static str {
            "fail"
        }

        fn help(&self) -> &'static str {
            "Always fails"
        }

        fn handle(
            &self,
            _matches: &clap::ArgMatches,
            _settings: &Settings,
            _io: &mut CommandIo<'_>,
        ) -> Result<(), ReportError> {
            Err(ReportError::ConfigurationError("deliberate failure".to_string()))
        }
    }

    fn run(registry: &CommandRegistry, args: &[&str]) -> (Result<(), ReportError>, String) {
        let matches = registry.build_cli().try_get_matches_from(args).unwrap();
        let mut stdin = std::io::empty();
        let mut stdout = Vec::new();
        let mut io = CommandIo {
            stdin: &mut stdin,
            stdout: &mut stdout,
        };
        let result = registry.execute(&matches, &Settings::default(), &mut io);
        (result, String::from_utf8(stdout).unwrap())
    }

    #[test]
    fn test_registry_new_is_empty() {
        let registry = CommandRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_register_and_list_sorted() {
        let mut registry = CommandRegistry::new();
        registry.register(Box::new(EchoCommand("zebra")));
        registry.register(Box::new(EchoCommand("alpha")));
        registry.register(Box::new(EchoCommand("alpha")));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.list_commands(), vec!["alpha", "zebra"]);
        assert_eq!(registry.get("alpha").unwrap().help(), "Echoes its word");
        assert!(registry.get("beta").is_none());
    }

    #[test]
    fn test_execute_dispatches_with_arguments() {
        let mut registry = CommandRegistry::new();
        registry.register(Box::new(EchoCommand("echo")));
        let (result, out) = run(&registry, &["liquid-report", "echo", "--word", "hi"]);
        assert!(result.is_ok());
        assert_eq!(out, "hi");
    }

    #[test]
    fn test_global_config_flag_accepted_after_subcommand() {
        let mut registry = CommandRegistry::new();
        registry.register(Box::new(EchoCommand("echo")));
        let matches = registry
            .build_cli()
            .try_get_matches_from(["liquid-report", "echo", "--word", "x", "--config", "r.toml"])
            .unwrap();
        assert_eq!(matches.get_one::<String>("config").unwrap(), "r.toml");
    }

    #[test]
    fn test_execute_propagates_handler_error() {
        let mut registry = CommandRegistry::new();
        registry.register(Box::new(FailingCommand));
        let (result, _) = run(&registry, &["liquid-report", "fail"]);
        assert!(matches!(result, Err(ReportError::ConfigurationError(_))));
    }

    #[test]
    fn test_subcommand_required() {
        let mut registry = CommandRegistry::new();
        registry.register(Box::new(FailingCommand));
        assert!(registry.build_cli().try_get_matches_from(["liquid-report"]).is_err());
    }
}
