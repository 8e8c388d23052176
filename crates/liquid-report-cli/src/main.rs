use std::process::ExitCode;

use liquid_report_cli::{build_registry, run, CommandIo};

fn main() -> ExitCode {
    let registry = build_registry();
    let matches = registry.build_cli().get_matches();

    let mut stdin = std::io::stdin().lock();
    let mut stdout = std::io::stdout().lock();
    let mut io = CommandIo {
        stdin: &mut stdin,
        stdout: &mut stdout,
    };

    match run(&registry, &matches, &mut io) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
