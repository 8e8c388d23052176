//! Integration tests for the `liquid-report` command line.
//!
//! Tests cover: argument parsing through the built-in registry, manifests in
//! both formats, settings files, the full report render, and the exit codes
//! each failure maps to.

use std::fs;
use std::path::Path;

use liquid_report_cli::{build_registry, run, CommandIo};
use liquid_report_core::ReportError;

fn invoke(args: &[&str], stdin: &str) -> (Result<(), ReportError>, String) {
    let registry = build_registry();
    let mut argv = vec!["liquid-report"];
    argv.extend_from_slice(args);
    let matches = registry.build_cli().try_get_matches_from(argv).unwrap();

    let mut input = stdin.as_bytes();
    let mut output = Vec::new();
    let mut io = CommandIo {
        stdin: &mut input,
        stdout: &mut output,
    };
    let result = run(&registry, &matches, &mut io);
    (result, String::from_utf8(output).unwrap())
}

fn write(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path.to_str().unwrap().to_string()
}

// ═════════════════════════════════════════════════════════════════════
// 1. Argument parsing
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_builtin_commands_registered() {
    assert_eq!(build_registry().list_commands(), vec!["check", "render"]);
}

#[test]
fn test_render_requires_templates_and_entry() {
    let cli = build_registry().build_cli();
    assert!(cli.clone().try_get_matches_from(["liquid-report", "render"]).is_err());
    assert!(cli
        .try_get_matches_from(["liquid-report", "render", "--templates", "t.json"])
        .is_err());
}

#[test]
fn test_unknown_subcommand_rejected() {
    let cli = build_registry().build_cli();
    assert!(cli.try_get_matches_from(["liquid-report", "serve"]).is_err());
}

// ═════════════════════════════════════════════════════════════════════
// 2. Render
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_render_toml_manifest_with_include() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write(
        dir.path(),
        "templates.toml",
        "Header = '<h1>Hi</h1>'\nBody = '{% include Header %}!'\n",
    );
    let (result, out) = invoke(&["render", "--templates", &manifest, "--entry", "Body"], "{}");
    result.unwrap();
    assert_eq!(out, "<h1>Hi</h1>!");
}

#[test]
fn test_render_header_footer_report() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write(
        dir.path(),
        "report.toml",
        r#"
Header = "<html><body><H1>Riod</H1>"
Footer = "<br/><p>Private and confidential</p></body></html>"
Report = '''
{% include Header %}
{%- assign deviceList = Devices | split: ', ' -%}
<h1>{{ User.FirstName | append: ' ' | append: User.LastName }}</h1>
{%- for d in deviceList -%}
<li>{{ d }}</li>
{%- endfor -%}
{% include Footer %}'''
"#,
    );
    let data = write(
        dir.path(),
        "data.json",
        r#"{"Devices": "Surface, Monitors", "User": {"FirstName": "Dean", "LastName": "Ledet"}}"#,
    );

    let (result, out) = invoke(
        &["render", "-t", &manifest, "-e", "Report", "-d", &data],
        "",
    );
    result.unwrap();
    assert_eq!(
        out,
        "<html><body><H1>Riod</H1><h1>Dean Ledet</h1><li>Surface</li><li>Monitors</li>\
         <br/><p>Private and confidential</p></body></html>"
    );
}

#[test]
fn test_render_cycle_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write(
        dir.path(),
        "t.json",
        r#"{"A": "{% include B %}", "B": "{% include A %}"}"#,
    );
    let (result, out) = invoke(&["render", "--templates", &manifest, "--entry", "A"], "{}");
    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "Cyclic include: A -> B -> A");
    assert_eq!(err.exit_code(), 5);
    assert!(out.is_empty());
}

#[test]
fn test_render_missing_data_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write(dir.path(), "t.json", r#"{"T": "x"}"#);
    let missing = dir.path().join("nope.json");
    let (result, _) = invoke(
        &["render", "-t", &manifest, "-e", "T", "-d", missing.to_str().unwrap()],
        "",
    );
    assert!(matches!(result, Err(ReportError::IoError(_))));
}

#[test]
fn test_duplicate_toml_key_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write(dir.path(), "t.toml", "A = 'x'\nA = 'y'\n");
    let (result, _) = invoke(&["render", "-t", &manifest, "-e", "A"], "{}");
    assert_eq!(result.unwrap_err().exit_code(), 2);
}

#[test]
fn test_duplicate_json_key_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write(dir.path(), "t.json", r#"{"A": "x", "A": "y"}"#);
    let (result, out) = invoke(&["render", "-t", &manifest, "-e", "A"], "{}");
    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "Duplicate template name: A");
    assert_eq!(err.exit_code(), 4);
    assert!(out.is_empty());
}

// ═════════════════════════════════════════════════════════════════════
// 3. Settings files
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_toml_config_enables_strict_variables() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write(dir.path(), "t.json", r#"{"T": "[{{ Missing }}]"}"#);
    let config = write(dir.path(), "report.toml", "[render]\nstrict_variables = true\n");

    let (lenient, out) = invoke(&["render", "-t", &manifest, "-e", "T"], "{}");
    lenient.unwrap();
    assert_eq!(out, "[]");

    let (strict, _) = invoke(
        &["--config", &config, "render", "-t", &manifest, "-e", "T"],
        "{}",
    );
    assert_eq!(strict.unwrap_err().exit_code(), 6);
}

#[test]
fn test_json_config_limits_include_depth() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write(
        dir.path(),
        "t.json",
        r#"{"A": "{% include B %}", "B": "{% include C %}", "C": "c"}"#,
    );
    let config = write(dir.path(), "report.json", r#"{"render": {"max_include_depth": 1}}"#);
    let (result, _) = invoke(
        &["render", "-t", &manifest, "-e", "A", "--config", &config],
        "{}",
    );
    assert!(matches!(result, Err(ReportError::TemplateExecutionError { .. })));
}

#[test]
fn test_missing_config_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write(dir.path(), "t.json", r#"{"T": "x"}"#);
    let config = dir.path().join("absent.toml");
    let (result, out) = invoke(
        &["--config", config.to_str().unwrap(), "render", "-t", &manifest, "-e", "T"],
        "{}",
    );
    assert!(matches!(result, Err(ReportError::ConfigurationError(_))));
    assert!(out.is_empty());
}

// ═════════════════════════════════════════════════════════════════════
// 4. Check
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_check_clean_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write(
        dir.path(),
        "t.json",
        r#"{"Header": "<h1>Hi</h1>", "Body": "{% include Header %}!"}"#,
    );
    let (result, out) = invoke(&["check", "--templates", &manifest], "");
    result.unwrap();
    assert_eq!(out, "2 template(s) checked, 0 failed\n");
}

#[test]
fn test_check_missing_include() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write(dir.path(), "t.json", r#"{"Body": "{% include Missing %}"}"#);
    let (result, out) = invoke(&["check", "-t", &manifest], "");
    assert_eq!(result.unwrap_err().exit_code(), 4);
    assert!(out.starts_with("Body: Template does not exist: Missing\n"));
}
