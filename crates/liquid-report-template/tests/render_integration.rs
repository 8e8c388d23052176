//! Integration tests for the render pipeline.
//!
//! Tests cover: registry lookup, JSON-to-binding conversion, plain renders,
//! parse-time includes, missing and cyclic includes, determinism, sharing a
//! pipeline across threads, a full header/body/footer report, and large or
//! deeply nested inputs.

use std::sync::Arc;
use std::thread;

use liquid_report_core::error::ReportError;
use liquid_report_core::settings::RenderSettings;
use liquid_report_template::{convert, Binding, RenderPipeline, TemplateRegistry, TemplateSource};
use serde_json::json;

fn pipeline(pairs: &[(&str, &str)]) -> RenderPipeline {
    let registry = TemplateRegistry::create(pairs.iter().copied()).expect("valid registry");
    RenderPipeline::new(Arc::new(registry))
}

const HEADER: &str = "<html><body><H1>Riod</H1>";
const FOOTER: &str = "<br/><p>Private and confidential</p></body></html>";

const REPORT_BODY: &str = concat!(
    "{%- assign deviceList = Devices | split: ', ' -%}",
    "<h1>{{User.FirstName | append: ' ' | append: User.LastName}}</h1><h2>{{User.FirstName | upcase}}</h2>",
    "<h2><b>Phone</b>&nbsp; : {{User.Phone | slice: 1, 3}}</h2>",
    "<h2><b>devices&nbsp; : <ul> {%- for d in deviceList -%}    ",
    "<li>{{d}}</li>",
    " {%- endfor -%} </ul>",
    "{% include Footer %} ",
);

const REPORT_DATA: &str = r#"{
    "Devices": "Surface, Windows Phone, Monitors",
    "User": {"FirstName": "Dean", "LastName": "Ledet", "Phone": "1678816156"}
}"#;

// ═════════════════════════════════════════════════════════════════════
// 1. Registry: every registered name resolves to its body
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_registry_round_trip() {
    let pairs = [("Header", HEADER), ("Footer", FOOTER), ("Empty", "")];
    let registry = TemplateRegistry::create(pairs).unwrap();
    for (name, body) in pairs {
        assert_eq!(registry.resolve(name).unwrap(), body);
    }
    assert!(matches!(
        registry.resolve("Body"),
        Err(ReportError::TemplateNotFoundError(ref n)) if n == "Body"
    ));
}

// ═════════════════════════════════════════════════════════════════════
// 2. Converter: structure is preserved at every depth
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_converter_preserves_structure() {
    let binding = convert(&json!({"a": 1, "b": [true, null, "x"]}));
    assert_eq!(binding.get_member("a"), Some(Binding::Integer(1)));
    assert_eq!(
        binding.get_member("b"),
        Some(Binding::Array(vec![
            Binding::Bool(true),
            Binding::Nil,
            Binding::from("x"),
        ]))
    );
}

#[test]
fn test_nested_paths_render() {
    let p = pipeline(&[("T", "{{ a.b[1].c }}|{{ a.b.size }}|{{ a.b.first.c }}")]);
    let out = p
        .render("T", r#"{"a": {"b": [{"c": "zero"}, {"c": "one"}]}}"#)
        .unwrap();
    assert_eq!(out, "one|2|zero");
}

// ═════════════════════════════════════════════════════════════════════
// 3. Scenario: plain render
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_plain_render() {
    let p = pipeline(&[("Greet", "Hello {{ Name }}!")]);
    assert_eq!(p.render("Greet", r#"{"Name": "Ann"}"#).unwrap(), "Hello Ann!");
}

// ═════════════════════════════════════════════════════════════════════
// 4. Scenario: include resolved against the registry
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_include_render() {
    let p = pipeline(&[("Header", "<h1>Hi</h1>"), ("Body", "{% include Header %}{{ X }}")]);
    assert_eq!(p.render("Body", r#"{"X":"!"}"#).unwrap(), "<h1>Hi</h1>!");
}

#[test]
fn test_included_template_sees_document() {
    let p = pipeline(&[("Sig", "-- {{ User.Name }}"), ("Mail", "Dear all\n{% include Sig %}")]);
    assert_eq!(
        p.render("Mail", r#"{"User": {"Name": "Ann"}}"#).unwrap(),
        "Dear all\n-- Ann"
    );
}

// ═════════════════════════════════════════════════════════════════════
// 5. Scenario: missing template
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_missing_include() {
    let p = pipeline(&[("Body", "{% include Missing %}")]);
    let err = p.render("Body", "{}").unwrap_err();
    assert!(matches!(err, ReportError::TemplateNotFoundError(ref n) if n == "Missing"));
    assert_eq!(err.exit_code(), 4);
}

#[test]
fn test_missing_entry() {
    let p = pipeline(&[("Body", "x")]);
    assert!(matches!(
        p.render("Report", "{}"),
        Err(ReportError::TemplateNotFoundError(ref n)) if n == "Report"
    ));
}

// ═════════════════════════════════════════════════════════════════════
// 6. Scenario: include cycle
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_include_cycle() {
    let p = pipeline(&[("A", "{% include B %}"), ("B", "{% include A %}")]);
    let err = p.render("A", "{}").unwrap_err();
    match &err {
        ReportError::CyclicIncludeError(chain) => assert_eq!(chain, &["A", "B", "A"]),
        other => panic!("expected a cycle, got {other:?}"),
    }
    assert!(err.to_string().contains("A -> B -> A"));
    assert_eq!(err.exit_code(), 5);
}

#[test]
fn test_cycle_is_reported_from_either_entry() {
    let p = pipeline(&[("A", "{% include B %}"), ("B", "{% include A %}")]);
    assert!(matches!(
        p.render("B", "{}"),
        Err(ReportError::CyclicIncludeError(ref chain)) if chain == &["B", "A", "B"]
    ));
}

// ═════════════════════════════════════════════════════════════════════
// 7. Decode failures
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_document_decode_errors() {
    let p = pipeline(&[("T", "x")]);
    for doc in ["", "{", "[1]", "true"] {
        let err = p.render("T", doc).unwrap_err();
        assert!(matches!(err, ReportError::DocumentDecodeError(_)), "{doc:?}");
        assert_eq!(err.exit_code(), 3);
    }
}

// ═════════════════════════════════════════════════════════════════════
// 8. Determinism and sharing
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_render_is_deterministic() {
    let p = pipeline(&[
        ("Header", HEADER),
        ("Footer", FOOTER),
        ("Report", "{% for kv in Map %}{{ kv[0] }}{% endfor %}{{ Map }}"),
    ]);
    let doc = r#"{"Map": {"z": 1, "a": [2, 3], "m": {"k": null}}}"#;
    let first = p.render("Report", doc).unwrap();
    for _ in 0..10 {
        assert_eq!(p.render("Report", doc).unwrap(), first);
    }
    assert_eq!(first, r#"amz{"a":[2,3],"m":{"k":null},"z":1}"#);
}

#[test]
fn test_pipeline_shared_across_threads() {
    let p = Arc::new(pipeline(&[("Greet", "Hello {{ Name }}!")]));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let p = Arc::clone(&p);
            thread::spawn(move || p.render("Greet", &format!(r#"{{"Name": "user{i}"}}"#)))
        })
        .collect();
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join().unwrap().unwrap(), format!("Hello user{i}!"));
    }
}

// ═════════════════════════════════════════════════════════════════════
// 9. Full report: header, body, footer
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_header_footer_report() {
    let entry = format!("{{% include Header %}} {REPORT_BODY} {{% include Footer %}}");
    let p = pipeline(&[("Header", HEADER), ("Footer", FOOTER), ("ReportTemplate", &entry)]);

    let out = p.render("ReportTemplate", REPORT_DATA).unwrap();

    let expected = concat!(
        "<html><body><H1>Riod</H1>",
        "<h1>Dean Ledet</h1><h2>DEAN</h2>",
        "<h2><b>Phone</b>&nbsp; : 678</h2>",
        "<h2><b>devices&nbsp; : <ul><li>Surface</li><li>Windows Phone</li><li>Monitors</li></ul>",
        "<br/><p>Private and confidential</p></body></html>",
        "  ",
        "<br/><p>Private and confidential</p></body></html>",
    );
    assert_eq!(out, expected);
}

#[test]
fn test_report_compiles_includes_in_source_order() {
    let entry = format!("{{% include Header %}} {REPORT_BODY} {{% include Footer %}}");
    let p = pipeline(&[("Header", HEADER), ("Footer", FOOTER), ("ReportTemplate", &entry)]);
    let compiled = p.compile("ReportTemplate").unwrap();
    assert_eq!(compiled.included_templates(), vec!["Header", "Footer", "Footer"]);
    assert!(p.check_all().is_empty());
}

// ═════════════════════════════════════════════════════════════════════
// 10. Errors carry the template they came from
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_syntax_error_in_include_reports_include() {
    let p = pipeline(&[("Body", "ok {% include Part %}"), ("Part", "line one\n{% if %}")]);
    let err = p.render("Body", "{}").unwrap_err();
    assert!(matches!(
        err,
        ReportError::TemplateSyntaxError { ref template, line: Some(2), .. } if template == "Part"
    ));
    assert!(err.to_string().starts_with("Template syntax error in 'Part' at line 2"));
}

#[test]
fn test_execution_error_exit_code() {
    let p = pipeline(&[("T", "{{ 10 | modulo: 0 }}")]);
    let err = p.render("T", "{}").unwrap_err();
    assert!(matches!(err, ReportError::TemplateExecutionError { ref template, .. } if template == "T"));
    assert_eq!(err.exit_code(), 6);
}

#[test]
fn test_strict_variables_through_settings() {
    let p = pipeline(&[("T", "{{ User.Middle }}")]).with_settings(RenderSettings {
        strict_variables: true,
        ..RenderSettings::default()
    });
    let err = p.render("T", r#"{"User": {}}"#).unwrap_err();
    assert!(err.to_string().contains("User.Middle"));
}

// ═════════════════════════════════════════════════════════════════════
// 11. Large and deeply nested inputs
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_repeated_lookups_into_large_document() {
    let big: Vec<u32> = (0..20_000).collect();
    let data = json!({ "big": big }).to_string();
    let p = pipeline(&[("T", "{% for i in (0..19999) %}{{ big.size }}{% endfor %}")]);
    let out = p.render("T", &data).unwrap();
    assert_eq!(out, "20000".repeat(20_000));
}

#[test]
fn test_indexing_large_document_by_loop_variable() {
    let rows: Vec<serde_json::Value> = (0..5_000).map(|i| json!({ "id": i })).collect();
    let data = json!({ "report": { "rows": rows } }).to_string();
    let p = pipeline(&[(
        "T",
        "{% assign total = 0 %}{% for i in (0..4999) %}\
         {% assign total = total | plus: report.rows[i].id %}{% endfor %}{{ total }}",
    )]);
    assert_eq!(p.render("T", &data).unwrap(), "12497500");
}

#[test]
fn test_deeply_nested_blocks_are_a_syntax_error() {
    let depth = 20_000;
    let source = format!("{}x{}", "{% if true %}".repeat(depth), "{% endif %}".repeat(depth));
    let p = pipeline(&[("Deep", source.as_str())]);
    let err = p.render("Deep", "{}").unwrap_err();
    assert!(matches!(
        err,
        ReportError::TemplateSyntaxError { ref template, line: Some(1), .. } if template == "Deep"
    ));
    assert_eq!(err.exit_code(), 5);
}

#[test]
fn test_nesting_limit_through_settings() {
    let source = format!("{}x{}", "{% if true %}".repeat(150), "{% endif %}".repeat(150));
    let p = pipeline(&[("T", source.as_str())]);
    assert!(p.render("T", "{}").is_err());

    let relaxed = p.with_settings(RenderSettings {
        max_nesting_depth: 200,
        ..RenderSettings::default()
    });
    assert_eq!(relaxed.render("T", "{}").unwrap(), "x");
}
