//! Unit tests for engine report decoding.

use rstest::rstest;

use super::*;

const FULL_REPORT: &str = r#"{
  "version": "1.86.0",
  "results": [
    {
      "check_id": "python.lang.security.audit.eval-detected",
      "path": "/tmp/scanbox-1/app.py",
      "start": {"line": 3, "col": 5, "offset": 20},
      "end": {"line": 3, "col": 15, "offset": 30},
      "extra": {
        "message": "Detected eval",
        "severity": "WARNING",
        "lines": "    eval(x)",
        "metadata": {"cwe": ["CWE-95"]}
      }
    }
  ],
  "errors": [
    {
      "code": 3,
      "level": "warn",
      "type": ["PartialParsing", [{"path": "/tmp/scanbox-1/bad.py"}]],
      "message": "Syntax error at line 2",
      "path": "/tmp/scanbox-1/bad.py"
    },
    {"level": "error", "type": "Rule parse error", "message": "bad rule", "rule_id": "r1"}
  ],
  "paths": {
    "scanned": ["/tmp/scanbox-1/app.py", "/tmp/scanbox-1/bad.py"],
    "skipped": [
      {"path": "/tmp/scanbox-1/big.min.js", "reason": "exceeded_size_limit"},
      "/tmp/scanbox-1/vendor.js"
    ]
  },
  "skipped_rules": [{"rule_id": "slow-rule", "details": "timeout"}, "other-rule", 7]
}"#;

#[test]
fn decodes_full_report() {
    let result = parse_engine_output(FULL_REPORT).expect("report parses");

    assert_eq!(result.version.as_deref(), Some("1.86.0"));
    let finding = &result.findings[0];
    assert_eq!(finding.rule_id, "python.lang.security.audit.eval-detected");
    assert_eq!(finding.severity, Severity::Warning);
    assert_eq!(finding.start, Position::new(3, 5));
    assert_eq!(finding.end, Position::new(3, 15));
    assert_eq!(finding.lines.as_deref(), Some("    eval(x)"));

    assert_eq!(result.errors.len(), 2);
    assert_eq!(result.errors[0].kind, "PartialParsing");
    assert_eq!(result.errors[1].kind, "Rule parse error");
    assert_eq!(result.errors[1].rule_id.as_deref(), Some("r1"));

    assert_eq!(result.scanned_paths.len(), 2);
    assert_eq!(
        result.skipped_paths[0].reason.as_deref(),
        Some("exceeded_size_limit")
    );
    assert_eq!(result.skipped_paths[1].reason, None);
    assert_eq!(result.skipped_rules, vec!["slow-rule", "other-rule"]);
}

#[test]
fn decodes_minimal_report() {
    let result = parse_engine_output(r#"{"results": []}"#).expect("report parses");
    assert_eq!(result, ScanResult::default());
}

#[test]
fn missing_severity_defaults_to_info() {
    let raw = r#"{"results":[{"check_id":"x","path":"a.py","extra":{"message":"m"}}]}"#;
    let result = parse_engine_output(raw).expect("report parses");
    assert_eq!(result.findings[0].severity, Severity::Info);
}

#[rstest]
#[case::blank("   \n")]
#[case::empty("")]
fn blank_output_is_empty(#[case] raw: &str) {
    assert!(matches!(parse_engine_output(raw), Err(ParseError::Empty)));
}

#[rstest]
#[case::truncated(r#"{"results": ["#)]
#[case::text("semgrep crashed")]
#[case::wrong_shape(r#"{"results": {"check_id": 1}}"#)]
fn invalid_output_is_malformed(#[case] raw: &str) {
    assert!(matches!(
        parse_engine_output(raw),
        Err(ParseError::Malformed { .. })
    ));
}

#[test]
fn decodes_prebuilt_value() {
    let value = serde_json::json!({
        "results": [{"check_id": "x", "path": "a.py", "extra": {"severity": "ERROR"}}]
    });
    let result = parse_engine_value(value).expect("value parses");
    assert_eq!(result.findings[0].severity, Severity::Error);
}
