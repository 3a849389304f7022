//! Unit tests for result path normalization.

use std::path::{Path, PathBuf};

use rstest::{fixture, rstest};

use super::*;
use crate::result::{EngineDiagnostic, Finding, Position, Severity, SkippedPath};

const ROOT: &str = "/tmp/scanbox-42-abc";
const RULES: &str = "/tmp/scanbox-42-rules-xyz.yml";

fn finding(path: &str, message: &str) -> Finding {
    Finding {
        rule_id: "demo".to_owned(),
        message: message.to_owned(),
        severity: Severity::Error,
        path: path.to_owned(),
        start: Position::new(1, 1),
        end: Position::new(1, 2),
        lines: None,
    }
}

#[fixture]
fn engine_result() -> ScanResult {
    ScanResult {
        version: Some("1.0.0".to_owned()),
        findings: vec![finding(
            "/tmp/scanbox-42-abc/src/app.py",
            "tainted value flows into /tmp/scanbox-42-abc/src/app.py",
        )],
        errors: vec![EngineDiagnostic {
            kind: "Syntax error".to_owned(),
            level: Some("warn".to_owned()),
            message: "could not parse /tmp/scanbox-42-abc/bad.py".to_owned(),
            path: Some("/tmp/scanbox-42-abc/bad.py".to_owned()),
            rule_id: None,
        }],
        scanned_paths: vec![
            "/tmp/scanbox-42-abc/src/app.py".to_owned(),
            "/tmp/scanbox-42-abc/bad.py".to_owned(),
        ],
        skipped_paths: vec![SkippedPath {
            path: "/tmp/scanbox-42-abc/node_modules/x.js".to_owned(),
            reason: Some("ignored".to_owned()),
        }],
        skipped_rules: Vec::new(),
    }
}

#[rstest]
fn rewrites_every_path_field(engine_result: ScanResult) {
    let normalized = strip(engine_result, Path::new(ROOT));
    let result = normalized.result;

    assert!(normalized.warnings.is_empty());
    assert_eq!(result.findings[0].path, "src/app.py");
    assert_eq!(result.errors[0].path.as_deref(), Some("bad.py"));
    assert_eq!(result.scanned_paths, vec!["src/app.py", "bad.py"]);
    assert_eq!(result.skipped_paths[0].path, "node_modules/x.js");
}

#[rstest]
fn scrubs_root_from_messages(engine_result: ScanResult) {
    let result = strip(engine_result, Path::new(ROOT)).result;

    assert_eq!(
        result.findings[0].message,
        "tainted value flows into src/app.py"
    );
    assert_eq!(result.errors[0].message, "could not parse bad.py");
}

#[rstest]
fn outside_paths_are_kept_and_reported(mut engine_result: ScanResult) {
    engine_result.scanned_paths.push("/etc/passwd".to_owned());
    // Sibling directory sharing the root as a textual prefix.
    engine_result
        .scanned_paths
        .push("/tmp/scanbox-42-abcdef/x.py".to_owned());

    let normalized = strip(engine_result, Path::new(ROOT));

    assert!(
        normalized
            .result
            .scanned_paths
            .contains(&"/etc/passwd".to_owned())
    );
    assert_eq!(normalized.warnings.len(), 2);
    assert_eq!(normalized.warnings[0].field, "paths.scanned");
    assert_eq!(normalized.warnings[0].path, "/etc/passwd");
}

#[rstest]
#[case::root_itself(ROOT, ".")]
#[case::trailing_slash("/tmp/scanbox-42-abc/", ".")]
#[case::nested("/tmp/scanbox-42-abc/a/b/c.py", "a/b/c.py")]
#[case::relative("lib/x.py", "lib/x.py")]
#[case::dot_relative("./lib/x.py", "lib/x.py")]
fn normalizes_single_paths(#[case] input: &str, #[case] expected: &str) {
    let result = ScanResult {
        scanned_paths: vec![input.to_owned()],
        ..ScanResult::default()
    };
    let normalized = strip(result, Path::new(ROOT));
    assert_eq!(normalized.result.scanned_paths, vec![expected.to_owned()]);
}

#[rstest]
fn normalization_is_idempotent(engine_result: ScanResult) {
    let once = strip(engine_result, Path::new(ROOT)).result;
    let twice = strip(once.clone(), Path::new(ROOT)).result;
    assert_eq!(once, twice);
}

#[rstest]
#[case::nested("error in /tmp/scanbox-42-abc/app.py: bad", "error in app.py: bad")]
#[case::bare("cwd is /tmp/scanbox-42-abc", "cwd is .")]
#[case::untouched("nothing to see", "nothing to see")]
fn scrubs_free_text(#[case] input: &str, #[case] expected: &str) {
    assert_eq!(scrub_text(input, Path::new(ROOT)), expected);
}

#[rstest]
fn scrubs_root_from_matched_lines_and_skip_reasons(mut engine_result: ScanResult) {
    engine_result.findings[0].lines = Some("open('/tmp/scanbox-42-abc/secrets.txt')".to_owned());
    engine_result.skipped_paths[0].reason =
        Some("/tmp/scanbox-42-abc/node_modules matched .semgrepignore".to_owned());

    let result = strip(engine_result, Path::new(ROOT)).result;

    assert_eq!(
        result.findings[0].lines.as_deref(),
        Some("open('secrets.txt')")
    );
    assert_eq!(
        result.skipped_paths[0].reason.as_deref(),
        Some("node_modules matched .semgrepignore")
    );
}

#[rstest]
fn rule_file_paths_become_a_label(mut engine_result: ScanResult) {
    engine_result.errors.push(EngineDiagnostic {
        kind: "Rule parse error".to_owned(),
        level: Some("error".to_owned()),
        message: format!("Invalid rule schema --> {RULES}:3"),
        path: Some(RULES.to_owned()),
        rule_id: None,
    });
    let rule_files = vec![PathBuf::from(RULES)];

    let redacted = redact_rule_files(engine_result, &rule_files);
    let normalized = strip(redacted, Path::new(ROOT));

    let diagnostic = &normalized.result.errors[1];
    assert_eq!(diagnostic.path.as_deref(), Some(INLINE_RULES_LABEL));
    assert_eq!(diagnostic.message, "Invalid rule schema --> <inline-rules>:3");
    assert!(normalized.warnings.is_empty());
}

#[rstest]
#[case::mentioned(format!("cannot read {RULES}"), "cannot read <inline-rules>")]
#[case::absent("nothing to see".to_owned(), "nothing to see")]
fn redacts_rule_files_from_free_text(#[case] input: String, #[case] expected: &str) {
    assert_eq!(redact_text(&input, &[PathBuf::from(RULES)]), expected);
}
