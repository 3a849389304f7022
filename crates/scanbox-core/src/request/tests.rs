//! Unit tests for request validation.

use rstest::rstest;

use super::*;

fn request() -> ScanRequest {
    ScanRequest::new(vec![FilePayload::new("app.py", "print(1)\n")])
}

#[rstest]
#[case::auto(RuleSpec::Auto)]
#[case::auto_reference(RuleSpec::Config("auto".to_owned()))]
#[case::pack(RuleSpec::Config("p/python".to_owned()))]
#[case::rule(RuleSpec::Config("r/python.lang.security.audit".to_owned()))]
#[case::absolute(RuleSpec::Config("/etc/scanbox/rules.yml".to_owned()))]
fn accepts_valid_rule_sources(#[case] rule: RuleSpec) {
    assert_eq!(rule.validate(), Ok(()));
}

#[rstest]
#[case::relative("rules.yml")]
#[case::current("/etc/./rules.yml")]
#[case::empty("")]
fn rejects_unusable_config_references(#[case] reference: &str) {
    let result = RuleSpec::Config(reference.to_owned()).validate();
    assert!(
        matches!(result, Err(RequestError::InvalidRule { .. })),
        "'{reference}' should be rejected, got {result:?}"
    );
}

#[test]
fn parent_segments_in_rule_paths_are_traversals() {
    let result = RuleSpec::Config("/etc/scanbox/../shadow".to_owned()).validate();
    assert!(matches!(result, Err(RequestError::RulePathTraversal { .. })));
}

#[test]
fn accepts_inline_rules_document() {
    let yaml = concat!(
        "rules:\n",
        "  - id: no-eval\n",
        "    pattern: eval(...)\n",
        "    message: avoid eval\n",
        "    languages: [python]\n",
        "    severity: ERROR\n",
    );
    assert_eq!(RuleSpec::Inline(yaml.to_owned()).validate(), Ok(()));
}

#[rstest]
#[case::not_yaml("rules: [unterminated")]
#[case::missing_rules("pattern: eval(...)\n")]
#[case::empty_rules("rules: []\n")]
#[case::rule_without_id("rules:\n  - pattern: eval(...)\n")]
fn rejects_malformed_inline_rules(#[case] yaml: &str) {
    let result = RuleSpec::Inline(yaml.to_owned()).validate();
    assert!(matches!(result, Err(RequestError::InvalidRule { .. })));
}

#[test]
fn rejects_empty_file_list() {
    let empty = ScanRequest::new(Vec::new());
    assert_eq!(empty.validate(), Err(RequestError::NoFiles));
}

#[test]
fn local_files_alone_are_enough() {
    let local = ScanRequest::new(Vec::new())
        .with_local_files(vec![PathBuf::from("/srv/project/app.py")]);
    assert_eq!(local.validate(), Ok(()));
}

#[rstest]
#[case::relative("src/app.py", "must be an absolute path")]
#[case::parent_segments("/srv/project/../secrets/app.py", "contains '..' segments")]
#[case::root("/", "does not name a file")]
fn rejects_unusable_local_paths(#[case] path: &str, #[case] reason: &str) {
    let local = request().with_local_files(vec![PathBuf::from(path)]);
    assert_eq!(
        local.validate(),
        Err(RequestError::LocalPath {
            path: path.to_owned(),
            reason: reason.to_owned(),
        })
    );
}

#[test]
fn deserializes_local_files() {
    let json = r#"{"local_files":["/srv/project/app.py"]}"#;
    let parsed: ScanRequest = serde_json::from_str(json).expect("valid request");

    assert!(parsed.files.is_empty());
    assert_eq!(parsed.local_files, [PathBuf::from("/srv/project/app.py")]);
    assert_eq!(parsed.validate(), Ok(()));
}

#[test]
fn rejects_zero_timeout() {
    let zero = request().with_timeout(Duration::ZERO);
    assert_eq!(zero.validate(), Err(RequestError::ZeroTimeout));
}

#[rstest]
#[case::one_past_the_limit(MAX_TIMEOUT_SECS + 1)]
#[case::largest_wire_value(u64::MAX)]
fn rejects_timeouts_beyond_the_limit(#[case] secs: u64) {
    let mut oversized = request();
    oversized.timeout_secs = Some(secs);
    assert_eq!(
        oversized.validate(),
        Err(RequestError::TimeoutTooLong {
            max_secs: MAX_TIMEOUT_SECS
        })
    );
}

#[test]
fn accepts_the_longest_permitted_timeout() {
    let longest = request().with_timeout(Duration::from_secs(MAX_TIMEOUT_SECS));
    assert_eq!(longest.validate(), Ok(()));
}

#[test]
fn deserializes_wire_form_with_defaults() {
    let json = r#"{"files":[{"path":"src/app.py","content":"x = 1\n"}]}"#;
    let parsed: ScanRequest = serde_json::from_str(json).expect("valid request");

    assert_eq!(parsed.rule, RuleSpec::Auto);
    assert_eq!(parsed.timeout(), None);
    assert_eq!(parsed.files[0].path, "src/app.py");
}

#[test]
fn deserializes_tagged_rule_and_timeout() {
    let json = r#"{
        "files":[{"path":"a.py","content":""}],
        "rule":{"kind":"config","value":"p/python"},
        "timeout_secs":5
    }"#;
    let parsed: ScanRequest = serde_json::from_str(json).expect("valid request");

    assert_eq!(parsed.rule, RuleSpec::Config("p/python".to_owned()));
    assert_eq!(parsed.timeout(), Some(Duration::from_secs(5)));
    assert_eq!(parsed.validate(), Ok(()));
}
