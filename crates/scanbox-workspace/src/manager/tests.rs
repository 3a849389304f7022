//! Unit tests for workspace lifecycle management.

use std::fs;

use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::validator::TraversalKind;

struct Fixture {
    parent: TempDir,
    manager: WorkspaceManager,
}

#[fixture]
fn managed() -> Fixture {
    let parent = TempDir::new().expect("create parent dir");
    let manager = WorkspaceManager::with_parent(parent.path());
    Fixture { parent, manager }
}

fn payload(path: &str, content: &str) -> FilePayload {
    FilePayload::new(path, content)
}

fn entries(dir: &Path) -> Vec<PathBuf> {
    let mut listed: Vec<_> = fs::read_dir(dir)
        .expect("list dir")
        .map(|entry| entry.expect("dir entry").path())
        .collect();
    listed.sort();
    listed
}

#[rstest]
fn create_makes_private_empty_directory(managed: Fixture) {
    let request_id = Uuid::new_v4();
    let workspace = managed.manager.create(request_id).expect("create workspace");

    assert!(workspace.root().is_dir());
    let parent = fs::canonicalize(managed.parent.path()).expect("canonical parent");
    assert!(workspace.root().starts_with(parent));
    assert!(entries(workspace.root()).is_empty());
    assert_eq!(workspace.request_id(), request_id);
    let name = workspace
        .root()
        .file_name()
        .and_then(|name| name.to_str())
        .expect("utf-8 name");
    assert!(name.starts_with(&format!("scanbox-{}-", request_id.simple())));

    #[cfg(unix)]
    {
        let mode = fs::metadata(workspace.root())
            .expect("metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}

#[rstest]
fn concurrent_workspaces_are_distinct(managed: Fixture) {
    let first = managed.manager.create(Uuid::new_v4()).expect("first");
    let second = managed.manager.create(Uuid::new_v4()).expect("second");
    assert_ne!(first.root(), second.root());
}

#[rstest]
fn materialize_writes_nested_files(managed: Fixture) {
    let workspace = managed.manager.create(Uuid::new_v4()).expect("create");
    let files = vec![
        payload("app.py", "print('hi')\n"),
        payload("pkg/util/helpers.py", "def f():\n    pass\n"),
    ];

    let written = workspace.materialize(&files).expect("materialize");

    assert_eq!(written.len(), 2);
    assert_eq!(
        fs::read_to_string(workspace.root().join("app.py")).expect("read"),
        "print('hi')\n"
    );
    assert_eq!(
        fs::read_to_string(workspace.root().join("pkg/util/helpers.py")).expect("read"),
        "def f():\n    pass\n"
    );
}

#[rstest]
fn traversal_rejects_whole_request_before_writing(managed: Fixture) {
    let workspace = managed.manager.create(Uuid::new_v4()).expect("create");
    let files = vec![
        payload("ok.py", "x = 1\n"),
        payload("../../etc/passwd", "root::0:0\n"),
    ];

    let error = workspace.materialize(&files).expect_err("traversal");

    assert!(matches!(error, WorkspaceError::InvalidFile { .. }));
    assert_eq!(
        error.traversal().map(|traversal| traversal.kind),
        Some(TraversalKind::EscapesBase)
    );
    assert!(entries(workspace.root()).is_empty(), "nothing may be written");
}

#[rstest]
#[case::empty("")]
#[case::blank("   ")]
fn empty_names_are_invalid_files(managed: Fixture, #[case] name: &str) {
    let workspace = managed.manager.create(Uuid::new_v4()).expect("create");
    let error = workspace
        .materialize(&[payload(name, "x")])
        .expect_err("empty name");
    assert!(matches!(error, WorkspaceError::InvalidFile { .. }));
    assert!(error.traversal().is_none());
}

#[rstest]
#[case::absolute("/etc/passwd", TraversalKind::Absolute)]
#[case::dot(".", TraversalKind::ResolvesToBase)]
fn unsafe_names_are_invalid_files(
    managed: Fixture,
    #[case] name: &str,
    #[case] kind: TraversalKind,
) {
    let workspace = managed.manager.create(Uuid::new_v4()).expect("create");
    let error = workspace
        .materialize(&[payload(name, "x")])
        .expect_err("unsafe name");
    assert_eq!(error.traversal().map(|traversal| traversal.kind), Some(kind));
}

#[rstest]
fn duplicate_names_are_invalid_files(managed: Fixture) {
    let workspace = managed.manager.create(Uuid::new_v4()).expect("create");
    let files = vec![payload("a.py", "1"), payload("./a.py", "2")];
    let error = workspace.materialize(&files).expect_err("duplicate");
    assert!(matches!(error, WorkspaceError::InvalidFile { .. }));
}

#[rstest]
fn rule_file_lives_outside_scanned_tree(managed: Fixture) {
    let mut workspace = managed.manager.create(Uuid::new_v4()).expect("create");

    let rule_path = workspace
        .write_rule_file("rules:\n  - id: demo\n")
        .expect("write rules");

    assert!(!rule_path.starts_with(workspace.root()));
    assert_eq!(rule_path.parent(), workspace.root().parent());
    assert_eq!(
        fs::read_to_string(&rule_path).expect("read rules"),
        "rules:\n  - id: demo\n"
    );

    workspace.destroy().expect("destroy");
    assert!(!rule_path.exists());
}

#[cfg(unix)]
#[rstest]
fn root_is_canonical_when_parent_is_a_symlink(managed: Fixture) {
    let real = managed.parent.path().join("real");
    let link = managed.parent.path().join("link");
    fs::create_dir(&real).expect("real parent");
    std::os::unix::fs::symlink(&real, &link).expect("symlinked parent");
    let manager = WorkspaceManager::with_parent(&link);

    let workspace = manager.create(Uuid::new_v4()).expect("create");

    let canonical = fs::canonicalize(workspace.root()).expect("canonicalize root");
    assert_eq!(workspace.root(), canonical);
    assert!(workspace.root().starts_with(fs::canonicalize(&real).expect("canonical real")));
}

#[rstest]
fn scrub_hides_root_and_rule_files(managed: Fixture) {
    let mut workspace = managed.manager.create(Uuid::new_v4()).expect("create");
    let rule_path = workspace.write_rule_file("rules: []\n").expect("write rules");
    let text = format!(
        "Invalid rule schema --> {}:3 while scanning {}/app.py",
        rule_path.display(),
        workspace.root().display()
    );

    let scrubbed = workspace.scrub(&text);

    assert_eq!(
        scrubbed,
        "Invalid rule schema --> <inline-rules>:3 while scanning app.py"
    );
    assert_eq!(workspace.rule_files(), [rule_path]);
}

#[rstest]
fn destroy_is_idempotent(managed: Fixture) {
    let mut workspace = managed.manager.create(Uuid::new_v4()).expect("create");
    workspace
        .materialize(&[payload("a/b.py", "x")])
        .expect("materialize");

    workspace.destroy().expect("first destroy");
    workspace.destroy().expect("second destroy");

    assert!(workspace.is_destroyed());
    assert!(!workspace.root().exists());
}

#[rstest]
fn destroy_tolerates_externally_removed_root(managed: Fixture) {
    let mut workspace = managed.manager.create(Uuid::new_v4()).expect("create");
    fs::remove_dir_all(workspace.root()).expect("remove behind the manager's back");
    workspace.destroy().expect("destroy");
}

#[rstest]
fn guard_removes_workspace_on_drop(managed: Fixture) {
    let root = {
        let guard = managed.manager.acquire(Uuid::new_v4()).expect("acquire");
        guard
            .materialize(&[payload("a.py", "x")])
            .expect("materialize");
        guard.root().to_path_buf()
    };
    assert!(!root.exists());
    assert!(entries(managed.parent.path()).is_empty());
}

#[rstest]
fn guard_removes_workspace_when_scope_unwinds(managed: Fixture) {
    let parent = managed.parent.path().to_path_buf();
    let manager = managed.manager.clone();
    let outcome = std::panic::catch_unwind(move || {
        let _guard = manager.acquire(Uuid::new_v4()).expect("acquire");
        panic!("scan aborted");
    });

    assert!(outcome.is_err());
    assert!(entries(&parent).is_empty());
}

#[rstest]
fn release_reports_success(managed: Fixture) {
    let guard = managed.manager.acquire(Uuid::new_v4()).expect("acquire");
    let root = guard.root().to_path_buf();
    guard.release().expect("release");
    assert!(!root.exists());
}

#[test]
fn create_reports_missing_parent() {
    let parent = TempDir::new().expect("parent");
    let missing = parent.path().join("does-not-exist");
    let manager = WorkspaceManager::with_parent(&missing);

    let error = manager.create(Uuid::new_v4()).expect_err("missing parent");

    assert!(matches!(error, WorkspaceError::Create { parent, .. } if parent == missing));
}
