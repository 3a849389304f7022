//! Reading host-local files named by absolute path.
//!
//! A local file is scanned under its base name, so the caller's directory
//! layout never reaches the workspace. The path must already be canonical:
//! paths that resolve through a symbolic link are rejected rather than
//! followed.

use std::fs;
use std::path::{Component, Path, PathBuf};

use scanbox_core::FilePayload;
use tracing::debug;

use crate::error::WorkspaceError;

const LOCAL_TARGET: &str = "scanbox_workspace::local";

/// Reads each path into a payload named after the file's base name.
///
/// # Errors
///
/// Returns [`WorkspaceError::InvalidFile`] for a path that is relative, has
/// no file name, resolves through a symbolic link, or cannot be read as
/// UTF-8 text.
pub fn read_local_files(paths: &[PathBuf]) -> Result<Vec<FilePayload>, WorkspaceError> {
    let payloads = paths
        .iter()
        .map(|path| read_local_file(path))
        .collect::<Result<Vec<_>, _>>()?;
    if !payloads.is_empty() {
        debug!(target: LOCAL_TARGET, files = payloads.len(), "read local files");
    }
    Ok(payloads)
}

fn read_local_file(path: &Path) -> Result<FilePayload, WorkspaceError> {
    let shown = path.display().to_string();
    if !path.is_absolute() {
        return Err(WorkspaceError::invalid_file(&shown, "must be an absolute path"));
    }
    let Some(name) = path.file_name() else {
        return Err(WorkspaceError::invalid_file(&shown, "does not name a file"));
    };

    let canonical = fs::canonicalize(path)
        .map_err(|error| WorkspaceError::invalid_file(&shown, format!("cannot be read: {error}")))?;
    if canonical != lexical(path) {
        return Err(WorkspaceError::invalid_file(
            &shown,
            "resolves through a symbolic link or '..' segment",
        ));
    }
    let content = fs::read_to_string(&canonical)
        .map_err(|error| WorkspaceError::invalid_file(&shown, format!("cannot be read: {error}")))?;

    Ok(FilePayload::new(name.to_string_lossy(), content))
}

/// `path` with `.` segments and repeated separators removed.
fn lexical(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;

    struct Tree {
        _dir: TempDir,
        root: PathBuf,
    }

    #[fixture]
    fn tree() -> Tree {
        let dir = TempDir::new().expect("temp dir");
        let root = fs::canonicalize(dir.path()).expect("canonical temp dir");
        fs::create_dir(root.join("src")).expect("src dir");
        fs::write(root.join("src/app.py"), "eval(x)\n").expect("app.py");
        Tree { _dir: dir, root }
    }

    #[rstest]
    fn local_files_are_keyed_by_base_name(tree: Tree) {
        let payloads = read_local_files(&[tree.root.join("src/app.py")]).expect("read");

        assert_eq!(payloads, [FilePayload::new("app.py", "eval(x)\n")]);
    }

    #[rstest]
    fn current_dir_segments_are_tolerated(tree: Tree) {
        let path = tree.root.join("./src/./app.py");

        let payloads = read_local_files(&[path]).expect("read");

        assert_eq!(payloads[0].path, "app.py");
    }

    #[rstest]
    #[case::relative(PathBuf::from("src/app.py"), "must be an absolute path")]
    #[case::root(PathBuf::from("/"), "does not name a file")]
    fn unusable_paths_are_invalid_files(#[case] path: PathBuf, #[case] expected: &str) {
        let error = read_local_files(&[path]).expect_err("rejected");

        assert!(
            matches!(&error, WorkspaceError::InvalidFile { reason, .. } if reason == expected),
            "{error}"
        );
    }

    #[rstest]
    fn missing_files_cannot_be_read(tree: Tree) {
        let error = read_local_files(&[tree.root.join("gone.py")]).expect_err("missing");

        assert!(
            matches!(&error, WorkspaceError::InvalidFile { reason, .. } if reason.starts_with("cannot be read")),
            "{error}"
        );
    }

    #[rstest]
    fn parent_segments_are_not_followed(tree: Tree) {
        let path = tree.root.join("src/../src/app.py");

        let error = read_local_files(&[path]).expect_err("not canonical");

        assert!(matches!(error, WorkspaceError::InvalidFile { .. }));
    }

    #[cfg(unix)]
    #[rstest]
    fn symlinks_are_not_followed(tree: Tree) {
        let link = tree.root.join("link.py");
        std::os::unix::fs::symlink(tree.root.join("src/app.py"), &link).expect("symlink");

        let error = read_local_files(&[link]).expect_err("symlink rejected");

        assert!(matches!(error, WorkspaceError::InvalidFile { .. }));
    }

    #[rstest]
    fn non_utf8_content_is_rejected(tree: Tree) {
        let path = tree.root.join("blob.bin");
        fs::write(&path, [0xff, 0xfe, 0x00]).expect("binary file");

        let error = read_local_files(&[path]).expect_err("not text");

        assert!(matches!(error, WorkspaceError::InvalidFile { .. }));
    }
}
