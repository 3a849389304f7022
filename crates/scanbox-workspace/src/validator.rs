//! Lexical containment checks for caller-supplied file names.
//!
//! Validation never touches the filesystem. A name is accepted only when it is
//! relative and, after resolving `.` and `..` segments, names a strict
//! descendant of the base directory.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Why a file name was rejected by [`safe_join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalKind {
    /// The name is absolute or carries a drive prefix.
    Absolute,
    /// A `..` segment climbs above the base directory.
    EscapesBase,
    /// The name resolves to the base directory itself.
    ResolvesToBase,
    /// The name contains a NUL byte.
    NulByte,
}

impl fmt::Display for TraversalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Absolute => "absolute paths are not allowed",
            Self::EscapesBase => "path escapes the workspace",
            Self::ResolvesToBase => "path does not name a file inside the workspace",
            Self::NulByte => "path contains a NUL byte",
        };
        f.write_str(text)
    }
}

/// A caller-supplied name that would resolve outside the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rejected path '{path}': {kind}")]
pub struct PathTraversal {
    /// The offending name, as supplied.
    pub path: String,
    /// Why it was rejected.
    pub kind: TraversalKind,
}

impl PathTraversal {
    fn new(path: &str, kind: TraversalKind) -> Self {
        Self {
            path: path.to_owned(),
            kind,
        }
    }
}

/// Joins `untrusted` onto `base`, rejecting anything that is not a strict
/// descendant of `base`.
///
/// # Errors
///
/// Returns [`PathTraversal`] when `untrusted` is absolute, contains a NUL
/// byte, climbs above `base`, or resolves to `base` itself.
pub fn safe_join(base: &Path, untrusted: &str) -> Result<PathBuf, PathTraversal> {
    if untrusted.contains('\0') {
        return Err(PathTraversal::new(untrusted, TraversalKind::NulByte));
    }

    let mut segments = Vec::new();
    for component in Path::new(untrusted).components() {
        match component {
            Component::Normal(segment) => segments.push(segment),
            Component::CurDir => {}
            Component::ParentDir => {
                if segments.pop().is_none() {
                    return Err(PathTraversal::new(untrusted, TraversalKind::EscapesBase));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(PathTraversal::new(untrusted, TraversalKind::Absolute));
            }
        }
    }

    if segments.is_empty() {
        return Err(PathTraversal::new(untrusted, TraversalKind::ResolvesToBase));
    }

    let mut joined = base.to_path_buf();
    joined.extend(segments);
    Ok(joined)
}
