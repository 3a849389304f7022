//! Errors raised while managing scan workspaces.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::validator::PathTraversal;

/// Errors raised while creating, populating, or removing a workspace.
#[derive(Debug, Clone, Error)]
pub enum WorkspaceError {
    /// A file entry is empty, duplicated, or resolves outside the workspace.
    #[error("invalid file '{path}': {reason}")]
    InvalidFile {
        /// The offending name, as supplied.
        path: String,
        /// Why it was rejected.
        reason: String,
        /// Containment failure, when that was the cause.
        #[source]
        traversal: Option<PathTraversal>,
    },

    /// The workspace directory could not be created.
    #[error("failed to create workspace under {parent}: {source}")]
    Create {
        /// Directory the workspace was being created in.
        parent: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// Writing or removing a workspace file failed.
    #[error("workspace I/O failed for {path}: {source}")]
    Io {
        /// Path being written or removed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

impl From<PathTraversal> for WorkspaceError {
    fn from(traversal: PathTraversal) -> Self {
        Self::InvalidFile {
            path: traversal.path.clone(),
            reason: traversal.kind.to_string(),
            traversal: Some(traversal),
        }
    }
}

impl WorkspaceError {
    pub(crate) fn invalid_file(path: &str, reason: impl Into<String>) -> Self {
        Self::InvalidFile {
            path: path.to_owned(),
            reason: reason.into(),
            traversal: None,
        }
    }

    /// Returns the containment failure behind an [`Self::InvalidFile`].
    #[must_use]
    pub const fn traversal(&self) -> Option<&PathTraversal> {
        match self {
            Self::InvalidFile {
                traversal: Some(traversal),
                ..
            } => Some(traversal),
            _ => None,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }
}
