//! Creation, population, and removal of per-request workspaces.

use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use scanbox_core::{FilePayload, redact_text, scrub_text};
use tempfile::Builder;
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use crate::error::WorkspaceError;
use crate::validator::safe_join;

const WORKSPACE_TARGET: &str = "scanbox_workspace::manager";
const RULE_FILE_SUFFIX: &str = ".yml";

/// Creates private workspaces under a parent directory.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceManager {
    parent: Option<PathBuf>,
}

impl WorkspaceManager {
    /// Creates a manager that places workspaces in the system temp directory.
    #[must_use]
    pub const fn new() -> Self {
        Self { parent: None }
    }

    /// Creates a manager that places workspaces under `parent`.
    #[must_use]
    pub fn with_parent(parent: impl Into<PathBuf>) -> Self {
        Self {
            parent: Some(parent.into()),
        }
    }

    /// Creates a fresh, empty workspace owned by the current user.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Create`] when the directory cannot be made.
    pub fn create(&self, request_id: Uuid) -> Result<Workspace, WorkspaceError> {
        let prefix = workspace_prefix(request_id);
        let mut builder = Builder::new();
        builder.prefix(&prefix);
        #[cfg(unix)]
        {
            builder.permissions(fs::Permissions::from_mode(0o700));
        }

        let created = match &self.parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        };
        let dir = created.map_err(|source| WorkspaceError::Create {
            parent: self.parent.clone().unwrap_or_else(std::env::temp_dir),
            source: source.into(),
        })?;
        let root = fs::canonicalize(dir.path()).map_err(|source| WorkspaceError::Create {
            parent: self.parent.clone().unwrap_or_else(std::env::temp_dir),
            source: source.into(),
        })?;
        drop(dir.keep());

        let workspace = Workspace {
            root,
            request_id,
            created_at: OffsetDateTime::now_utc(),
            rule_files: Vec::new(),
            destroyed: false,
        };
        debug!(
            target: WORKSPACE_TARGET,
            request_id = %request_id,
            root = %workspace.root.display(),
            "created workspace"
        );
        Ok(workspace)
    }

    /// Creates a workspace that is destroyed when the returned guard drops.
    ///
    /// # Errors
    ///
    /// Propagates failures from [`Self::create`].
    pub fn acquire(&self, request_id: Uuid) -> Result<WorkspaceGuard, WorkspaceError> {
        self.create(request_id).map(WorkspaceGuard::new)
    }
}

/// A private directory holding one request's files.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    request_id: Uuid,
    created_at: OffsetDateTime,
    rule_files: Vec<PathBuf>,
    destroyed: bool,
}

impl Workspace {
    /// Canonical absolute path of the workspace directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rule files written by [`Self::write_rule_file`] and not yet removed.
    #[must_use]
    pub fn rule_files(&self) -> &[PathBuf] {
        &self.rule_files
    }

    /// Removes every location owned by this workspace from `text`.
    ///
    /// Rule file paths become [`scanbox_core::INLINE_RULES_LABEL`] and paths
    /// under the root become relative.
    #[must_use]
    pub fn scrub(&self, text: &str) -> String {
        scrub_text(&redact_text(text, &self.rule_files), &self.root)
    }

    /// Request this workspace belongs to.
    #[must_use]
    pub const fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    /// Whether [`Self::destroy`] has completed.
    #[must_use]
    pub const fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Writes every payload into the workspace.
    ///
    /// All names are validated before the first byte is written, so a
    /// rejected request leaves the workspace empty. Returns the absolute path
    /// of each written file in input order.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::InvalidFile`] for empty or duplicate names and
    /// for names outside the workspace, and [`WorkspaceError::Io`] when a write
    /// fails.
    pub fn materialize(&self, files: &[FilePayload]) -> Result<Vec<PathBuf>, WorkspaceError> {
        let targets = self.resolve_targets(files)?;
        for (file, target) in files.iter().zip(&targets) {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|error| WorkspaceError::io(parent, error))?;
            }
            fs::write(target, file.content.as_bytes())
                .map_err(|error| WorkspaceError::io(target, error))?;
        }
        debug!(
            target: WORKSPACE_TARGET,
            request_id = %self.request_id,
            files = targets.len(),
            "materialized workspace"
        );
        Ok(targets)
    }

    fn resolve_targets(&self, files: &[FilePayload]) -> Result<Vec<PathBuf>, WorkspaceError> {
        let mut seen = HashSet::with_capacity(files.len());
        let mut targets = Vec::with_capacity(files.len());
        for file in files {
            if file.path.trim().is_empty() {
                return Err(WorkspaceError::invalid_file(&file.path, "file name is empty"));
            }
            let target = safe_join(&self.root, &file.path)?;
            if !seen.insert(target.clone()) {
                return Err(WorkspaceError::invalid_file(
                    &file.path,
                    "file name appears more than once",
                ));
            }
            targets.push(target);
        }
        Ok(targets)
    }

    /// Writes inline rule text to a file owned by this workspace.
    ///
    /// The file lives beside the workspace directory, never inside it, so the
    /// rules are not scanned as part of the caller's tree. It is removed by
    /// [`Self::destroy`].
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Io`] when the file cannot be written.
    pub fn write_rule_file(&mut self, rules: &str) -> Result<PathBuf, WorkspaceError> {
        let parent = self
            .root
            .parent()
            .map_or_else(std::env::temp_dir, Path::to_path_buf);
        let prefix = format!("{}rules-", workspace_prefix(self.request_id));
        let mut builder = Builder::new();
        builder.prefix(&prefix).suffix(RULE_FILE_SUFFIX);
        #[cfg(unix)]
        {
            builder.permissions(fs::Permissions::from_mode(0o600));
        }

        let mut file = builder
            .tempfile_in(&parent)
            .map_err(|error| WorkspaceError::io(&parent, error))?;
        file.write_all(rules.as_bytes())
            .map_err(|error| WorkspaceError::io(file.path(), error))?;
        let (_, path) = file
            .keep()
            .map_err(|error| WorkspaceError::io(&parent, error.error))?;
        self.rule_files.push(path.clone());
        Ok(path)
    }

    /// Removes the workspace directory and any rule files.
    ///
    /// Calling this again after success is a no-op. Entries that are already
    /// gone are not treated as errors.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Io`] when removal fails.
    pub fn destroy(&mut self) -> Result<(), WorkspaceError> {
        if self.destroyed {
            return Ok(());
        }
        ignore_missing(&self.root, fs::remove_dir_all(&self.root))?;
        for rule_file in &self.rule_files {
            ignore_missing(rule_file, fs::remove_file(rule_file))?;
        }
        self.rule_files.clear();
        self.destroyed = true;
        debug!(
            target: WORKSPACE_TARGET,
            request_id = %self.request_id,
            "destroyed workspace"
        );
        Ok(())
    }
}

/// Owns a [`Workspace`] and destroys it on drop.
///
/// Drop cannot report failures, so they are logged instead. Call
/// [`Self::release`] to observe them.
#[derive(Debug)]
pub struct WorkspaceGuard {
    workspace: Workspace,
}

impl WorkspaceGuard {
    /// Wraps an existing workspace.
    #[must_use]
    pub const fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    /// Destroys the workspace now, returning any removal error.
    ///
    /// # Errors
    ///
    /// Propagates failures from [`Workspace::destroy`].
    pub fn release(mut self) -> Result<(), WorkspaceError> {
        self.workspace.destroy()
    }
}

impl Deref for WorkspaceGuard {
    type Target = Workspace;

    fn deref(&self) -> &Self::Target {
        &self.workspace
    }
}

impl DerefMut for WorkspaceGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.workspace
    }
}

impl Drop for WorkspaceGuard {
    fn drop(&mut self) {
        if let Err(error) = self.workspace.destroy() {
            warn!(
                target: WORKSPACE_TARGET,
                request_id = %self.workspace.request_id,
                root = %self.workspace.root.display(),
                %error,
                "failed to remove workspace"
            );
        }
    }
}

fn workspace_prefix(request_id: Uuid) -> String {
    format!("scanbox-{}-", request_id.simple())
}

fn ignore_missing(path: &Path, removal: io::Result<()>) -> Result<(), WorkspaceError> {
    match removal {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(WorkspaceError::io(path, error)),
    }
}

#[cfg(test)]
mod tests;
