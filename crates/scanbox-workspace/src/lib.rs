//! Per-request scan workspaces.
//!
//! A workspace is a private directory, created fresh for each scan request,
//! into which the caller's in-memory files are written before the engine runs.
//! Every caller-supplied name passes through [`safe_join`] so nothing can be
//! written outside the workspace root. [`WorkspaceGuard`] removes the
//! directory on every exit path, including unwinding.
//!
//! Files the caller names by absolute host path are read by
//! [`read_local_files`] and then materialized like any other payload.

mod error;
mod local;
mod manager;
mod validator;

pub use error::WorkspaceError;
pub use local::read_local_files;
pub use manager::{Workspace, WorkspaceGuard, WorkspaceManager};
pub use validator::{PathTraversal, TraversalKind, safe_join};

#[cfg(test)]
mod tests;
