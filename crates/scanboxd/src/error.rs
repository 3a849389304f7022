//! Errors returned to scan callers.
//!
//! Every variant carries only caller-safe text: request-relative names, engine
//! output with the workspace root scrubbed, and I/O messages without paths.

use std::time::Duration;

use scanbox_core::{ParseError, RequestError};
use scanbox_engine::{EngineError, EngineNotFound, SessionError};
use scanbox_workspace::{Workspace, WorkspaceError};
use thiserror::Error;

use crate::schema::SchemaUnavailable;

/// Why a scan request failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    /// A rule file reference climbs out of its directory.
    #[error("rejected path '{path}': {reason}")]
    PathTraversal {
        /// The reference, as supplied.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A submitted file name is empty, duplicated, or escapes the workspace.
    #[error("invalid file '{path}': {reason}")]
    InvalidFile {
        /// The file name, as supplied.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The request is malformed.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// What is wrong with it.
        reason: String,
    },

    /// No engine executable is available.
    #[error("scan engine not found; {}", .hints.join("; "))]
    EngineNotFound {
        /// Ways to make one available.
        hints: Vec<String>,
    },

    /// The engine could not be started or supervised.
    #[error("failed to start scan engine: {reason}")]
    EngineSpawn {
        /// Underlying failure.
        reason: String,
    },

    /// The engine exceeded the request timeout and was killed.
    #[error("scan timed out after {}s", .timeout.as_secs())]
    EngineTimeout {
        /// Budget that was exceeded.
        timeout: Duration,
    },

    /// The engine reported a failure.
    #[error("scan engine failed: {stderr}")]
    EngineExecution {
        /// Exit code, when the engine exited normally.
        status: Option<i32>,
        /// Engine diagnostics with the workspace root scrubbed.
        stderr: String,
    },

    /// The engine's report could not be decoded.
    #[error("could not parse engine output: {reason}")]
    Parse {
        /// Decoder diagnostic.
        reason: String,
    },

    /// The engine session could not be authenticated.
    #[error("engine session authentication failed: {reason}")]
    Authentication {
        /// What went wrong.
        reason: String,
    },

    /// The engine session cannot serve the request.
    #[error("engine session unavailable: {reason}")]
    Degraded {
        /// What went wrong.
        reason: String,
    },

    /// The caller cancelled the scan.
    #[error("scan was cancelled")]
    Cancelled,

    /// The workspace could not be prepared.
    #[error("workspace error: {reason}")]
    Workspace {
        /// Underlying I/O failure, without paths.
        reason: String,
    },

    /// No rule schema source is available.
    #[error("rule schema unavailable: {reason}")]
    SchemaUnavailable {
        /// What went wrong.
        reason: String,
    },
}

impl ScanError {
    /// Stable snake_case label for the variant, used on the wire.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PathTraversal { .. } => "path_traversal",
            Self::InvalidFile { .. } => "invalid_file",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::EngineNotFound { .. } => "engine_not_found",
            Self::EngineSpawn { .. } => "engine_spawn",
            Self::EngineTimeout { .. } => "engine_timeout",
            Self::EngineExecution { .. } => "engine_execution",
            Self::Parse { .. } => "parse",
            Self::Authentication { .. } => "authentication",
            Self::Degraded { .. } => "degraded",
            Self::Cancelled => "cancelled",
            Self::Workspace { .. } => "workspace",
            Self::SchemaUnavailable { .. } => "schema_unavailable",
        }
    }

    /// Maps an engine failure, scrubbing `workspace` locations from its output.
    #[must_use]
    pub fn from_engine(error: EngineError, workspace: &Workspace) -> Self {
        Self::from_engine_with(error, |stderr| workspace.scrub(stderr))
    }

    /// Maps an engine failure from a run that had no workspace.
    #[must_use]
    pub fn from_engine_unscoped(error: EngineError) -> Self {
        Self::from_engine_with(error, str::to_owned)
    }

    fn from_engine_with(error: EngineError, scrub: impl FnOnce(&str) -> String) -> Self {
        match error {
            EngineError::Execution { status, stderr } => Self::EngineExecution {
                status,
                stderr: scrub(&String::from_utf8_lossy(&stderr)),
            },
            EngineError::Timeout { timeout } => Self::EngineTimeout { timeout },
            EngineError::Cancelled => Self::Cancelled,
            EngineError::Spawn { source, .. } => Self::EngineSpawn {
                reason: source.to_string(),
            },
            EngineError::Io { source } => Self::EngineSpawn {
                reason: format!("failed to supervise engine: {source}"),
            },
        }
    }

    /// Maps a session failure that is not handled by falling back.
    #[must_use]
    pub fn from_session(error: SessionError, workspace: &Workspace) -> Self {
        match error {
            SessionError::Authentication { reason } => Self::Authentication { reason },
            SessionError::Parse(source) => source.into(),
            SessionError::Engine { message, .. } => Self::EngineExecution {
                status: None,
                stderr: workspace.scrub(&message),
            },
            SessionError::Cancelled => Self::Cancelled,
            other => Self::Degraded {
                reason: other.to_string(),
            },
        }
    }
}

impl From<RequestError> for ScanError {
    fn from(error: RequestError) -> Self {
        match error {
            RequestError::RulePathTraversal { reference } => Self::PathTraversal {
                path: reference,
                reason: "contains '..' segments".to_owned(),
            },
            RequestError::LocalPath { path, reason } => Self::InvalidFile { path, reason },
            other => Self::InvalidRequest {
                reason: other.to_string(),
            },
        }
    }
}

impl From<WorkspaceError> for ScanError {
    fn from(error: WorkspaceError) -> Self {
        match error {
            WorkspaceError::InvalidFile { path, reason, .. } => Self::InvalidFile { path, reason },
            WorkspaceError::Create { source, .. } | WorkspaceError::Io { source, .. } => {
                Self::Workspace {
                    reason: source.to_string(),
                }
            }
        }
    }
}

impl From<EngineNotFound> for ScanError {
    fn from(error: EngineNotFound) -> Self {
        Self::EngineNotFound {
            hints: error.hints().to_vec(),
        }
    }
}

impl From<ParseError> for ScanError {
    fn from(error: ParseError) -> Self {
        Self::Parse {
            reason: error.to_string(),
        }
    }
}

impl From<SchemaUnavailable> for ScanError {
    fn from(error: SchemaUnavailable) -> Self {
        Self::SchemaUnavailable {
            reason: error.reason,
        }
    }
}
