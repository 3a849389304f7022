//! Errors raised while locating and running the engine.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// No usable engine executable was found.
///
/// The message lists remediation hints only; tried locations are kept out of
/// it and exposed through [`Self::tried`] for logging.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("scan engine not found; {}", .hints.join("; "))]
pub struct EngineNotFound {
    tried: Vec<PathBuf>,
    hints: Vec<String>,
}

impl EngineNotFound {
    pub(crate) fn new(tried: Vec<PathBuf>, hints: Vec<String>) -> Self {
        Self { tried, hints }
    }

    /// Locations that were tried, in search order.
    #[must_use]
    pub fn tried(&self) -> &[PathBuf] {
        &self.tried
    }

    /// Suggested ways to make an engine available.
    #[must_use]
    pub fn hints(&self) -> &[String] {
        &self.hints
    }
}

/// Errors raised by an [`EngineRunner`](crate::EngineRunner).
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The engine process could not be started.
    #[error("failed to start engine {}: {source}", .program.display())]
    Spawn {
        /// Executable that failed to start.
        program: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The engine exited unsuccessfully.
    #[error(
        "engine exited with {}",
        .status.map_or_else(|| String::from("a signal"), |code| format!("status {code}"))
    )]
    Execution {
        /// Exit code, or `None` when the process was killed by a signal.
        status: Option<i32>,
        /// Captured stderr, byte for byte.
        stderr: Vec<u8>,
    },

    /// The engine did not finish within its budget and was killed.
    #[error("engine timed out after {}s", .timeout.as_secs())]
    Timeout {
        /// Budget that was exceeded.
        timeout: Duration,
    },

    /// The caller cancelled the run and the engine was killed.
    #[error("engine run was cancelled")]
    Cancelled,

    /// Supervising the engine process failed.
    #[error("failed to supervise engine process: {source}")]
    Io {
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

impl EngineError {
    pub(crate) fn io(source: io::Error) -> Self {
        Self::Io {
            source: Arc::new(source),
        }
    }

    /// Returns captured stderr for [`Self::Execution`] as lossy UTF-8.
    #[must_use]
    pub fn stderr_text(&self) -> Option<String> {
        match self {
            Self::Execution { stderr, .. } => Some(String::from_utf8_lossy(stderr).into_owned()),
            _ => None,
        }
    }
}
