//! Lifecycle states of a persistent engine session.

use std::fmt;

use serde::Serialize;

/// Where a session is in its lifecycle.
///
/// Transitions only move forward: `NotStarted → Starting → Ready`, then
/// `Ready → Degraded` on a transport failure and any state `→ Stopped` on
/// shutdown. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No process has been spawned yet.
    NotStarted,
    /// The process is starting and authenticating.
    Starting,
    /// Authenticated and accepting calls.
    Ready,
    /// A call failed at the transport level; the process has been killed.
    Degraded,
    /// Shut down or failed to start.
    Stopped,
}

impl SessionState {
    /// Stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Degraded => "degraded",
            Self::Stopped => "stopped",
        }
    }

    /// Returns whether calls can no longer be served without a restart.
    #[must_use]
    pub const fn is_unusable(self) -> bool {
        matches!(self, Self::Degraded | Self::Stopped)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
