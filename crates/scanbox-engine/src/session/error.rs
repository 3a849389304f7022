//! Errors raised by persistent engine sessions.

use std::time::Duration;

use scanbox_core::ParseError;
use thiserror::Error;

use super::state::SessionState;

/// Errors raised while starting or calling a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session could not be started or the engine rejected the token.
    #[error("session authentication failed: {reason}")]
    Authentication {
        /// What went wrong.
        reason: String,
    },

    /// The session is not in a state that accepts calls.
    #[error("session is {state}")]
    NotReady {
        /// State observed when the call was attempted.
        state: SessionState,
    },

    /// No response arrived before the call's deadline.
    #[error("session call timed out after {}s", .timeout.as_secs())]
    Timeout {
        /// Budget that was exceeded.
        timeout: Duration,
    },

    /// The call's deadline passed while waiting for another call to finish.
    #[error("session busy for {}s", .timeout.as_secs())]
    QueueTimeout {
        /// Budget that was exceeded.
        timeout: Duration,
    },

    /// The engine closed its end of the channel.
    #[error("session channel closed")]
    ChannelClosed,

    /// The engine sent a line that is not a protocol response.
    #[error("malformed session response: {reason}")]
    Malformed {
        /// What was wrong with the line.
        reason: String,
    },

    /// The engine answered with an error object.
    #[error("engine error {code}: {message}")]
    Engine {
        /// Error code from the engine.
        code: i64,
        /// Error message from the engine.
        message: String,
    },

    /// The report inside a successful response did not parse.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The caller abandoned the call.
    #[error("session call was cancelled")]
    Cancelled,
}

impl SessionError {
    pub(crate) fn authentication(reason: impl Into<String>) -> Self {
        Self::Authentication {
            reason: reason.into(),
        }
    }
}
