use std::time::Duration;

use crate::modes::{ExecutionMode, LogFormat};

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default per-request scan timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default budget for starting and authenticating an engine session.
pub const DEFAULT_SESSION_STARTUP_TIMEOUT_SECS: u64 = 30;

/// Default number of scans the daemon runs at once.
pub const DEFAULT_MAX_CONCURRENT_SCANS: usize = 4;

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default engine execution mode.
#[must_use]
pub const fn default_execution_mode() -> ExecutionMode {
    ExecutionMode::OneShot
}

/// Default per-request scan timeout.
#[must_use]
pub const fn default_timeout() -> Duration {
    Duration::from_secs(DEFAULT_TIMEOUT_SECS)
}

/// Default budget for the session startup handshake.
#[must_use]
pub const fn default_session_startup_timeout() -> Duration {
    Duration::from_secs(DEFAULT_SESSION_STARTUP_TIMEOUT_SECS)
}
